//! Core types and utilities for CIFAR-10 classifier training.
//!
//! This crate provides the error type, configuration, backend selection and
//! CLI helpers shared by the dataset, training and tool crates.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod types;

pub use backend::*;
pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use types::*;

