//! Error types shared by the CIFAR-10 training crates.

use thiserror::Error;

/// Main error type for the CIFAR-10 training workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error, raised before any model or loader is built
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset error (missing or malformed CIFAR-10 files, bad split sizes)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Model error (construction or pretrained weight decoding)
    #[error("Model error: {0}")]
    Model(String),

    /// Checkpoint error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Training error
    #[error("Training error: {0}")]
    Training(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Download error
    #[error("Download error: {0}")]
    Download(String),

    /// The evaluated loader yielded no samples
    #[error("Evaluation produced no samples")]
    EmptyEvaluation,

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Specialized Result type for CIFAR-10 training operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Checkpoint("missing state.json".to_string());
        assert_eq!(err.to_string(), "Checkpoint error: missing state.json");
        assert_eq!(Error::EmptyEvaluation.to_string(), "Evaluation produced no samples");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
