//! CIFAR-10 binary batch reader and downloader.
//!
//! Each batch file holds 10,000 records of one label byte followed by 3072
//! pixel bytes stored channel-planar: 1024 red, 1024 green, 1024 blue.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use cifar_core::{Error, Result, IMAGE_PIXELS, NUM_CLASSES};
use tracing::{debug, info};

use crate::dataset::CifarItem;

/// Directory the archive unpacks into
pub const BATCHES_DIR: &str = "cifar-10-batches-bin";

/// Binary release of CIFAR-10
pub const CIFAR10_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";

const ARCHIVE_NAME: &str = "cifar-10-binary.tar.gz";
const RECORD_SIZE: usize = 1 + IMAGE_PIXELS;
const RECORDS_PER_FILE: usize = 10_000;

/// Names of the five training batch files
pub fn training_files() -> Vec<String> {
    (1..=5).map(|i| format!("data_batch_{}.bin", i)).collect()
}

/// Name of the test batch file
pub fn test_file() -> &'static str {
    "test_batch.bin"
}

/// Location of the unpacked batch files below `data_dir`
pub fn batches_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(BATCHES_DIR)
}

/// Load the 50,000 training records in file order.
pub fn load_training_records(data_dir: &Path) -> Result<Vec<CifarItem>> {
    let dir = batches_dir(data_dir);
    let mut items = Vec::with_capacity(5 * RECORDS_PER_FILE);
    for name in training_files() {
        items.extend(load_batch_file(&dir.join(name))?);
    }
    info!("Loaded {} training records from {}", items.len(), dir.display());
    Ok(items)
}

/// Load the 10,000 test records.
pub fn load_test_records(data_dir: &Path) -> Result<Vec<CifarItem>> {
    let dir = batches_dir(data_dir);
    let items = load_batch_file(&dir.join(test_file()))?;
    info!("Loaded {} test records from {}", items.len(), dir.display());
    Ok(items)
}

/// Read one batch file, which must hold exactly 10,000 records.
pub fn load_batch_file(path: &Path) -> Result<Vec<CifarItem>> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "CIFAR-10 batch file {} (set data.download = true to fetch the dataset)",
            path.display()
        )));
    }

    let mut buffer = Vec::new();
    File::open(path)?.read_to_end(&mut buffer)?;

    let expected = RECORD_SIZE * RECORDS_PER_FILE;
    if buffer.len() != expected {
        return Err(Error::Dataset(format!(
            "{} has {} bytes, expected {}",
            path.display(),
            buffer.len(),
            expected
        )));
    }

    let items = parse_records(&buffer)?;
    debug!("Parsed {} records from {}", items.len(), path.display());
    Ok(items)
}

/// Decode a buffer of whole records.
pub fn parse_records(buffer: &[u8]) -> Result<Vec<CifarItem>> {
    if buffer.len() % RECORD_SIZE != 0 {
        return Err(Error::Dataset(format!(
            "buffer of {} bytes is not a whole number of {}-byte records",
            buffer.len(),
            RECORD_SIZE
        )));
    }

    buffer
        .chunks_exact(RECORD_SIZE)
        .enumerate()
        .map(|(i, record)| {
            let label = record[0] as usize;
            if label >= NUM_CLASSES {
                return Err(Error::Dataset(format!("record {} has label {}", i, label)));
            }
            Ok(CifarItem::new(record[1..].to_vec(), label))
        })
        .collect()
}

/// Whether every batch file is present under `data_dir`
pub fn is_present(data_dir: &Path) -> bool {
    let dir = batches_dir(data_dir);
    training_files()
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(test_file()))
        .all(|name| dir.join(name).exists())
}

/// Download and unpack CIFAR-10 into `data_dir`, skipping finished steps.
pub fn download_cifar10(data_dir: &Path) -> Result<()> {
    download_cifar10_from(data_dir, CIFAR10_URL)
}

fn download_cifar10_from(data_dir: &Path, url: &str) -> Result<()> {
    fs::create_dir_all(data_dir)?;

    let archive_path = data_dir.join(ARCHIVE_NAME);
    if archive_path.exists() {
        info!("CIFAR-10 archive already exists, skipping download");
    } else {
        fetch_archive(url, &archive_path)?;
    }

    if is_present(data_dir) {
        info!("CIFAR-10 already extracted");
    } else {
        info!("Extracting {}", archive_path.display());
        extract_tar_gz(&archive_path, data_dir)?;
    }

    Ok(())
}

/// Fetch `url` into `path`, going through a `.part` file so an interrupted
/// download never leaves a truncated archive behind.
fn fetch_archive(url: &str, path: &Path) -> Result<()> {
    info!("Downloading CIFAR-10 dataset from {}", url);

    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Download(format!("{}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .map_err(|e| Error::Download(format!("Failed to read response: {}", e)))?;

    let partial = path.with_extension("part");
    let mut file = File::create(&partial)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&partial, path)?;

    info!("Download complete ({} bytes)", bytes.len());
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, output_dir: &Path) -> Result<()> {
    let decoder = flate2::read::GzDecoder::new(File::open(archive_path)?);
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(output_dir)
        .map_err(|e| Error::Dataset(format!("Failed to extract {}: {}", archive_path.display(), e)))
}
