use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Whether to log (verbose) error output.
/// Use the `DEBUG` env var to override (on, off)
static ERROR_LOGGER: AtomicBool = AtomicBool::new(false);

pub fn debug_error_enabled(enabled: bool) {
    ERROR_LOGGER.store(enabled, Ordering::Relaxed);
}

pub fn debug_error(err: anyhow::Error) {
    if ERROR_LOGGER.load(Ordering::Relaxed) {
        eprintln!("Warn: {}", err);
        for err in err.chain().skip(1) {
            eprintln!("Caused by: {}", err);
        }
    }
}

/// A failed request to the panel api.
///
/// `surf::Error` doesn't implement `std::error::Error`, so it is carried
/// as a plain field rather than as a source.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(surf::Error),
    #[error("unexpected status: {0}")]
    Status(surf::StatusCode),
    #[error("invalid response body: {0}")]
    Decode(surf::Error),
    #[error("request timed out")]
    Timeout,
}

/// A failure reading or writing the series file.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("series file {0} does not exist")]
    Missing(String),
    #[error("series file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("series file {path} is malformed: {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
}
