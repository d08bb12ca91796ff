use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("failed to read pdf {path:?}: {message}")]
    Pdf { path: PathBuf, message: String },
    #[error("pdf {path:?} has only {chars} extractable characters (scan-only?)")]
    ScanOnlyPdf { path: PathBuf, chars: usize },
    #[error("cannot resolve case metadata for {0:?}")]
    UnresolvableMetadata(PathBuf),
    #[error("invalid case reference: {0}")]
    InvalidCaseReference(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
