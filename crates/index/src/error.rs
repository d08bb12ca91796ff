use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("refusing to persist an empty sparse index to {0:?}")]
    EmptyIndex(PathBuf),
    #[error("sparse index at {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("stored embedding for chunk {0} is malformed")]
    MalformedEmbedding(String),
    #[error("chunk/embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    CountMismatch { chunks: usize, embeddings: usize },
}

pub type Result<T> = std::result::Result<T, IndexError>;
