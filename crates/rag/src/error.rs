use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("document processing error: {0}")]
    Core(#[from] casecast_core::CoreError),
    #[error("index error: {0}")]
    Index(#[from] casecast_index::IndexError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0} is not set")]
    MissingCredentials(&'static str),
    #[error("embedding provider error: {0}")]
    Embedding(String),
    #[error("embedding provider unavailable after {attempts} attempts: {last}")]
    EmbeddingExhausted { attempts: usize, last: String },
    #[error("both retrieval stores failed: semantic={semantic}; sparse={sparse}")]
    AllStoresFailed { semantic: String, sparse: String },
    #[error("ingest directory not found: {0}")]
    MissingPdfDir(std::path::PathBuf),
}

pub type Result<T> = std::result::Result<T, RagError>;
