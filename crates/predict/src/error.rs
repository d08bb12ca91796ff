use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("retrieval engine error: {0}")]
    Rag(#[from] casecast_rag::RagError),
    #[error("llm error: {0}")]
    Llm(#[from] casecast_llm::LlmError),
    #[error("prediction {0} already exists; predictions are write-once")]
    AlreadyStored(String),
    #[error("case file error: {0}")]
    CaseFile(String),
}

pub type Result<T> = std::result::Result<T, PredictError>;
