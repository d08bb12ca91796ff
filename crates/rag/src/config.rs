use std::path::PathBuf;

use serde::Deserialize;

use casecast_core::{
    default_evidence_keywords, default_issue_keywords, EvidenceKeywords, IssueKeywords,
};

use crate::rerank::RerankWeights;

/// Engine configuration. Injected explicitly; environment is consulted only
/// by the binary at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base data directory; the semantic store and sparse snapshot live
    /// under `<data_dir>/embeddings/`.
    pub data_dir: PathBuf,

    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_batch_size: usize,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_chunk_size: usize,
    /// PDFs with fewer extractable characters are skipped as scan-only.
    pub min_pdf_chars: usize,

    pub initial_retrieval_k: usize,
    pub final_top_k: usize,
    pub rrf_k: usize,
    pub semantic_weight: f32,

    pub min_confidence_threshold: f32,
    pub min_similarity_threshold: f32,

    #[serde(skip)]
    pub rerank_weights: RerankWeights,
    #[serde(skip)]
    pub issue_keywords: IssueKeywords,
    #[serde(skip)]
    pub evidence_keywords: EvidenceKeywords,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            embedding_batch_size: 50,
            chunk_size: 500,
            chunk_overlap: 50,
            max_chunk_size: 800,
            min_pdf_chars: 500,
            initial_retrieval_k: 20,
            final_top_k: 5,
            rrf_k: 60,
            semantic_weight: 0.7,
            min_confidence_threshold: 0.5,
            min_similarity_threshold: 0.3,
            rerank_weights: RerankWeights::default(),
            issue_keywords: default_issue_keywords(),
            evidence_keywords: default_evidence_keywords(),
        }
    }
}

impl EngineConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.data_dir.join("embeddings")
    }

    pub fn bm25_index_path(&self) -> PathBuf {
        self.embeddings_dir().join(casecast_index::BM25_INDEX_FILE)
    }

    pub fn predictions_dir(&self) -> PathBuf {
        self.data_dir.join("predictions")
    }
}
