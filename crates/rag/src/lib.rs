//! Hybrid retrieval-augmented engine over a corpus of First-tier Tribunal
//! decisions: embedding, reciprocal-rank-fused retrieval over semantic and
//! BM25 stores, domain-aware reranking and calibrated uncertainty.

pub mod config;
pub mod embedding;
pub mod error;
pub mod pipeline;
pub mod rerank;
pub mod retriever;

pub use config::EngineConfig;
pub use embedding::{Embedder, HashEmbedder, OpenAiEmbedder};
pub use error::{RagError, Result};
pub use pipeline::{
    Engine, IngestOptions, IngestReport, RebuildReport, RetrievalOutcome, UncertaintyKind,
};
pub use rerank::{region_score, temporal_score, Reranker, RerankWeights};
pub use retriever::{rrf_fuse, RetrievedChunk};

pub use casecast_index::SearchFilter;
