//! Index layer: a sqlite-backed semantic store and a persisted BM25 sparse
//! index over the same chunk set.
//!
//! The two stores must agree on their chunk-id sets after every ingestion
//! batch; the sparse index can always be rebuilt from the semantic store's
//! chunk texts, which is the recovery path for corrupted sparse state.

pub mod bm25;
pub mod error;
pub mod vector;

pub use bm25::{tokenize, Bm25Index, SparseDoc};
pub use error::{IndexError, Result};
pub use vector::{cosine_similarity, CorpusStats, ScoredChunk, SearchFilter, VectorStore};

/// File name of the serialized sparse index inside the embeddings directory.
pub const BM25_INDEX_FILE: &str = "bm25_index.json";

#[cfg(test)]
mod tests {
    use super::*;
    use casecast_core::{CaseDocument, DocumentChunk, SectionKind};
    use tempfile::tempdir;

    fn fixture(reference: &str, texts: &[&str]) -> (CaseDocument, Vec<DocumentChunk>, Vec<Vec<f32>>) {
        let doc = CaseDocument {
            case_reference: reference.to_string(),
            year: 2022,
            region: Some("LON".to_string()),
            region_name: None,
            case_type: Some("HMF".to_string()),
            case_type_name: None,
            title: None,
            full_text: String::new(),
            source_path: format!("{reference}.pdf"),
            ingested_at: None,
        };
        let chunks: Vec<DocumentChunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| DocumentChunk {
                chunk_id: DocumentChunk::make_id(reference, i),
                case_reference: reference.to_string(),
                chunk_index: i,
                text: text.to_string(),
                section_kind: SectionKind::Reasoning,
                year: 2022,
                region: Some("LON".to_string()),
                case_type: Some("HMF".to_string()),
                token_count: text.split_whitespace().count(),
            })
            .collect();
        let embeddings = chunks.iter().map(|_| vec![1.0, 0.0]).collect();
        (doc, chunks, embeddings)
    }

    #[test]
    fn stores_agree_after_rebuild() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        let (doc, chunks, embeddings) = fixture(
            "LON_00BK_HMF_2022_0100",
            &["deposit protection failed", "penalty of twice the deposit"],
        );
        store.upsert_document(&doc, &chunks, &embeddings).unwrap();

        let rebuilt = Bm25Index::build(&store.all_chunks().unwrap());
        assert_eq!(rebuilt.chunk_ids(), store.chunk_ids().unwrap());
        assert_eq!(rebuilt.len(), store.chunk_count().unwrap());
    }

    #[test]
    fn rebuild_matches_fresh_build() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(dir.path()).unwrap();
        let (doc, chunks, embeddings) = fixture(
            "CHI_00ML_HNA_2021_0200",
            &["cleaning claim with invoices", "fair wear and tear applied"],
        );
        store.upsert_document(&doc, &chunks, &embeddings).unwrap();

        let fresh = Bm25Index::build(&chunks);
        let rebuilt = Bm25Index::build(&store.all_chunks().unwrap());
        let query = "cleaning invoices";
        let lhs = fresh.search(query, 5);
        let rhs = rebuilt.search(query, 5);
        assert_eq!(lhs.len(), rhs.len());
        for (a, b) in lhs.iter().zip(rhs.iter()) {
            assert_eq!(a.0, b.0);
            assert!((a.1 - b.1).abs() < 1e-6);
        }
    }
}
