use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use casecast_core::{DocumentChunk, SectionKind};
use casecast_index::ScoredChunk;

/// A candidate chunk carrying every score it picked up on the way through
/// fused retrieval and reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub case_reference: String,
    pub text: String,
    pub section_kind: SectionKind,
    pub year: i32,
    pub region: Option<String>,
    pub case_type: Option<String>,

    /// Cosine similarity in [0,1]; 0 when the chunk only surfaced via BM25.
    pub semantic_score: f32,
    pub semantic_rank: Option<usize>,
    pub bm25_score: f32,
    pub bm25_rank: Option<usize>,
    /// Weighted reciprocal-rank-fusion score.
    pub rrf_score: f32,
    /// Domain rerank score in [0,1]; populated by the reranker.
    pub final_score: f32,
    /// Human-readable note on why this chunk ranked where it did.
    pub relevance: Option<String>,
}

/// Weighted Reciprocal Rank Fusion over the two stores' ranked lists.
///
/// `rrf(c) = w_s·1/(k + rank_sem(c)) + w_b·1/(k + rank_bm25(c))`; a chunk
/// missing from one list contributes zero for that term. Sparse-only hits
/// have their text and metadata filled in by the caller before reranking.
pub fn rrf_fuse(
    semantic: &[ScoredChunk],
    sparse: &[(DocumentChunk, f32)],
    rrf_k: usize,
    semantic_weight: f32,
) -> Vec<RetrievedChunk> {
    let keyword_weight = 1.0 - semantic_weight;
    let mut by_id: HashMap<String, RetrievedChunk> = HashMap::new();

    for (rank, hit) in semantic.iter().enumerate() {
        let entry = by_id
            .entry(hit.chunk.chunk_id.clone())
            .or_insert_with(|| from_chunk(&hit.chunk));
        entry.semantic_score = hit.similarity;
        entry.semantic_rank = Some(rank + 1);
    }

    for (rank, (chunk, score)) in sparse.iter().enumerate() {
        let entry = by_id
            .entry(chunk.chunk_id.clone())
            .or_insert_with(|| from_chunk(chunk));
        entry.bm25_score = *score;
        entry.bm25_rank = Some(rank + 1);
    }

    let mut fused: Vec<RetrievedChunk> = by_id
        .into_values()
        .map(|mut candidate| {
            let semantic_term = candidate
                .semantic_rank
                .map(|rank| 1.0 / (rrf_k as f32 + rank as f32))
                .unwrap_or(0.0);
            let keyword_term = candidate
                .bm25_rank
                .map(|rank| 1.0 / (rrf_k as f32 + rank as f32))
                .unwrap_or(0.0);
            candidate.rrf_score = semantic_weight * semantic_term + keyword_weight * keyword_term;
            candidate
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.year.cmp(&a.year))
            .then_with(|| a.case_reference.cmp(&b.case_reference))
    });
    fused
}

fn from_chunk(chunk: &DocumentChunk) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: chunk.chunk_id.clone(),
        case_reference: chunk.case_reference.clone(),
        text: chunk.text.clone(),
        section_kind: chunk.section_kind,
        year: chunk.year,
        region: chunk.region.clone(),
        case_type: chunk.case_type.clone(),
        semantic_score: 0.0,
        semantic_rank: None,
        bm25_score: 0.0,
        bm25_rank: None,
        rrf_score: 0.0,
        final_score: 0.0,
        relevance: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, year: i32) -> DocumentChunk {
        DocumentChunk {
            chunk_id: id.to_string(),
            case_reference: id.rsplit_once('_').map(|(head, _)| head.to_string()).unwrap_or_default(),
            chunk_index: 0,
            text: format!("text of {id}"),
            section_kind: SectionKind::Reasoning,
            year,
            region: Some("LON".to_string()),
            case_type: None,
            token_count: 3,
        }
    }

    fn scored(id: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: chunk(id, 2022),
            similarity,
        }
    }

    #[test]
    fn chunk_in_both_lists_outranks_single_list() {
        let semantic = vec![scored("a_0", 0.9), scored("b_0", 0.8)];
        let sparse = vec![(chunk("a_0", 2022), 7.0), (chunk("c_0", 2022), 6.0)];
        let fused = rrf_fuse(&semantic, &sparse, 60, 0.7);
        assert_eq!(fused[0].chunk_id, "a_0");
        assert!(fused[0].semantic_rank.is_some() && fused[0].bm25_rank.is_some());
    }

    #[test]
    fn missing_list_contributes_zero() {
        let semantic = vec![scored("a_0", 0.9)];
        let fused = rrf_fuse(&semantic, &[], 60, 0.7);
        let expected = 0.7 * (1.0 / 61.0);
        assert!((fused[0].rrf_score - expected).abs() < 1e-6);
    }

    #[test]
    fn weights_shift_the_balance() {
        // a_0 ranks first semantically, b_0 first lexically.
        let semantic = vec![scored("a_0", 0.9), scored("b_0", 0.2)];
        let sparse = vec![(chunk("b_0", 2022), 9.0), (chunk("a_0", 2022), 1.0)];
        let semantic_heavy = rrf_fuse(&semantic, &sparse, 60, 0.9);
        assert_eq!(semantic_heavy[0].chunk_id, "a_0");
        let keyword_heavy = rrf_fuse(&semantic, &sparse, 60, 0.1);
        assert_eq!(keyword_heavy[0].chunk_id, "b_0");
    }

    #[test]
    fn rrf_ties_break_by_year() {
        // With equal weights, semantic rank 1 and bm25 rank 1 carry the same
        // rrf term, so the newer case must sort first.
        let older = ScoredChunk {
            chunk: chunk("LON_00AA_HMF_2020_0001_0", 2020),
            similarity: 0.5,
        };
        let sparse = vec![(chunk("LON_00AA_HMF_2023_0002_0", 2023), 5.0)];
        let fused = rrf_fuse(&[older], &sparse, 60, 0.5);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].rrf_score - fused[1].rrf_score).abs() < 1e-9);
        assert_eq!(fused[0].chunk_id, "LON_00AA_HMF_2023_0002_0");
    }

    #[test]
    fn sparse_only_hits_keep_their_metadata() {
        let sparse = vec![(chunk("CHI_00ML_HNA_2021_0005_0", 2021), 3.0)];
        let fused = rrf_fuse(&[], &sparse, 60, 0.7);
        assert_eq!(fused[0].year, 2021);
        assert_eq!(fused[0].text, "text of CHI_00ML_HNA_2021_0005_0");
        assert_eq!(fused[0].semantic_score, 0.0);
    }
}
