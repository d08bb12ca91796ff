use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Datelike;
use serde::Serialize;
use tokio::sync::RwLock;
use walkdir::WalkDir;

use casecast_core::{ChunkConfig, CoreError, DocumentChunk, LegalChunker, PdfExtractor};
use casecast_index::{Bm25Index, CorpusStats, SearchFilter, VectorStore};

use crate::config::EngineConfig;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::rerank::Reranker;
use crate::retriever::{rrf_fuse, RetrievedChunk};

/// Machine-readable uncertainty tags carried on retrieval outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyKind {
    EmptyCorpus,
    NoFilterMatch,
    IndexNotBuilt,
    LowSimilarity,
    LowConfidence,
    FewResults,
    DegradedRetrieval,
}

impl UncertaintyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyKind::EmptyCorpus => "empty_corpus",
            UncertaintyKind::NoFilterMatch => "no_filter_match",
            UncertaintyKind::IndexNotBuilt => "index_not_built",
            UncertaintyKind::LowSimilarity => "low_similarity",
            UncertaintyKind::LowConfidence => "low_confidence",
            UncertaintyKind::FewResults => "few_results",
            UncertaintyKind::DegradedRetrieval => "degraded_retrieval",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            UncertaintyKind::EmptyCorpus => "The corpus is empty; ingest decisions first.",
            UncertaintyKind::NoFilterMatch => "No indexed case matches the given filters.",
            UncertaintyKind::IndexNotBuilt => "The index has not been built; run ingest first.",
            UncertaintyKind::LowSimilarity => {
                "No sufficiently similar cases found; the situation may be novel."
            }
            UncertaintyKind::LowConfidence => {
                "Low confidence in the retrieved cases; interpret with caution."
            }
            UncertaintyKind::FewResults => {
                "Few relevant cases survived filtering; interpret with caution."
            }
            UncertaintyKind::DegradedRetrieval => {
                "One retrieval store was unavailable; results come from a single store."
            }
        }
    }
}

/// Final result of a retrieval request.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub query: String,
    pub results: Vec<RetrievedChunk>,
    /// Mean reranked score of the returned results, clipped to [0,1].
    pub confidence: f32,
    pub is_uncertain: bool,
    pub uncertainty: Option<UncertaintyKind>,
    pub uncertainty_reason: Option<String>,
    pub total_candidates: usize,
    pub retrieval_time_ms: f64,
}

impl RetrievalOutcome {
    fn uncertain(query: &str, kind: UncertaintyKind, elapsed_ms: f64) -> Self {
        Self {
            query: query.to_string(),
            results: Vec::new(),
            confidence: 0.0,
            is_uncertain: true,
            uncertainty: Some(kind),
            uncertainty_reason: Some(kind.message().to_string()),
            total_candidates: 0,
            retrieval_time_ms: elapsed_ms,
        }
    }

    /// Case references of the returned chunks, deduplicated, rank order kept.
    pub fn case_references(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.results
            .iter()
            .filter(|r| seen.insert(r.case_reference.clone()))
            .map(|r| r.case_reference.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Skip documents whose chunks are already indexed.
    pub skip_existing: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { skip_existing: true }
    }
}

/// Outcome of an ingestion batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub documents_in: usize,
    pub documents_ok: usize,
    pub documents_skipped: usize,
    pub chunks_created: usize,
    pub embedding_tokens: usize,
    pub cost_estimate_usd: f64,
    /// PII placeholders substituted across the batch.
    pub pii_redactions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub chunks_indexed: usize,
    pub unique_cases: usize,
}

/// The retrieval engine: owns the index layer for its lifetime
/// (`open → serve → close`). The only process-wide state lives here.
pub struct Engine {
    config: EngineConfig,
    store: VectorStore,
    bm25: RwLock<Bm25Index>,
    embedder: Arc<dyn Embedder>,
    reranker: Reranker,
}

impl Engine {
    /// Open the engine over `config.data_dir`, loading any persisted sparse
    /// snapshot. A corrupt snapshot is logged and left for
    /// [`Engine::rebuild_sparse_from_semantic`].
    pub fn open(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        std::fs::create_dir_all(config.embeddings_dir())?;
        let store = VectorStore::open(&config.embeddings_dir())?;

        let bm25_path = config.bm25_index_path();
        let bm25 = if bm25_path.exists() {
            match Bm25Index::load(&bm25_path) {
                Ok(index) => index,
                Err(err) => {
                    tracing::warn!(error = %err, "sparse index unusable; run rebuild-bm25");
                    Bm25Index::new()
                }
            }
        } else {
            Bm25Index::new()
        };

        let reranker = Reranker::new(
            config.rerank_weights,
            config.issue_keywords.clone(),
            config.evidence_keywords.clone(),
            chrono::Utc::now().year(),
        );

        tracing::info!(
            data_dir = %config.data_dir.display(),
            sparse_docs = bm25.len(),
            "engine opened"
        );

        Ok(Self {
            config,
            store,
            bm25: RwLock::new(bm25),
            embedder,
            reranker,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pin the reranker's temporal anchor. Tests use this to stay
    /// independent of the wall clock.
    pub fn set_current_year(&mut self, year: i32) {
        self.reranker = Reranker::new(
            self.config.rerank_weights,
            self.config.issue_keywords.clone(),
            self.config.evidence_keywords.clone(),
            year,
        );
    }

    /// Ingest every PDF under `pdf_dir` (searched recursively).
    ///
    /// Per-document atomic: a document's chunks land in the semantic store in
    /// one transaction or not at all. After the batch the sparse index is
    /// rebuilt from the semantic store and persisted atomically, so the two
    /// stores always expose the same chunk-id set.
    pub async fn ingest(&self, pdf_dir: &Path, options: IngestOptions) -> Result<IngestReport> {
        if !pdf_dir.exists() {
            return Err(RagError::MissingPdfDir(pdf_dir.to_path_buf()));
        }

        let pdf_files: Vec<_> = WalkDir::new(pdf_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                        .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect();

        tracing::info!(count = pdf_files.len(), dir = %pdf_dir.display(), "found pdfs");

        let tokens_before = self.embedder.total_tokens();
        let cost_before = self.embedder.cost_estimate_usd();
        let mut report = IngestReport {
            documents_in: pdf_files.len(),
            ..Default::default()
        };

        let mut extractor = PdfExtractor::new(self.config.min_pdf_chars);
        let chunker = LegalChunker::new(ChunkConfig {
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
            max_chunk_size: self.config.max_chunk_size,
        });

        for pdf_path in &pdf_files {
            match self
                .ingest_one(pdf_path, &mut extractor, &chunker, options)
                .await
            {
                Ok(Some(chunks)) => {
                    report.documents_ok += 1;
                    report.chunks_created += chunks;
                }
                Ok(None) => report.documents_skipped += 1,
                Err(err) => {
                    tracing::warn!(path = %pdf_path.display(), error = %err, "document rejected");
                    report.documents_skipped += 1;
                }
            }
        }

        if report.documents_ok > 0 {
            self.rebuild_sparse_from_semantic().await?;
        }

        report.embedding_tokens = self.embedder.total_tokens() - tokens_before;
        report.cost_estimate_usd = (self.embedder.cost_estimate_usd() - cost_before).max(0.0);
        report.pii_redactions = extractor.redaction_stats().total();

        tracing::info!(
            ok = report.documents_ok,
            skipped = report.documents_skipped,
            chunks = report.chunks_created,
            pii_redactions = report.pii_redactions,
            "ingestion complete"
        );
        Ok(report)
    }

    async fn ingest_one(
        &self,
        pdf_path: &Path,
        extractor: &mut PdfExtractor,
        chunker: &LegalChunker,
        options: IngestOptions,
    ) -> Result<Option<usize>> {
        let mut doc = match extractor.extract_case_document(pdf_path) {
            Ok(doc) => doc,
            Err(CoreError::ScanOnlyPdf { path, chars }) => {
                tracing::warn!(path = %path.display(), chars, "skipping scan-only pdf");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        doc.ingested_at = Some(chrono::Utc::now().to_rfc3339());

        if options.skip_existing && self.store.document_exists(&doc.case_reference)? {
            tracing::debug!(case_reference = %doc.case_reference, "already indexed");
            return Ok(None);
        }

        let chunks = chunker.chunk_document(&doc);
        if chunks.is_empty() {
            tracing::warn!(case_reference = %doc.case_reference, "document produced no chunks");
            return Ok(None);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        self.store.upsert_document(&doc, &chunks, &embeddings)?;
        Ok(Some(chunks.len()))
    }

    /// Hybrid retrieval: embed the query, search both stores concurrently,
    /// fuse by weighted RRF, rerank by domain factors, attach a calibrated
    /// confidence. Falls back to a single store rather than failing closed.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
        region_hint: Option<&str>,
    ) -> Result<RetrievalOutcome> {
        let started = Instant::now();
        let elapsed_ms = |s: Instant| s.elapsed().as_secs_f64() * 1000.0;

        let corpus_size = match self.store.chunk_count() {
            Ok(size) => Some(size),
            Err(err) => {
                tracing::error!(error = %err, "semantic store unavailable");
                None
            }
        };
        if corpus_size == Some(0) {
            let bm25_empty = self.bm25.read().await.is_empty();
            let kind = if bm25_empty {
                UncertaintyKind::EmptyCorpus
            } else {
                UncertaintyKind::IndexNotBuilt
            };
            return Ok(RetrievalOutcome::uncertain(query, kind, elapsed_ms(started)));
        }

        let k = self.config.initial_retrieval_k;

        // Semantic search on the blocking pool, sparse search in-line; both
        // complete before fusion.
        let semantic_task = async {
            let embedding = self.embedder.embed_one(query).await?;
            let store = self.store.clone();
            let search_filter = filter.clone();
            tokio::task::spawn_blocking(move || store.query(&embedding, k, &search_filter))
                .await
                .map_err(|e| RagError::Embedding(format!("semantic search task failed: {e}")))?
                .map_err(RagError::from)
        };
        let sparse_task = async {
            let bm25 = self.bm25.read().await;
            let hits = bm25.search(query, k);
            hits.into_iter()
                .filter_map(|(chunk_id, score)| bm25.get(&chunk_id).map(|chunk| (chunk, score)))
                .filter(|(chunk, _)| matches_filter(chunk, filter))
                .collect::<Vec<_>>()
        };
        let (semantic_result, sparse_hits) = tokio::join!(semantic_task, sparse_task);

        let mut degraded = false;
        let semantic_hits = match semantic_result {
            Ok(hits) => hits,
            Err(err) => {
                tracing::error!(error = %err, "semantic retrieval failed, degrading to sparse only");
                degraded = true;
                Vec::new()
            }
        };

        if degraded && sparse_hits.is_empty() && self.bm25.read().await.is_empty() {
            return Err(RagError::AllStoresFailed {
                semantic: "search failed".to_string(),
                sparse: "index empty".to_string(),
            });
        }

        let mut fused = rrf_fuse(
            &semantic_hits,
            &sparse_hits,
            self.config.rrf_k,
            self.config.semantic_weight,
        );
        fused.truncate(self.config.initial_retrieval_k);
        let total_candidates = fused.len();

        if fused.is_empty() {
            let kind = if filter.is_empty() {
                UncertaintyKind::EmptyCorpus
            } else {
                UncertaintyKind::NoFilterMatch
            };
            return Ok(RetrievalOutcome::uncertain(query, kind, elapsed_ms(started)));
        }

        let results = self.reranker.rerank(fused, query, region_hint, top_k);

        let confidence = (results.iter().map(|r| r.final_score).sum::<f32>()
            / results.len().max(1) as f32)
            .clamp(0.0, 1.0);
        let top_semantic = results
            .iter()
            .map(|r| r.semantic_score)
            .fold(0.0f32, f32::max);

        let uncertainty = classify_uncertainty(
            degraded,
            top_semantic,
            confidence,
            total_candidates,
            self.config.min_similarity_threshold,
            self.config.min_confidence_threshold,
        );

        let outcome = RetrievalOutcome {
            query: query.to_string(),
            results,
            confidence,
            is_uncertain: uncertainty.is_some(),
            uncertainty,
            uncertainty_reason: uncertainty.map(|kind| kind.message().to_string()),
            total_candidates,
            retrieval_time_ms: elapsed_ms(started),
        };

        tracing::info!(
            query = %truncate_for_log(query),
            results = outcome.results.len(),
            confidence = outcome.confidence,
            uncertain = outcome.is_uncertain,
            "retrieval complete"
        );
        Ok(outcome)
    }

    /// Rebuild the sparse index from the semantic store's chunk texts and
    /// persist it atomically. This is the recovery path for corrupted or
    /// missing sparse state.
    pub async fn rebuild_sparse_from_semantic(&self) -> Result<RebuildReport> {
        let chunks = self.store.all_chunks()?;
        let rebuilt = Bm25Index::build(&chunks);
        let unique_cases = chunks
            .iter()
            .map(|c| c.case_reference.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        let report = RebuildReport {
            chunks_indexed: rebuilt.len(),
            unique_cases,
        };
        if !rebuilt.is_empty() {
            rebuilt.save(&self.config.bm25_index_path())?;
        }
        *self.bm25.write().await = rebuilt;
        Ok(report)
    }

    pub fn corpus_stats(&self) -> Result<CorpusStats> {
        Ok(self.store.stats()?)
    }

    /// Chunk-id sets of the two stores; equal after any successful ingest.
    pub async fn store_ids(&self) -> Result<(Vec<String>, Vec<String>)> {
        let semantic = self.store.chunk_ids()?;
        let sparse = self.bm25.read().await.chunk_ids();
        Ok((semantic, sparse))
    }

    /// Drop all indexed data, including the persisted sparse snapshot.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear()?;
        *self.bm25.write().await = Bm25Index::new();
        let path = self.config.bm25_index_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        tracing::info!("index cleared");
        Ok(())
    }

    /// Index an already-extracted document. The intake path for tests and
    /// for collaborators that hand over documents directly.
    pub async fn ingest_document(&self, doc: &casecast_core::CaseDocument) -> Result<usize> {
        let chunker = LegalChunker::new(ChunkConfig {
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
            max_chunk_size: self.config.max_chunk_size,
        });
        let chunks = chunker.chunk_document(doc);
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        self.store.upsert_document(doc, &chunks, &embeddings)?;
        self.rebuild_sparse_from_semantic().await?;
        Ok(chunks.len())
    }
}

fn matches_filter(chunk: &DocumentChunk, filter: &SearchFilter) -> bool {
    if let Some(year_min) = filter.year_min {
        if chunk.year < year_min {
            return false;
        }
    }
    if let Some(regions) = &filter.regions {
        let matched = chunk
            .region
            .as_deref()
            .map(|r| regions.iter().any(|q| q.eq_ignore_ascii_case(r)))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }
    if let Some(case_type) = &filter.case_type {
        let matched = chunk
            .case_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case(case_type))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }
    if let Some(section) = filter.section_kind {
        if chunk.section_kind != section {
            return false;
        }
    }
    true
}

/// Uncertainty decision for a non-empty result set. A degraded (single
/// store) retrieval is always flagged; otherwise similarity is checked
/// before confidence, then candidate count.
fn classify_uncertainty(
    degraded: bool,
    top_semantic: f32,
    confidence: f32,
    total_candidates: usize,
    min_similarity: f32,
    min_confidence: f32,
) -> Option<UncertaintyKind> {
    if degraded {
        Some(UncertaintyKind::DegradedRetrieval)
    } else if top_semantic < min_similarity {
        Some(UncertaintyKind::LowSimilarity)
    } else if confidence < min_confidence {
        Some(UncertaintyKind::LowConfidence)
    } else if total_candidates < 3 {
        Some(UncertaintyKind::FewResults)
    } else {
        None
    }
}

fn truncate_for_log(query: &str) -> String {
    query.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_boundary_at_threshold() {
        assert_eq!(
            classify_uncertainty(false, 0.29, 0.8, 10, 0.3, 0.5),
            Some(UncertaintyKind::LowSimilarity)
        );
        assert_eq!(classify_uncertainty(false, 0.31, 0.51, 10, 0.3, 0.5), None);
    }

    #[test]
    fn low_confidence_is_flagged() {
        assert_eq!(
            classify_uncertainty(false, 0.8, 0.49, 10, 0.3, 0.5),
            Some(UncertaintyKind::LowConfidence)
        );
    }

    #[test]
    fn thin_candidate_sets_are_flagged() {
        assert_eq!(
            classify_uncertainty(false, 0.8, 0.9, 2, 0.3, 0.5),
            Some(UncertaintyKind::FewResults)
        );
        assert_eq!(classify_uncertainty(false, 0.8, 0.9, 3, 0.3, 0.5), None);
    }

    #[test]
    fn degraded_retrieval_wins() {
        assert_eq!(
            classify_uncertainty(true, 0.9, 0.9, 10, 0.3, 0.5),
            Some(UncertaintyKind::DegradedRetrieval)
        );
    }
}
