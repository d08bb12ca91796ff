use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytemuck::{cast_slice, try_cast_slice};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use casecast_core::{CaseDocument, DocumentChunk, SectionKind};

use crate::error::{IndexError, Result};

/// Metadata predicates applied to a semantic query.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub year_min: Option<i32>,
    pub regions: Option<Vec<String>>,
    pub case_type: Option<String>,
    pub section_kind: Option<SectionKind>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.year_min.is_none()
            && self.regions.is_none()
            && self.case_type.is_none()
            && self.section_kind.is_none()
    }
}

/// A chunk returned from the semantic store with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub similarity: f32,
}

/// Corpus-wide statistics from the semantic store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStats {
    pub documents: usize,
    pub unique_cases: usize,
    pub chunks: usize,
    pub year_distribution: BTreeMap<i32, usize>,
    pub region_distribution: BTreeMap<String, usize>,
    pub case_type_distribution: BTreeMap<String, usize>,
}

/// Persistent semantic store: documents plus chunks with dense embeddings,
/// backed by a sqlite file under the embeddings directory.
///
/// A connection is opened per operation; document upserts run in a single
/// transaction so ingestion is per-document atomic, and upserts are
/// idempotent keyed by chunk id.
#[derive(Clone)]
pub struct VectorStore {
    path: PathBuf,
}

impl VectorStore {
    pub fn open(embeddings_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(embeddings_dir)?;
        let store = Self {
            path: embeddings_dir.join("chunks.sqlite"),
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    fn init(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS documents (
                case_reference TEXT PRIMARY KEY,
                year INTEGER NOT NULL,
                region TEXT,
                case_type TEXT,
                title TEXT,
                source_path TEXT NOT NULL,
                ingested_at TEXT
            );
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                case_reference TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                section_kind TEXT NOT NULL,
                text TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                year INTEGER NOT NULL,
                region TEXT,
                case_type TEXT,
                embedding BLOB NOT NULL,
                FOREIGN KEY(case_reference) REFERENCES documents(case_reference)
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_case ON chunks(case_reference);
            CREATE INDEX IF NOT EXISTS idx_chunks_year ON chunks(year);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace a document and all of its chunks in one transaction.
    pub fn upsert_document(
        &self,
        doc: &CaseDocument,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO documents
             (case_reference, year, region, case_type, title, source_path, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                doc.case_reference,
                doc.year,
                doc.region,
                doc.case_type,
                doc.title,
                doc.source_path,
                doc.ingested_at,
            ],
        )?;
        // Replacing a document drops chunks from any earlier chunking run.
        tx.execute(
            "DELETE FROM chunks WHERE case_reference = ?1",
            params![doc.case_reference],
        )?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let blob = cast_slice::<f32, u8>(embedding);
            tx.execute(
                "INSERT OR REPLACE INTO chunks
                 (chunk_id, case_reference, chunk_index, section_kind, text,
                  token_count, year, region, case_type, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    chunk.chunk_id,
                    chunk.case_reference,
                    chunk.chunk_index as i64,
                    chunk.section_kind.as_str(),
                    chunk.text,
                    chunk.token_count as i64,
                    chunk.year,
                    chunk.region,
                    chunk.case_type,
                    blob,
                ],
            )?;
        }
        tx.commit()?;
        Ok(chunks.len())
    }

    /// Nearest-neighbour query by cosine similarity with optional metadata
    /// predicates. Returns up to `k` results, best first.
    pub fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let conn = self.connection()?;
        let (clause, args) = filter_clause(filter);
        let sql = format!(
            "SELECT chunk_id, case_reference, chunk_index, section_kind, text,
                    token_count, year, region, case_type, embedding
             FROM chunks{clause}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(args))?;

        let mut hits: Vec<ScoredChunk> = Vec::new();
        while let Some(row) = rows.next()? {
            let chunk = row_to_chunk(row)?;
            let blob: Vec<u8> = row.get(9)?;
            let stored: &[f32] = try_cast_slice(&blob)
                .map_err(|_| IndexError::MalformedEmbedding(chunk.chunk_id.clone()))?;
            let similarity = cosine_similarity(embedding, stored);
            hits.push(ScoredChunk { chunk, similarity });
        }
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub fn chunk_exists(&self, chunk_id: &str) -> Result<bool> {
        let conn = self.connection()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM chunks WHERE chunk_id = ?1",
                params![chunk_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn document_exists(&self, case_reference: &str) -> Result<bool> {
        let conn = self.connection()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM documents WHERE case_reference = ?1",
                params![case_reference],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<DocumentChunk>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT chunk_id, case_reference, chunk_index, section_kind, text,
                    token_count, year, region, case_type, embedding
             FROM chunks WHERE chunk_id = ?1",
        )?;
        let mut rows = stmt.query(params![chunk_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_chunk(row)?)),
            None => Ok(None),
        }
    }

    pub fn chunk_ids(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT chunk_id FROM chunks ORDER BY chunk_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn chunk_count(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Every chunk in the store, without embeddings. This is the recovery
    /// source for rebuilding the sparse index.
    pub fn all_chunks(&self) -> Result<Vec<DocumentChunk>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT chunk_id, case_reference, chunk_index, section_kind, text,
                    token_count, year, region, case_type
             FROM chunks ORDER BY case_reference, chunk_index",
        )?;
        let mut rows = stmt.query([])?;
        let mut chunks = Vec::new();
        while let Some(row) = rows.next()? {
            chunks.push(row_to_chunk(row)?);
        }
        Ok(chunks)
    }

    pub fn stats(&self) -> Result<CorpusStats> {
        let conn = self.connection()?;
        let documents: i64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        let chunks: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let unique_cases: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT case_reference) FROM chunks",
            [],
            |row| row.get(0),
        )?;

        let mut stats = CorpusStats {
            documents: documents as usize,
            unique_cases: unique_cases as usize,
            chunks: chunks as usize,
            ..Default::default()
        };

        let mut stmt =
            conn.prepare("SELECT year, COUNT(*) FROM chunks GROUP BY year ORDER BY year")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            stats
                .year_distribution
                .insert(row.get::<_, i32>(0)?, row.get::<_, i64>(1)? as usize);
        }

        let mut stmt = conn.prepare(
            "SELECT region, COUNT(*) FROM chunks WHERE region IS NOT NULL GROUP BY region",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            stats
                .region_distribution
                .insert(row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize);
        }

        let mut stmt = conn.prepare(
            "SELECT case_type, COUNT(*) FROM chunks WHERE case_type IS NOT NULL GROUP BY case_type",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            stats
                .case_type_distribution
                .insert(row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize);
        }

        Ok(stats)
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM documents;")?;
        Ok(())
    }
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> Result<DocumentChunk> {
    let section: String = row.get(3)?;
    Ok(DocumentChunk {
        chunk_id: row.get(0)?,
        case_reference: row.get(1)?,
        chunk_index: row.get::<_, i64>(2)? as usize,
        section_kind: SectionKind::parse(&section),
        text: row.get(4)?,
        token_count: row.get::<_, i64>(5)? as usize,
        year: row.get(6)?,
        region: row.get(7)?,
        case_type: row.get(8)?,
    })
}

fn filter_clause(filter: &SearchFilter) -> (String, Vec<rusqlite::types::Value>) {
    let mut conditions = Vec::new();
    let mut args: Vec<rusqlite::types::Value> = Vec::new();
    if let Some(year_min) = filter.year_min {
        conditions.push("year >= ?".to_string());
        args.push(rusqlite::types::Value::Integer(year_min as i64));
    }
    if let Some(regions) = &filter.regions {
        if !regions.is_empty() {
            let placeholders = vec!["?"; regions.len()].join(", ");
            conditions.push(format!("region IN ({placeholders})"));
            for region in regions {
                args.push(rusqlite::types::Value::Text(region.to_ascii_uppercase()));
            }
        }
    }
    if let Some(case_type) = &filter.case_type {
        conditions.push("case_type = ?".to_string());
        args.push(rusqlite::types::Value::Text(case_type.to_ascii_uppercase()));
    }
    if let Some(section) = filter.section_kind {
        conditions.push("section_kind = ?".to_string());
        args.push(rusqlite::types::Value::Text(section.as_str().to_string()));
    }
    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), args)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}
