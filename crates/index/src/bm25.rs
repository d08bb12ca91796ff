use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use casecast_core::{DocumentChunk, SectionKind};

use crate::error::{IndexError, Result};

const K1: f32 = 1.5;
const B: f32 = 0.75;
const SNAPSHOT_VERSION: u32 = 2;

/// Tokenized document persisted in the sparse snapshot. Carries the same
/// chunk metadata as the semantic store so degraded (sparse-only) retrieval
/// still returns usable results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseDoc {
    pub chunk_id: String,
    pub case_reference: String,
    pub chunk_index: usize,
    pub section_kind: SectionKind,
    pub year: i32,
    pub region: Option<String>,
    pub case_type: Option<String>,
    pub text: String,
    pub tokens: Vec<String>,
}

impl SparseDoc {
    pub fn to_chunk(&self) -> DocumentChunk {
        DocumentChunk {
            chunk_id: self.chunk_id.clone(),
            case_reference: self.case_reference.clone(),
            chunk_index: self.chunk_index,
            text: self.text.clone(),
            section_kind: self.section_kind,
            year: self.year,
            region: self.region.clone(),
            case_type: self.case_type.clone(),
            token_count: self.tokens.len(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    docs: Vec<SparseDoc>,
    doc_lengths: Vec<u32>,
    chunk_id_to_index: HashMap<String, usize>,
}

/// BM25 Okapi index over lowercased, punctuation-stripped tokens.
///
/// Postings are rebuilt in memory from the persisted tokenized docs, so the
/// snapshot stays compact and the index can always be reconstructed from the
/// semantic store's chunk texts.
#[derive(Default, Debug)]
pub struct Bm25Index {
    docs: Vec<SparseDoc>,
    doc_lengths: Vec<u32>,
    chunk_id_to_index: HashMap<String, usize>,
    postings: HashMap<String, Vec<(usize, u32)>>,
    total_length: u64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from scratch over the given chunks.
    pub fn build(chunks: &[DocumentChunk]) -> Self {
        let mut index = Self::new();
        for chunk in chunks {
            index.add(chunk);
        }
        index
    }

    fn add(&mut self, chunk: &DocumentChunk) {
        if self.chunk_id_to_index.contains_key(&chunk.chunk_id) {
            return;
        }
        let tokens = tokenize(&chunk.text);
        let position = self.docs.len();
        self.doc_lengths.push(tokens.len() as u32);
        self.total_length += tokens.len() as u64;
        self.index_tokens(position, &tokens);
        self.chunk_id_to_index.insert(chunk.chunk_id.clone(), position);
        self.docs.push(SparseDoc {
            chunk_id: chunk.chunk_id.clone(),
            case_reference: chunk.case_reference.clone(),
            chunk_index: chunk.chunk_index,
            section_kind: chunk.section_kind,
            year: chunk.year,
            region: chunk.region.clone(),
            case_type: chunk.case_type.clone(),
            text: chunk.text.clone(),
            tokens,
        });
    }

    fn index_tokens(&mut self, position: usize, tokens: &[String]) {
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for token in tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }
        for (token, count) in counts {
            self.postings
                .entry(token.to_string())
                .or_default()
                .push((position, count));
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.docs.iter().map(|d| d.chunk_id.clone()).collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.chunk_id_to_index.contains_key(chunk_id)
    }

    /// Reconstruct the stored chunk for a hit, metadata included.
    pub fn get(&self, chunk_id: &str) -> Option<DocumentChunk> {
        self.chunk_id_to_index
            .get(chunk_id)
            .map(|&position| self.docs[position].to_chunk())
    }

    /// Score the query against every document and return the top `k`
    /// positive-scoring `(chunk_id, score)` pairs, best first.
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, f32)> {
        if self.docs.is_empty() {
            return Vec::new();
        }
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let total_docs = self.docs.len() as f32;
        let avg_len = self.total_length as f32 / total_docs;
        let mut scores: HashMap<usize, f32> = HashMap::new();

        let mut seen: Vec<&String> = query_tokens.iter().collect();
        seen.sort();
        seen.dedup();

        for term in seen {
            let Some(postings) = self.postings.get(term.as_str()) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((total_docs - df + 0.5) / (df + 0.5)).ln().max(0.0);
            for &(position, term_freq) in postings {
                let doc_len = self.doc_lengths[position] as f32;
                if doc_len == 0.0 {
                    continue;
                }
                let tf = term_freq as f32;
                let denom = tf + K1 * (1.0 - B + B * (doc_len / avg_len));
                *scores.entry(position).or_insert(0.0) += idf * (tf * (K1 + 1.0)) / denom;
            }
        }

        let mut results: Vec<(String, f32)> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(position, score)| (self.docs[position].chunk_id.clone(), score))
            .collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(k);
        results
    }

    /// Persist the snapshot atomically: write to a temp file in the target
    /// directory, then rename. An empty index is never persisted.
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.docs.is_empty() {
            return Err(IndexError::EmptyIndex(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            docs: self.docs.clone(),
            doc_lengths: self.doc_lengths.clone(),
            chunk_id_to_index: self.chunk_id_to_index.clone(),
        };
        let tmp = path.with_extension("tmp");
        let payload = serde_json::to_vec(&snapshot)?;
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), docs = self.docs.len(), "sparse index saved");
        Ok(())
    }

    /// Load a snapshot and rebuild postings in memory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let snapshot: Snapshot =
            serde_json::from_slice(&raw).map_err(|e| IndexError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                message: format!("unsupported snapshot version {}", snapshot.version),
            });
        }
        if snapshot.docs.is_empty() {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                message: "snapshot holds zero documents".to_string(),
            });
        }
        if snapshot.docs.len() != snapshot.doc_lengths.len() {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                message: "doc/length table size mismatch".to_string(),
            });
        }
        let mut index = Self {
            doc_lengths: snapshot.doc_lengths,
            chunk_id_to_index: snapshot.chunk_id_to_index,
            total_length: 0,
            ..Default::default()
        };
        for (position, doc) in snapshot.docs.iter().enumerate() {
            index.total_length += doc.tokens.len() as u64;
            let tokens = doc.tokens.clone();
            index.index_tokens(position, &tokens);
        }
        index.docs = snapshot.docs;
        tracing::info!(path = %path.display(), docs = index.docs.len(), "sparse index loaded");
        Ok(index)
    }
}

/// Lowercase, strip punctuation (keeping hyphens), drop one-character tokens
/// and pure numbers other than 4-digit years. Years and statute section
/// numbers like "213" matter for legal search, so digit-bearing tokens such
/// as "s213" survive intact.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|token| !token.is_empty())
        .filter(|token| {
            if token.chars().all(|c| c.is_ascii_digit()) {
                token.len() == 3 || token.len() == 4
            } else {
                token.len() >= 2
            }
        })
        .map(|token| token.to_string())
        .collect()
}
