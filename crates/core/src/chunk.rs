use once_cell::sync::Lazy;
use regex::Regex;
use tiktoken_rs::CoreBPE;

use crate::document::{CaseDocument, DocumentChunk, SectionKind};

static TOKENIZER: Lazy<CoreBPE> = Lazy::new(|| tiktoken_rs::cl100k_base().expect("tokenizer"));

static SECTION_PATTERNS: Lazy<Vec<(SectionKind, Vec<Regex>)>> = Lazy::new(|| {
    let pat = |raw: &str| Regex::new(raw).unwrap();
    vec![
        (
            SectionKind::Background,
            vec![
                pat(r"(?im)^\s*(?:BACKGROUND|INTRODUCTION|THE APPLICATION)\s*$"),
                pat(r"(?im)^\s*\d+\.\s*(?:BACKGROUND|INTRODUCTION)\s*$"),
            ],
        ),
        (
            SectionKind::Facts,
            vec![
                pat(r"(?im)^\s*(?:THE FACTS|FACTS|EVIDENCE|THE EVIDENCE|FINDINGS OF FACT)\s*$"),
                pat(r"(?im)^\s*\d+\.\s*(?:FACTS|THE FACTS|EVIDENCE)\s*$"),
            ],
        ),
        (
            SectionKind::Reasoning,
            vec![
                pat(r"(?im)^\s*(?:REASONS|THE REASONS|REASONING|THE TRIBUNAL'S REASONS|DISCUSSION)\s*$"),
                pat(r"(?im)^\s*\d+\.\s*(?:REASONS|REASONING|DISCUSSION)\s*$"),
            ],
        ),
        (
            SectionKind::Decision,
            vec![
                pat(r"(?im)^\s*(?:DECISION|THE DECISION|DETERMINATION|ORDER|THE ORDER|CONCLUSION)\s*$"),
                pat(r"(?im)^\s*\d+\.\s*(?:DECISION|DETERMINATION|ORDER)\s*$"),
            ],
        ),
    ]
});

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Target chunk size in cl100k tokens.
    pub chunk_size: usize,
    /// Suffix-to-prefix overlap between adjacent chunks of a section, in tokens.
    pub chunk_overlap: usize,
    /// Hard cap; chunks are never emitted above this.
    pub max_chunk_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            max_chunk_size: 800,
        }
    }
}

/// Section-aware chunker for tribunal decisions.
///
/// A first pass detects section headers (background / facts / reasoning /
/// decision); text before the first header is tagged `other`. A second pass
/// splits each section into overlapping chunks on sentence boundaries,
/// measured with the same tokenizer used for embeddings. Chunks never cross
/// section boundaries.
pub struct LegalChunker {
    config: ChunkConfig,
}

impl Default for LegalChunker {
    fn default() -> Self {
        Self::new(ChunkConfig::default())
    }
}

impl LegalChunker {
    pub fn new(config: ChunkConfig) -> Self {
        let mut config = config;
        config.chunk_size = config.chunk_size.max(1).min(config.max_chunk_size.max(1));
        config.chunk_overlap = config.chunk_overlap.min(config.chunk_size.saturating_sub(1));
        Self { config }
    }

    pub fn chunk_document(&self, doc: &CaseDocument) -> Vec<DocumentChunk> {
        let sections = detect_sections(&doc.full_text);
        let mut chunks = Vec::new();
        for (kind, text) in &sections {
            if text.trim().is_empty() {
                continue;
            }
            self.chunk_section(text, *kind, doc, &mut chunks);
        }
        if chunks.is_empty() && !doc.full_text.trim().is_empty() {
            tracing::debug!(case_reference = %doc.case_reference, "no sections detected, chunking whole document");
            self.chunk_section(&doc.full_text, SectionKind::Other, doc, &mut chunks);
        }
        chunks
    }

    pub fn count_tokens(text: &str) -> usize {
        TOKENIZER.encode_with_special_tokens(text).len()
    }

    fn chunk_section(
        &self,
        text: &str,
        kind: SectionKind,
        doc: &CaseDocument,
        out: &mut Vec<DocumentChunk>,
    ) {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return;
        }
        let token_counts: Vec<usize> = sentences.iter().map(|s| Self::count_tokens(s)).collect();

        let mut current: Vec<usize> = Vec::new();
        let mut current_tokens = 0usize;

        for (idx, &tokens) in token_counts.iter().enumerate() {
            if tokens > self.config.chunk_size {
                if !current.is_empty() {
                    self.push_chunk(&current, &sentences, kind, doc, out);
                    current.clear();
                    current_tokens = 0;
                }
                self.split_long_sentence(&sentences[idx], kind, doc, out);
                continue;
            }
            if current_tokens + tokens > self.config.chunk_size && !current.is_empty() {
                self.push_chunk(&current, &sentences, kind, doc, out);
                // Carry trailing sentences as the next chunk's prefix overlap.
                let mut carried = Vec::new();
                let mut carried_tokens = 0usize;
                for &prev in current.iter().rev() {
                    if carried_tokens + token_counts[prev] > self.config.chunk_overlap {
                        break;
                    }
                    carried_tokens += token_counts[prev];
                    carried.push(prev);
                }
                carried.reverse();
                current = carried;
                current_tokens = carried_tokens;
            }
            current.push(idx);
            current_tokens += tokens;
        }
        if !current.is_empty() {
            self.push_chunk(&current, &sentences, kind, doc, out);
        }
    }

    fn push_chunk(
        &self,
        indices: &[usize],
        sentences: &[String],
        kind: SectionKind,
        doc: &CaseDocument,
        out: &mut Vec<DocumentChunk>,
    ) {
        let text = indices
            .iter()
            .map(|&i| sentences[i].as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if text.trim().is_empty() {
            return;
        }
        let token_count = Self::count_tokens(&text);
        let chunk_index = out.len();
        out.push(DocumentChunk {
            chunk_id: DocumentChunk::make_id(&doc.case_reference, chunk_index),
            case_reference: doc.case_reference.clone(),
            chunk_index,
            text,
            section_kind: kind,
            year: doc.year,
            region: doc.region.clone(),
            case_type: doc.case_type.clone(),
            token_count,
        });
    }

    /// A single sentence above the chunk budget is split on word boundaries
    /// into token-bounded windows with the configured overlap step.
    fn split_long_sentence(
        &self,
        sentence: &str,
        kind: SectionKind,
        doc: &CaseDocument,
        out: &mut Vec<DocumentChunk>,
    ) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if words.is_empty() {
            return;
        }
        let mut start = 0usize;
        while start < words.len() {
            let mut end = start;
            let mut tokens = 0usize;
            while end < words.len() {
                let next = Self::count_tokens(words[end]) + 1;
                if end > start && tokens + next > self.config.chunk_size {
                    break;
                }
                tokens += next;
                end += 1;
            }
            let piece = words[start..end].join(" ");
            self.push_chunk(&[0], &[piece], kind, doc, out);
            if end == words.len() {
                break;
            }
            // Back up enough words to cover the overlap budget.
            let mut overlap = 0usize;
            let mut new_start = end;
            while new_start > start + 1 {
                overlap += Self::count_tokens(words[new_start - 1]) + 1;
                if overlap >= self.config.chunk_overlap {
                    break;
                }
                new_start -= 1;
            }
            start = new_start.max(start + 1);
        }
    }
}

/// Detect section headers and return `(kind, body)` pairs in document order.
/// Text between two headers belongs to the preceding header's section; text
/// before the first header is `Other`.
pub fn detect_sections(text: &str) -> Vec<(SectionKind, String)> {
    let mut boundaries: Vec<(usize, usize, SectionKind)> = Vec::new();
    for (kind, patterns) in SECTION_PATTERNS.iter() {
        for pattern in patterns {
            for m in pattern.find_iter(text) {
                boundaries.push((m.start(), m.end(), *kind));
            }
        }
    }
    boundaries.sort_by_key(|b| b.0);
    boundaries.dedup_by_key(|b| b.0);

    let mut sections = Vec::new();
    if boundaries.is_empty() {
        return sections;
    }

    let preamble = &text[..boundaries[0].0];
    if !preamble.trim().is_empty() {
        sections.push((SectionKind::Other, preamble.trim().to_string()));
    }
    for (i, &(_, header_end, kind)) in boundaries.iter().enumerate() {
        let body_end = boundaries
            .get(i + 1)
            .map(|next| next.0)
            .unwrap_or(text.len());
        let body = text[header_end..body_end].trim();
        if !body.is_empty() {
            sections.push((kind, body.to_string()));
        }
    }
    sections
}

/// Split on sentence ends: a `.`, `!` or `?` followed by whitespace and an
/// uppercase letter. Keeps abbreviation-heavy legal prose intact well enough
/// for chunk boundaries.
fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        let (pos, ch) = chars[i];
        if matches!(ch, '.' | '!' | '?') {
            let mut j = i + 1;
            let mut saw_space = false;
            while j < chars.len() && chars[j].1.is_whitespace() {
                saw_space = true;
                j += 1;
            }
            if saw_space && j < chars.len() && chars[j].1.is_uppercase() {
                let end = pos + ch.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = chars[j].0;
                i = j;
                continue;
            }
        }
        i += 1;
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> CaseDocument {
        CaseDocument {
            case_reference: "LON_00BK_HMF_2022_0227".to_string(),
            year: 2022,
            region: Some("LON".to_string()),
            region_name: Some("London".to_string()),
            case_type: Some("HMF".to_string()),
            case_type_name: None,
            title: None,
            full_text: text.to_string(),
            source_path: "test.pdf".to_string(),
            ingested_at: None,
        }
    }

    #[test]
    fn splits_sentences_on_terminators() {
        let sentences = split_sentences("The deposit was not protected. The tenant applied. Done.");
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[0], "The deposit was not protected.");
    }

    #[test]
    fn keeps_abbreviations_together() {
        let sentences = split_sentences("The property at no. 4 was inspected. It was clean.");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn detects_named_sections() {
        let text = "Preamble text here.\nBACKGROUND\nThe tenancy began in 2020.\nTHE FACTS\nThe deposit was 1500 pounds.\nREASONS\nSection 213 was not complied with.\nDECISION\nThe tribunal awards the tenant.";
        let sections = detect_sections(text);
        let kinds: Vec<SectionKind> = sections.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Other,
                SectionKind::Background,
                SectionKind::Facts,
                SectionKind::Reasoning,
                SectionKind::Decision,
            ]
        );
        assert!(sections[3].1.contains("Section 213"));
    }

    #[test]
    fn detects_numbered_headers() {
        let text = "1. BACKGROUND\nSome history.\n2. DECISION\nAward made.";
        let sections = detect_sections(text);
        assert_eq!(sections[0].0, SectionKind::Background);
        assert_eq!(sections[1].0, SectionKind::Decision);
    }

    #[test]
    fn chunks_inherit_document_metadata() {
        let d = doc("BACKGROUND\nThe tenancy started in June 2020 and the deposit was taken. The landlord did not protect it.");
        let chunks = LegalChunker::default().chunk_document(&d);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.year, d.year);
            assert_eq!(chunk.region, d.region);
            assert_eq!(chunk.case_type, d.case_type);
            assert_eq!(chunk.case_reference, d.case_reference);
        }
    }

    #[test]
    fn chunk_ids_are_deterministic() {
        let d = doc("THE FACTS\nFact one stated here. Fact two stated here. Fact three follows.");
        let chunker = LegalChunker::default();
        let first = chunker.chunk_document(&d);
        let second = chunker.chunk_document(&d);
        let ids_a: Vec<&str> = first.iter().map(|c| c.chunk_id.as_str()).collect();
        let ids_b: Vec<&str> = second.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a[0], "LON_00BK_HMF_2022_0227_0");
    }

    #[test]
    fn respects_token_budget() {
        let sentence = "The tribunal considered the schedule of dilapidations in detail. ";
        let body = sentence.repeat(60);
        let d = doc(&format!("REASONS\n{body}"));
        let config = ChunkConfig {
            chunk_size: 100,
            chunk_overlap: 20,
            max_chunk_size: 200,
        };
        let chunks = LegalChunker::new(config).chunk_document(&d);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 100, "chunk of {} tokens", chunk.token_count);
        }
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let sentence = "The inventory recorded the condition of every room at check-in. ";
        let body = sentence.repeat(40);
        let d = doc(&format!("THE FACTS\n{body}"));
        let config = ChunkConfig {
            chunk_size: 120,
            chunk_overlap: 30,
            max_chunk_size: 200,
        };
        let chunks = LegalChunker::new(config).chunk_document(&d);
        assert!(chunks.len() >= 2);
        // The next chunk starts with the previous chunk's trailing sentence.
        let first_tail = chunks[0].text.split(". ").last().unwrap().to_string();
        assert!(chunks[1].text.starts_with(first_tail.split('.').next().unwrap()));
    }

    #[test]
    fn chunks_never_cross_sections() {
        let text = "THE FACTS\nShort facts.\nDECISION\nShort decision.";
        let d = doc(text);
        let chunks = LegalChunker::default().chunk_document(&d);
        for chunk in &chunks {
            match chunk.section_kind {
                SectionKind::Facts => assert!(!chunk.text.contains("Short decision")),
                SectionKind::Decision => assert!(!chunk.text.contains("Short facts")),
                _ => {}
            }
        }
    }

    #[test]
    fn headerless_document_is_other() {
        let d = doc("Plain text with no recognisable headers. Just prose about a deposit.");
        let chunks = LegalChunker::default().chunk_document(&d);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_kind, SectionKind::Other);
    }
}
