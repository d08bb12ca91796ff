//! Core document processing for tribunal deposit-dispute decisions:
//! PDF extraction, text cleaning with PII redaction, and section-aware
//! chunking with a stable tokenizer.

pub mod chunk;
pub mod clean;
pub mod document;
pub mod error;
pub mod extract;
pub mod issues;

pub use chunk::{detect_sections, ChunkConfig, LegalChunker};
pub use clean::{clean_text, RedactionStats, TextCleaner};
pub use document::{
    case_reference_from_path, case_type_name, parse_case_reference, region_name, CaseDocument,
    DocumentChunk, ReferenceParts, SectionKind, SidecarMetadata,
};
pub use error::{CoreError, Result};
pub use extract::{resolve_metadata, PdfExtractor, ResolvedMetadata, DEFAULT_MIN_CHARS};
pub use issues::{
    default_evidence_keywords, default_issue_keywords, detect_evidence, detect_issues,
    EvidenceKeywords, EvidenceKind, IssueKeywords, IssueKind,
};
