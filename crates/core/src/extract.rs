use std::fs;
use std::path::Path;

use crate::clean::TextCleaner;
use crate::document::{
    case_reference_from_path, case_type_name, parse_case_reference, region_name, CaseDocument,
    SidecarMetadata,
};
use crate::error::{CoreError, Result};

/// Minimum extractable characters before a PDF is treated as scan-only.
pub const DEFAULT_MIN_CHARS: usize = 500;

/// Extracts tribunal decision PDFs into `CaseDocument`s.
pub struct PdfExtractor {
    min_chars: usize,
    cleaner: TextCleaner,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CHARS)
    }
}

impl PdfExtractor {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            cleaner: TextCleaner::new(true),
        }
    }

    /// Extract raw text from a PDF, page by page, preserving paragraph breaks.
    /// Rejects documents with fewer than `min_chars` extractable characters.
    pub fn extract_text(&self, pdf_path: &Path) -> Result<String> {
        let pages = pdf_extract::extract_text_by_pages(pdf_path).map_err(|e| CoreError::Pdf {
            path: pdf_path.to_path_buf(),
            message: e.to_string(),
        })?;
        let full_text = pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let chars = full_text.trim().chars().count();
        if chars < self.min_chars {
            return Err(CoreError::ScanOnlyPdf {
                path: pdf_path.to_path_buf(),
                chars,
            });
        }
        Ok(full_text)
    }

    /// Extract a complete `CaseDocument`: text plus metadata.
    ///
    /// Metadata comes from the scraper's sidecar `metadata.json` beside the
    /// PDF when present; otherwise it is parsed from the path using the
    /// BAILII naming convention. Sidecar metadata wins over the path parse.
    pub fn extract_case_document(&mut self, pdf_path: &Path) -> Result<CaseDocument> {
        let raw_text = self.extract_text(pdf_path)?;
        let full_text = self.cleaner.clean(&raw_text);

        let sidecar = load_sidecar(pdf_path);
        let meta = resolve_metadata(pdf_path, sidecar.as_ref())?;

        Ok(CaseDocument {
            case_reference: meta.case_reference,
            year: meta.year,
            region: meta.region,
            region_name: meta.region_name,
            case_type: meta.case_type,
            case_type_name: meta.case_type_name,
            title: sidecar.and_then(|s| s.title),
            full_text,
            source_path: pdf_path.display().to_string(),
            ingested_at: None,
        })
    }

    pub fn redaction_stats(&self) -> crate::clean::RedactionStats {
        self.cleaner.stats()
    }
}

#[derive(Debug)]
pub struct ResolvedMetadata {
    pub case_reference: String,
    pub year: i32,
    pub region: Option<String>,
    pub region_name: Option<String>,
    pub case_type: Option<String>,
    pub case_type_name: Option<String>,
}

fn load_sidecar(pdf_path: &Path) -> Option<SidecarMetadata> {
    let sidecar_path = pdf_path.parent()?.join("metadata.json");
    if !sidecar_path.exists() {
        return None;
    }
    match fs::read_to_string(&sidecar_path)
        .map_err(CoreError::from)
        .and_then(|raw| serde_json::from_str::<SidecarMetadata>(&raw).map_err(CoreError::from))
    {
        Ok(sidecar) => Some(sidecar),
        Err(err) => {
            tracing::warn!(path = %sidecar_path.display(), error = %err, "ignoring unreadable sidecar metadata");
            None
        }
    }
}

/// Resolve case metadata, preferring the sidecar over the path parse.
///
/// The `year` is the decision year: sidecar first, then the year embedded in
/// the reference as a fallback.
pub fn resolve_metadata(
    pdf_path: &Path,
    sidecar: Option<&SidecarMetadata>,
) -> Result<ResolvedMetadata> {
    let case_reference = sidecar
        .and_then(|s| s.case_reference.clone())
        .or_else(|| case_reference_from_path(pdf_path))
        .ok_or_else(|| CoreError::UnresolvableMetadata(pdf_path.to_path_buf()))?;

    let parts = parse_case_reference(&case_reference)?;

    let year = sidecar
        .and_then(|s| s.year)
        .or(parts.year)
        .ok_or_else(|| CoreError::UnresolvableMetadata(pdf_path.to_path_buf()))?;

    let region = sidecar
        .and_then(|s| s.region_code.clone())
        .or(parts.region);
    let case_type = sidecar
        .and_then(|s| s.case_type_code.clone())
        .or(parts.case_type);

    let region_display = sidecar
        .and_then(|s| s.region_name.clone())
        .or_else(|| region.as_deref().and_then(region_name).map(String::from));
    let case_type_display = sidecar.and_then(|s| s.case_type_name.clone()).or_else(|| {
        case_type
            .as_deref()
            .and_then(case_type_name)
            .map(String::from)
    });

    Ok(ResolvedMetadata {
        case_reference,
        year,
        region,
        region_name: region_display,
        case_type,
        case_type_name: case_type_display,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn path_parse_supplies_metadata() {
        let path = PathBuf::from("data/raw/2022/LON_00BK_HMF_2022_0227/decision.pdf");
        let meta = resolve_metadata(&path, None).unwrap();
        assert_eq!(meta.case_reference, "LON_00BK_HMF_2022_0227");
        assert_eq!(meta.year, 2022);
        assert_eq!(meta.region.as_deref(), Some("LON"));
        assert_eq!(meta.region_name.as_deref(), Some("London"));
        assert_eq!(meta.case_type.as_deref(), Some("HMF"));
    }

    #[test]
    fn sidecar_wins_over_path() {
        let path = PathBuf::from("data/raw/2022/LON_00BK_HMF_2022_0227/decision.pdf");
        let sidecar = SidecarMetadata {
            case_reference: Some("LON_00BK_HMF_2022_0227".to_string()),
            // Decision year differs from the filing year in the reference.
            year: Some(2023),
            region_code: Some("CHI".to_string()),
            ..Default::default()
        };
        let meta = resolve_metadata(&path, Some(&sidecar)).unwrap();
        assert_eq!(meta.year, 2023);
        assert_eq!(meta.region.as_deref(), Some("CHI"));
    }

    #[test]
    fn malformed_path_is_rejected() {
        let path = PathBuf::from("downloads/notes.pdf");
        assert!(matches!(
            resolve_metadata(&path, None),
            Err(CoreError::UnresolvableMetadata(_))
        ));
    }
}
