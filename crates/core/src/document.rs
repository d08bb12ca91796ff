use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Coarse structural tag on a chunk of a tribunal decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Background,
    Facts,
    Reasoning,
    Decision,
    Other,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Background => "background",
            SectionKind::Facts => "facts",
            SectionKind::Reasoning => "reasoning",
            SectionKind::Decision => "decision",
            SectionKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> SectionKind {
        match value {
            "background" => SectionKind::Background,
            "facts" => SectionKind::Facts,
            "reasoning" => SectionKind::Reasoning,
            "decision" => SectionKind::Decision,
            _ => SectionKind::Other,
        }
    }
}

/// One First-tier Tribunal decision. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseDocument {
    pub case_reference: String,
    /// Decision (publication) year, never the filing year embedded in the reference.
    pub year: i32,
    pub region: Option<String>,
    pub region_name: Option<String>,
    pub case_type: Option<String>,
    pub case_type_name: Option<String>,
    pub title: Option<String>,
    pub full_text: String,
    pub source_path: String,
    pub ingested_at: Option<String>,
}

/// A contiguous text window from exactly one `CaseDocument`.
///
/// Chunk metadata (year, region, case_type) always matches the parent
/// document's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub case_reference: String,
    pub chunk_index: usize,
    pub text: String,
    pub section_kind: SectionKind,
    pub year: i32,
    pub region: Option<String>,
    pub case_type: Option<String>,
    pub token_count: usize,
}

impl DocumentChunk {
    /// Deterministic id so re-ingesting the same document yields the same ids.
    pub fn make_id(case_reference: &str, chunk_index: usize) -> String {
        format!("{case_reference}_{chunk_index}")
    }
}

/// Sidecar metadata written next to each scraped PDF.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidecarMetadata {
    pub case_reference: Option<String>,
    pub year: Option<i32>,
    pub region_code: Option<String>,
    pub region_name: Option<String>,
    pub case_type_code: Option<String>,
    pub case_type_name: Option<String>,
    pub title: Option<String>,
    pub decision_date: Option<String>,
}

/// Components parsed from a BAILII-style case reference,
/// `<REGION>_<office>_<type>_<year>_<seq>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceParts {
    pub region: Option<String>,
    pub case_type: Option<String>,
    /// Filing year embedded in the reference. Only a fallback for the
    /// decision year; sidecar metadata wins when present.
    pub year: Option<i32>,
}

/// Parse a case reference into region, case-type and embedded year.
///
/// The region is the first component; the case type is the first 3-letter
/// alphabetic component after it; the year is the first plausible 4-digit
/// component.
pub fn parse_case_reference(case_reference: &str) -> Result<ReferenceParts> {
    let parts: Vec<&str> = case_reference.split('_').collect();
    if parts.len() < 3 {
        return Err(CoreError::InvalidCaseReference(case_reference.to_string()));
    }

    let region = Some(parts[0].to_ascii_uppercase())
        .filter(|r| r.len() >= 2 && r.chars().all(|c| c.is_ascii_alphabetic()));

    let case_type = parts[1..]
        .iter()
        .find(|p| p.len() == 3 && p.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|p| p.to_ascii_uppercase());

    let year = parts
        .iter()
        .filter_map(|p| p.parse::<i32>().ok())
        .find(|y| (2000..=2099).contains(y));

    Ok(ReferenceParts {
        region,
        case_type,
        year,
    })
}

/// Extract a case reference from a PDF path. Scraped decisions live under
/// `.../<year>/<case_reference>/decision.pdf`, or the file itself carries the
/// reference as its stem.
pub fn case_reference_from_path(pdf_path: &Path) -> Option<String> {
    let stem = pdf_path.file_stem()?.to_str()?;
    if parse_case_reference(stem).is_ok() {
        return Some(stem.to_string());
    }
    let parent = pdf_path.parent()?.file_name()?.to_str()?;
    if parse_case_reference(parent).is_ok() {
        return Some(parent.to_string());
    }
    None
}

/// Tribunal region display names, keyed by BAILII region code.
pub fn region_name(code: &str) -> Option<&'static str> {
    let name = match code.to_ascii_uppercase().as_str() {
        "LON" => "London",
        "CHI" => "Chichester (South East)",
        "MAN" => "Manchester (North West)",
        "BIR" => "Birmingham (Midlands)",
        "CAM" => "Cambridge (East)",
        "HAV" => "Havant (South)",
        "MID" => "Midlands",
        "NOR" => "Northern",
        "WMI" => "West Midlands",
        "EAS" => "Eastern",
        "SOU" => "Southern",
        _ => return None,
    };
    Some(name)
}

/// Case-type display names, keyed by BAILII case-type code.
pub fn case_type_name(code: &str) -> Option<&'static str> {
    let name = match code.to_ascii_uppercase().as_str() {
        "HNA" => "Housing Act 2004",
        "HMF" => "Housing and Planning Act 2016",
        "LDC" => "Leasehold - Dispute/Complaint",
        "LSC" => "Leasehold - Service Charges",
        "LAM" => "Leasehold - Administration",
        "LRM" => "Leasehold - Right to Manage",
        "LBC" => "Leasehold - Breach of Covenant",
        "LEE" => "Leasehold - Enfranchisement",
        "LVT" => "Leasehold Valuation Tribunal",
        "RRO" => "Rent Repayment Order",
        "MHR" => "Mobile Homes",
        "RPM" => "Residential Property",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_full_reference() {
        let parts = parse_case_reference("LON_00BK_HMF_2022_0227").unwrap();
        assert_eq!(parts.region.as_deref(), Some("LON"));
        assert_eq!(parts.case_type.as_deref(), Some("HMF"));
        assert_eq!(parts.year, Some(2022));
    }

    #[test]
    fn rejects_short_reference() {
        assert!(parse_case_reference("LON_0001").is_err());
    }

    #[test]
    fn reference_from_parent_directory() {
        let path = PathBuf::from("data/raw/2022/CHI_00ML_HNA_2022_0012/decision.pdf");
        assert_eq!(
            case_reference_from_path(&path).as_deref(),
            Some("CHI_00ML_HNA_2022_0012")
        );
    }

    #[test]
    fn reference_from_file_stem() {
        let path = PathBuf::from("pdfs/MAN_00BR_HMF_2023_0101.pdf");
        assert_eq!(
            case_reference_from_path(&path).as_deref(),
            Some("MAN_00BR_HMF_2023_0101")
        );
    }

    #[test]
    fn section_kind_round_trips() {
        for kind in [
            SectionKind::Background,
            SectionKind::Facts,
            SectionKind::Reasoning,
            SectionKind::Decision,
            SectionKind::Other,
        ] {
            assert_eq!(SectionKind::parse(kind.as_str()), kind);
        }
    }
}
