use serde::{Deserialize, Serialize};

use casecast_core::{EvidenceKind, IssueKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Tenant,
    Landlord,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Tenant => "tenant",
            PartyRole::Landlord => "landlord",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub address: Option<String>,
    pub postcode: Option<String>,
    /// Tribunal region code, e.g. LON, CHI.
    pub region: Option<String>,
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenancyDetails {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub monthly_rent: Option<f64>,
    pub deposit_amount: Option<f64>,
    /// None until the user has answered either way.
    pub deposit_protected: Option<bool>,
    pub deposit_scheme: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    pub description: String,
    #[serde(default)]
    pub extracted_text: Option<String>,
}

/// A per-issue monetary claim with pointers into the evidence list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub issue: IssueKind,
    pub amount: f64,
    pub description: String,
    #[serde(default)]
    pub evidence_refs: Vec<usize>,
}

/// Names of the five required intake fields, as reported to the user.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "property_address",
    "tenancy_start_date",
    "deposit_amount",
    "issues",
    "deposit_protection_status",
];

/// The user-supplied dispute, assembled by the intake collaborator. The
/// engine borrows a read-only snapshot and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseFile {
    pub case_id: String,
    pub user_role: PartyRole,
    #[serde(default)]
    pub property: PropertyDetails,
    #[serde(default)]
    pub tenancy: TenancyDetails,
    #[serde(default)]
    pub issues: Vec<IssueKind>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub claims: Vec<Claim>,
    #[serde(default)]
    pub tenant_narrative: Option<String>,
    #[serde(default)]
    pub landlord_narrative: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl CaseFile {
    pub fn new(case_id: impl Into<String>, user_role: PartyRole) -> Self {
        Self {
            case_id: case_id.into(),
            user_role,
            property: PropertyDetails::default(),
            tenancy: TenancyDetails::default(),
            issues: Vec::new(),
            evidence: Vec::new(),
            claims: Vec::new(),
            tenant_narrative: None,
            landlord_narrative: None,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Required fields that are still missing. `intake_complete` holds
    /// exactly when this is empty.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !present(&self.property.address) {
            missing.push(REQUIRED_FIELDS[0]);
        }
        if !present(&self.tenancy.start_date) {
            missing.push(REQUIRED_FIELDS[1]);
        }
        if self.tenancy.deposit_amount.is_none() {
            missing.push(REQUIRED_FIELDS[2]);
        }
        if self.issues.is_empty() {
            missing.push(REQUIRED_FIELDS[3]);
        }
        if self.tenancy.deposit_protected.is_none() {
            missing.push(REQUIRED_FIELDS[4]);
        }
        missing
    }

    pub fn intake_complete(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    /// Fraction of tracked fields (required and optional) that are present.
    pub fn completeness_score(&self) -> f32 {
        let required_present = (5 - self.missing_required_fields().len()) as f32;
        let optional = [
            present(&self.tenancy.end_date),
            self.tenancy.monthly_rent.is_some(),
            present(&self.property.region),
            !self.evidence.is_empty(),
            !self.claims.is_empty(),
            present(&self.tenant_narrative) || present(&self.landlord_narrative),
        ];
        let optional_present = optional.iter().filter(|p| **p).count() as f32;
        (required_present + optional_present) / (5.0 + optional.len() as f32)
    }

    pub fn narrative(&self) -> Option<&str> {
        self.tenant_narrative
            .as_deref()
            .or(self.landlord_narrative.as_deref())
            .filter(|n| !n.trim().is_empty())
    }

    /// Compact textual query for retrieval: role, issues, deposit facts,
    /// evidence summary, region and a truncated narrative.
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.push(format!("{} deposit dispute", self.user_role.as_str()));

        if !self.issues.is_empty() {
            let issues: Vec<String> = self.issues.iter().map(|i| i.label()).collect();
            parts.push(format!("issues: {}", issues.join(", ")));
        }
        if let Some(amount) = self.tenancy.deposit_amount {
            parts.push(format!("deposit of £{amount:.0}"));
        }
        match self.tenancy.deposit_protected {
            Some(true) => parts.push("deposit protected in a scheme".to_string()),
            Some(false) => parts.push("deposit not protected, section 213".to_string()),
            None => {}
        }
        if !self.evidence.is_empty() {
            let kinds: Vec<&str> = self.evidence.iter().map(|e| e.kind.as_str()).collect();
            parts.push(format!("evidence: {}", kinds.join(", ")));
        }
        if let Some(region) = self.property.region.as_deref() {
            parts.push(format!("region {region}"));
        }
        if let Some(narrative) = self.narrative() {
            parts.push(truncate_words(narrative, 80));
        }
        parts.join(". ")
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}
