use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Dispute issue categories seen in deposit cases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DepositProtection,
    Cleaning,
    Damage,
    FairWearAndTear,
    Inventory,
    RentArrears,
    Garden,
    Decoration,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::DepositProtection => "deposit_protection",
            IssueKind::Cleaning => "cleaning",
            IssueKind::Damage => "damage",
            IssueKind::FairWearAndTear => "fair_wear_and_tear",
            IssueKind::Inventory => "inventory",
            IssueKind::RentArrears => "rent_arrears",
            IssueKind::Garden => "garden",
            IssueKind::Decoration => "decoration",
        }
    }

    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

/// Evidence categories recognised in case files and chunk text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Inventory,
    Photographs,
    Receipts,
    Correspondence,
    Witness,
    Contract,
    Other,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Inventory => "inventory",
            EvidenceKind::Photographs => "photographs",
            EvidenceKind::Receipts => "receipts",
            EvidenceKind::Correspondence => "correspondence",
            EvidenceKind::Witness => "witness",
            EvidenceKind::Contract => "contract",
            EvidenceKind::Other => "other",
        }
    }
}

pub type IssueKeywords = BTreeMap<IssueKind, Vec<String>>;
pub type EvidenceKeywords = BTreeMap<EvidenceKind, Vec<String>>;

/// Issue-keyword dictionary used for reranking and query tagging.
/// Configuration, not code — this is the default seed.
pub fn default_issue_keywords() -> IssueKeywords {
    let entry = |words: &[&str]| words.iter().map(|w| w.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        (
            IssueKind::DepositProtection,
            entry(&[
                "deposit protection",
                "section 213",
                "section 214",
                "tenancy deposit scheme",
                "tds",
                "dps",
                "mydeposits",
                "protected deposit",
                "unprotected deposit",
                "prescribed information",
            ]),
        ),
        (
            IssueKind::Cleaning,
            entry(&[
                "cleaning",
                "professional clean",
                "end of tenancy clean",
                "cleanliness",
                "dirty",
                "filthy",
                "clean condition",
            ]),
        ),
        (
            IssueKind::Damage,
            entry(&[
                "damage",
                "damages",
                "broken",
                "stain",
                "mark",
                "scratch",
                "hole",
                "burn",
                "tear",
                "worn",
                "deterioration",
            ]),
        ),
        (
            IssueKind::FairWearAndTear,
            entry(&[
                "fair wear and tear",
                "reasonable wear",
                "natural wear",
                "normal use",
                "betterment",
            ]),
        ),
        (
            IssueKind::Inventory,
            entry(&[
                "inventory",
                "check-in",
                "check-out",
                "schedule of condition",
                "photographic evidence",
                "inspection report",
            ]),
        ),
        (
            IssueKind::RentArrears,
            entry(&[
                "rent arrears",
                "unpaid rent",
                "outstanding rent",
                "rent owed",
                "arrears",
            ]),
        ),
        (
            IssueKind::Garden,
            entry(&[
                "garden",
                "lawn",
                "grass",
                "overgrown",
                "landscaping",
                "outdoor area",
                "patio",
            ]),
        ),
        (
            IssueKind::Decoration,
            entry(&[
                "redecoration",
                "painting",
                "redecorating",
                "walls",
                "paintwork",
                "marks on walls",
            ]),
        ),
    ])
}

pub fn default_evidence_keywords() -> EvidenceKeywords {
    let entry = |words: &[&str]| words.iter().map(|w| w.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        (
            EvidenceKind::Inventory,
            entry(&[
                "inventory",
                "schedule of condition",
                "check-in report",
                "check-out report",
            ]),
        ),
        (
            EvidenceKind::Photographs,
            entry(&["photograph", "photo", "picture", "image"]),
        ),
        (
            EvidenceKind::Receipts,
            entry(&["receipt", "invoice", "quotation", "quote", "estimate"]),
        ),
        (
            EvidenceKind::Correspondence,
            entry(&["email", "letter", "text message", "whatsapp", "correspondence"]),
        ),
        (
            EvidenceKind::Witness,
            entry(&["witness", "testimony", "statement"]),
        ),
        (
            EvidenceKind::Contract,
            entry(&["tenancy agreement", "contract", "lease"]),
        ),
    ])
}

/// Issue kinds whose keyword lists match the text. One keyword is enough.
pub fn detect_issues(text: &str, keywords: &IssueKeywords) -> BTreeSet<IssueKind> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w.as_str())))
        .map(|(kind, _)| *kind)
        .collect()
}

/// Evidence kinds whose keyword lists match the text.
pub fn detect_evidence(text: &str, keywords: &EvidenceKeywords) -> BTreeSet<EvidenceKind> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w.as_str())))
        .map(|(kind, _)| *kind)
        .collect()
}
