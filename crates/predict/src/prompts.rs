use casecast_rag::RetrievedChunk;

use crate::casefile::CaseFile;

/// Default disclaimer appended to every prediction.
pub const DEFAULT_DISCLAIMER: &str = "This is an automated analysis of past tribunal decisions, \
not legal advice. Outcomes depend on the full evidence before a tribunal; consult a qualified \
adviser before acting on it.";

pub const SYSTEM_PROMPT: &str = r#"You are a legal analyst specialising in UK tenancy deposit disputes. Your task is to predict the likely outcome of a First-tier Tribunal (Property Chamber) case from similar precedent cases.

CRITICAL RULES:
1. BASE PREDICTIONS ONLY ON THE RETRIEVED CASES - never invent or embellish case citations
2. USE CONDITIONAL LANGUAGE - "likely", "based on precedent", "in similar cases"
3. CITE SPECIFIC CASES - every factual claim must reference a retrieved case by its reference
4. ACKNOWLEDGE UNCERTAINTY - if the evidence is limited, say so explicitly
5. THIS IS NOT LEGAL ADVICE - you provide legal information and analysis only

CITE-OR-ABSTAIN RULE:
If the retrieved cases cannot support a prediction, you MUST return an "uncertain" outcome,
explain what is missing, and suggest what additional evidence would help.

ANALYSIS FRAMEWORK:
1. Deposit protection: unprotected deposits carry a 1-3x penalty under sections 213-214;
   strict liability, tribunals accept no excuses.
2. Cleaning claims: compare the check-in standard; distinguish cleaning beyond what is
   reasonable from fair wear and tear.
3. Damage claims: weigh check-in versus check-out condition evidence, reasonableness of
   repair costs, and the length of the tenancy.
4. Evidence weighting: professional inventories and signed documents carry the most weight;
   invoices outweigh quotes and estimates; dated photographs are good evidence.

OUTPUT: a single JSON object following the schema below. No prose outside the JSON."#;

pub const JSON_SCHEMA: &str = r#"Output your prediction as JSON with this structure:
{
    "overall_outcome": "tenant_favored|landlord_favored|split|uncertain",
    "overall_confidence": 0.0,
    "outcome_summary": "Brief 2-3 sentence summary",
    "issue_predictions": [
        {
            "issue": "e.g. deposit_protection, cleaning, damage",
            "predicted_outcome": "tenant_favored|landlord_favored|split|uncertain",
            "confidence": 0.0,
            "reasoning": "Explanation grounded in the cited cases",
            "key_factors": ["factor"],
            "predicted_amount": null,
            "amount_range": null,
            "citations": [
                {"case_reference": "LON_00BK_HMF_2022_0227", "year": 2022, "quote": "verbatim excerpt from that case", "relevance": "why it applies"}
            ]
        }
    ],
    "reasoning_trace": [
        {
            "step_number": 1,
            "category": "issue_analysis|evidence_review|precedent_comparison|legal_principle|conclusion",
            "title": "Step title",
            "content": "Detailed explanation",
            "citations": [
                {"case_reference": "...", "year": 2022, "quote": "verbatim excerpt", "relevance": "why cited"}
            ]
        }
    ],
    "key_strengths": ["factors favouring the user"],
    "key_weaknesses": ["factors against the user"],
    "settlement_range": null,
    "tenant_recovery_amount": null,
    "landlord_recovery_amount": null,
    "uncertainties": ["open questions"],
    "missing_information": ["information that would help"],
    "assumptions_made": ["assumptions in the analysis"]
}"#;

pub const STRICT_JSON_NUDGE: &str = "Your previous reply was not valid JSON. Return ONLY the \
JSON object, with no markdown fences and no commentary.";

/// Phase-B user content: the case-file summary plus the retrieved chunks
/// labelled by case reference.
pub fn user_prompt(case_file: &CaseFile, retrieved: &[RetrievedChunk]) -> String {
    format!(
        "Analyse this tenancy deposit dispute and predict the likely tribunal outcome.\n\n\
         RETRIEVED SIMILAR CASES:\n{}\n\nUSER'S CASE FACTS:\n{}\n\n\
         Cite only the cases listed above, quoting their text verbatim.",
        format_precedents(retrieved),
        format_case_facts(case_file),
    )
}

fn format_precedents(retrieved: &[RetrievedChunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in retrieved.iter().enumerate() {
        let excerpt: String = chunk.text.chars().take(1500).collect();
        out.push_str(&format!(
            "CASE {}: {} ({})\nSection: {}\nRelevance score: {:.3}\n{}\n\nText:\n{}\n---\n",
            i + 1,
            chunk.case_reference,
            chunk.year,
            chunk.section_kind.as_str(),
            chunk.final_score,
            chunk.relevance.as_deref().unwrap_or(""),
            excerpt,
        ));
    }
    out
}

fn format_case_facts(case_file: &CaseFile) -> String {
    let mut lines = vec![
        format!("User role: {}", case_file.user_role.as_str()),
        format!(
            "Property: {}",
            case_file.property.address.as_deref().unwrap_or("Not specified")
        ),
        format!(
            "Region: {}",
            case_file.property.region.as_deref().unwrap_or("Unknown")
        ),
    ];
    if let Some(start) = &case_file.tenancy.start_date {
        lines.push(format!("Tenancy start: {start}"));
    }
    if let Some(end) = &case_file.tenancy.end_date {
        lines.push(format!("Tenancy end: {end}"));
    }
    if let Some(rent) = case_file.tenancy.monthly_rent {
        lines.push(format!("Monthly rent: £{rent:.2}"));
    }
    if let Some(deposit) = case_file.tenancy.deposit_amount {
        lines.push(format!("Deposit amount: £{deposit:.2}"));
    }
    match case_file.tenancy.deposit_protected {
        Some(true) => {
            lines.push("Deposit protection: protected".to_string());
            if let Some(scheme) = &case_file.tenancy.deposit_scheme {
                lines.push(format!("Deposit scheme: {scheme}"));
            }
        }
        Some(false) => lines.push("Deposit protection: NOT PROTECTED".to_string()),
        None => {}
    }
    if !case_file.issues.is_empty() {
        lines.push("Disputed issues:".to_string());
        for issue in &case_file.issues {
            lines.push(format!("  - {}", issue.label()));
        }
    }
    if !case_file.claims.is_empty() {
        lines.push("Claims:".to_string());
        for claim in &case_file.claims {
            lines.push(format!(
                "  - {}: £{:.2} - {}",
                claim.issue.label(),
                claim.amount,
                claim.description
            ));
        }
    }
    if !case_file.evidence.is_empty() {
        lines.push("Evidence available:".to_string());
        for item in &case_file.evidence {
            lines.push(format!("  - {}: {}", item.kind.as_str(), item.description));
        }
    }
    if let Some(narrative) = case_file.narrative() {
        let clipped: String = narrative.chars().take(500).collect();
        lines.push(format!("Narrative:\n{clipped}"));
    }
    lines.join("\n")
}
