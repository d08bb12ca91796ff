use serde::{Deserialize, Serialize};

/// Terminal outcome tag of a prediction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    TenantFavored,
    LandlordFavored,
    Split,
    Uncertain,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::TenantFavored => "tenant_favored",
            Outcome::LandlordFavored => "landlord_favored",
            Outcome::Split => "split",
            Outcome::Uncertain => "uncertain",
        }
    }

    /// Accepts both the engine's tags and the older win/lose spellings some
    /// model outputs still use.
    pub fn parse(value: &str) -> Outcome {
        match value.trim().to_lowercase().as_str() {
            "tenant_favored" | "tenant_win" | "tenant" => Outcome::TenantFavored,
            "landlord_favored" | "landlord_win" | "landlord" => Outcome::LandlordFavored,
            "split" => Outcome::Split,
            _ => Outcome::Uncertain,
        }
    }
}

/// A citation into the retrieved evidence set. Valid only when the case
/// reference appears in the retrieval the prediction was generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseCitation {
    pub case_reference: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub chunk_id: Option<String>,
    /// Quoted excerpt; must be a whitespace-normalized substring of a
    /// retrieved chunk of the cited case.
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub similarity: Option<f32>,
    #[serde(default)]
    pub relevance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuePrediction {
    pub issue: String,
    pub predicted_outcome: Outcome,
    #[serde(default)]
    pub predicted_amount: Option<f64>,
    #[serde(default)]
    pub amount_range: Option<(f64, f64)>,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub key_factors: Vec<String>,
    #[serde(default)]
    pub citations: Vec<CaseCitation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step_number: usize,
    /// issue_analysis, evidence_review, precedent_comparison,
    /// legal_principle, conclusion, uncited_claim_removed, synthesis_failure.
    pub category: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub citations: Vec<CaseCitation>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// A structured outcome prediction. Created once per generation request and
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_id: String,
    pub case_id: String,
    pub overall_outcome: Outcome,
    pub overall_confidence: f32,
    #[serde(default)]
    pub outcome_summary: String,
    #[serde(default)]
    pub issue_predictions: Vec<IssuePrediction>,
    #[serde(default)]
    pub reasoning_trace: Vec<ReasoningStep>,
    #[serde(default)]
    pub key_strengths: Vec<String>,
    #[serde(default)]
    pub key_weaknesses: Vec<String>,
    #[serde(default)]
    pub uncertainties: Vec<String>,
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub assumptions_made: Vec<String>,
    /// Case references actually consulted during synthesis.
    #[serde(default)]
    pub retrieved_cases: Vec<String>,
    #[serde(default)]
    pub rag_confidence: Option<f32>,
    #[serde(default)]
    pub settlement_range: Option<(f64, f64)>,
    #[serde(default)]
    pub tenant_recovery_amount: Option<f64>,
    #[serde(default)]
    pub landlord_recovery_amount: Option<f64>,
    #[serde(default)]
    pub model_version: Option<String>,
    pub disclaimer: String,
    pub created_at: String,
}

impl Prediction {
    /// An `uncertain` prediction used by the gate, abstention and failure
    /// paths. Always carries the disclaimer.
    pub fn uncertain(
        case_id: &str,
        category: &str,
        reason: &str,
        missing_information: Vec<String>,
        disclaimer: &str,
    ) -> Self {
        Self {
            prediction_id: uuid::Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            overall_outcome: Outcome::Uncertain,
            overall_confidence: 0.0,
            outcome_summary: reason.to_string(),
            issue_predictions: Vec::new(),
            reasoning_trace: vec![ReasoningStep {
                step_number: 1,
                category: category.to_string(),
                title: "Prediction withheld".to_string(),
                content: reason.to_string(),
                citations: Vec::new(),
                confidence: Some(0.0),
            }],
            key_strengths: Vec::new(),
            key_weaknesses: Vec::new(),
            uncertainties: vec![reason.to_string()],
            missing_information,
            assumptions_made: Vec::new(),
            retrieved_cases: Vec::new(),
            rag_confidence: None,
            settlement_range: None,
            tenant_recovery_amount: None,
            landlord_recovery_amount: None,
            model_version: None,
            disclaimer: disclaimer.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn citation_count(&self) -> usize {
        let issue_citations: usize = self
            .issue_predictions
            .iter()
            .map(|p| p.citations.len())
            .sum();
        let step_citations: usize = self.reasoning_trace.iter().map(|s| s.citations.len()).sum();
        issue_citations + step_citations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parsing_accepts_both_spellings() {
        assert_eq!(Outcome::parse("tenant_favored"), Outcome::TenantFavored);
        assert_eq!(Outcome::parse("tenant_win"), Outcome::TenantFavored);
        assert_eq!(Outcome::parse("LANDLORD_WIN"), Outcome::LandlordFavored);
        assert_eq!(Outcome::parse("split"), Outcome::Split);
        assert_eq!(Outcome::parse("gibberish"), Outcome::Uncertain);
    }

    #[test]
    fn uncertain_prediction_keeps_disclaimer_and_reason() {
        let prediction = Prediction::uncertain(
            "case-9",
            "missing_required_fields",
            "Required intake fields are missing.",
            vec!["property_address".to_string()],
            "Not legal advice.",
        );
        assert_eq!(prediction.overall_outcome, Outcome::Uncertain);
        assert_eq!(prediction.reasoning_trace.len(), 1);
        assert_eq!(prediction.reasoning_trace[0].category, "missing_required_fields");
        assert_eq!(prediction.missing_information, vec!["property_address"]);
        assert_eq!(prediction.disclaimer, "Not legal advice.");
        assert_eq!(prediction.citation_count(), 0);
    }
}
