use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use casecast_llm::{LlmClient, LlmError, LlmRequest, LlmResponse};
use casecast_rag::{Engine, RetrievalOutcome, SearchFilter};

use crate::casefile::CaseFile;
use crate::error::Result;
use crate::prediction::{
    CaseCitation, IssuePrediction, Outcome, Prediction, ReasoningStep,
};
use crate::prompts::{user_prompt, DEFAULT_DISCLAIMER, JSON_SCHEMA, STRICT_JSON_NUDGE, SYSTEM_PROMPT};

/// The chat capability the synthesizer depends on. Production wires in
/// [`casecast_llm::LlmClient`]; tests substitute a scripted model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, model: &str, req: &LlmRequest) -> casecast_llm::Result<LlmResponse>;
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, model: &str, req: &LlmRequest) -> casecast_llm::Result<LlmResponse> {
        LlmClient::chat(self, model, req).await
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub primary_model: String,
    /// Used once when the primary model errors out hard.
    pub fallback_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Distinct retrieved chunks required before synthesis proceeds.
    pub min_cases_required: usize,
    /// Chunks fed to the model.
    pub max_cases: usize,
    /// Wall-clock budget for the whole generation.
    pub budget: Duration,
    pub disclaimer: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            primary_model: "claude-sonnet-4-20250514".to_string(),
            fallback_model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 4096,
            temperature: 0.3,
            min_cases_required: 3,
            max_cases: 10,
            budget: Duration::from_secs(120),
            disclaimer: DEFAULT_DISCLAIMER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PredictOptions {
    pub include_reasoning: bool,
    pub max_cases: Option<usize>,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            include_reasoning: true,
            max_cases: None,
        }
    }
}

/// Turns a case file plus retrieved precedent into a structured prediction.
///
/// Generation walks a fixed state machine:
/// `gate → retrieve → prompt → parse → cite-validate → (ok | retry | downgrade) → emit`.
/// Every exit path emits a prediction carrying the disclaimer; a failed or
/// degraded generation is never returned as confident.
pub struct Synthesizer {
    chat: Arc<dyn ChatModel>,
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(chat: Arc<dyn ChatModel>, config: SynthesisConfig) -> Self {
        Self { chat, config }
    }

    pub async fn predict(
        &self,
        case_file: &CaseFile,
        engine: &Engine,
        options: PredictOptions,
    ) -> Result<Prediction> {
        // Gate: refuse before any retrieval or model call.
        let missing = case_file.missing_required_fields();
        if !missing.is_empty() {
            tracing::info!(case_id = %case_file.case_id, ?missing, "intake incomplete, refusing to synthesize");
            return Ok(Prediction::uncertain(
                &case_file.case_id,
                "missing_required_fields",
                "Required intake fields are missing; provide them before requesting a prediction.",
                missing.iter().map(|m| m.to_string()).collect(),
                &self.config.disclaimer,
            ));
        }

        match tokio::time::timeout(self.config.budget, self.generate(case_file, engine, options))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(case_id = %case_file.case_id, "generation exceeded wall-clock budget");
                Ok(Prediction::uncertain(
                    &case_file.case_id,
                    "timeout",
                    "Prediction generation exceeded its time budget.",
                    Vec::new(),
                    &self.config.disclaimer,
                ))
            }
        }
    }

    async fn generate(
        &self,
        case_file: &CaseFile,
        engine: &Engine,
        options: PredictOptions,
    ) -> Result<Prediction> {
        let top_k = options.max_cases.unwrap_or(self.config.max_cases);
        let query = case_file.to_query_string();
        let retrieval = match engine
            .retrieve(
                &query,
                top_k,
                &SearchFilter::default(),
                case_file.property.region.as_deref(),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "retrieval failed during synthesis");
                return Ok(Prediction::uncertain(
                    &case_file.case_id,
                    "retrieval_failure",
                    "Similar-case retrieval failed; no precedent is available to ground a prediction.",
                    Vec::new(),
                    &self.config.disclaimer,
                ));
            }
        };

        // Abstain rather than synthesize over weak retrieval.
        if retrieval.is_uncertain {
            let reason = retrieval
                .uncertainty_reason
                .clone()
                .unwrap_or_else(|| "Retrieval is uncertain.".to_string());
            let tag = retrieval
                .uncertainty
                .map(|k| k.as_str())
                .unwrap_or("retrieval_uncertain");
            return Ok(self.abstained(case_file, &retrieval, tag, &reason));
        }
        if retrieval.results.len() < self.config.min_cases_required {
            let reason = format!(
                "Only {} similar case chunks found (minimum {} required).",
                retrieval.results.len(),
                self.config.min_cases_required
            );
            return Ok(self.abstained(case_file, &retrieval, "insufficient_cases", &reason));
        }

        let system = format!("{SYSTEM_PROMPT}\n\n{JSON_SCHEMA}");
        let user = user_prompt(case_file, &retrieval.results);

        let Some((response, draft)) = self.prompt_and_parse(&system, &user).await else {
            return Ok(self.abstained(
                case_file,
                &retrieval,
                "synthesis_failure",
                "The language model did not return a parseable prediction.",
            ));
        };

        let mut prediction = self.assemble(case_file, &retrieval, draft, &response.model);
        validate_citations(&mut prediction, &retrieval);
        if !options.include_reasoning {
            prediction.reasoning_trace.clear();
        }

        tracing::info!(
            case_id = %case_file.case_id,
            outcome = prediction.overall_outcome.as_str(),
            confidence = prediction.overall_confidence,
            citations = prediction.citation_count(),
            "prediction generated"
        );
        Ok(prediction)
    }

    /// Prompt → parse with one strict-JSON retry, then the fallback model.
    async fn prompt_and_parse(&self, system: &str, user: &str) -> Option<(LlmResponse, Draft)> {
        let request = LlmRequest {
            system: Some(system.to_string()),
            user: user.to_string(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = match self.chat.chat(&self.config.primary_model, &request).await {
            Ok(response) => response,
            Err(err) if is_hard_provider_error(&err) => {
                tracing::warn!(error = %err, "primary model failed, switching to fallback");
                self.chat
                    .chat(&self.config.fallback_model, &request)
                    .await
                    .ok()?
            }
            Err(err) => {
                tracing::error!(error = %err, "model call failed");
                return None;
            }
        };

        if let Some(draft) = parse_draft(&response.content) {
            return Some((response, draft));
        }

        tracing::warn!("malformed prediction JSON, re-prompting once");
        let nudged = LlmRequest {
            system: Some(format!("{system}\n\n{STRICT_JSON_NUDGE}")),
            ..request
        };
        let retry = self.chat.chat(&response.model, &nudged).await.ok()?;
        let draft = parse_draft(&retry.content)?;
        Some((retry, draft))
    }

    fn abstained(
        &self,
        case_file: &CaseFile,
        retrieval: &RetrievalOutcome,
        category: &str,
        reason: &str,
    ) -> Prediction {
        let mut prediction = Prediction::uncertain(
            &case_file.case_id,
            category,
            reason,
            Vec::new(),
            &self.config.disclaimer,
        );
        prediction.retrieved_cases = retrieval.case_references();
        prediction.rag_confidence = Some(retrieval.confidence);
        prediction
    }

    fn assemble(
        &self,
        case_file: &CaseFile,
        retrieval: &RetrievalOutcome,
        draft: Draft,
        model: &str,
    ) -> Prediction {
        Prediction {
            prediction_id: uuid::Uuid::new_v4().to_string(),
            case_id: case_file.case_id.clone(),
            overall_outcome: Outcome::parse(&draft.overall_outcome),
            overall_confidence: draft.overall_confidence.clamp(0.0, 1.0),
            outcome_summary: draft.outcome_summary,
            issue_predictions: draft
                .issue_predictions
                .into_iter()
                .map(|issue| IssuePrediction {
                    issue: issue.issue,
                    predicted_outcome: Outcome::parse(&issue.predicted_outcome),
                    predicted_amount: issue.predicted_amount,
                    amount_range: issue.amount_range,
                    confidence: issue.confidence.clamp(0.0, 1.0),
                    reasoning: issue.reasoning,
                    key_factors: issue.key_factors,
                    citations: issue.citations.into_iter().map(citation_from).collect(),
                })
                .collect(),
            reasoning_trace: draft
                .reasoning_trace
                .into_iter()
                .enumerate()
                .map(|(i, step)| ReasoningStep {
                    step_number: step.step_number.unwrap_or(i + 1),
                    category: step.category,
                    title: step.title,
                    content: step.content,
                    citations: step.citations.into_iter().map(citation_from).collect(),
                    confidence: step.confidence,
                })
                .collect(),
            key_strengths: draft.key_strengths,
            key_weaknesses: draft.key_weaknesses,
            uncertainties: draft.uncertainties,
            missing_information: draft.missing_information,
            assumptions_made: draft.assumptions_made,
            retrieved_cases: retrieval.case_references(),
            rag_confidence: Some(retrieval.confidence),
            settlement_range: draft.settlement_range,
            tenant_recovery_amount: draft.tenant_recovery_amount,
            landlord_recovery_amount: draft.landlord_recovery_amount,
            model_version: Some(model.to_string()),
            disclaimer: self.config.disclaimer.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Drop citations that do not resolve into the retrieval, remove issue
/// predictions left uncited, and downgrade the overall outcome when a
/// load-bearing claim was removed.
pub fn validate_citations(prediction: &mut Prediction, retrieval: &RetrievalOutcome) {
    let mut texts_by_case: HashMap<&str, Vec<String>> = HashMap::new();
    for result in &retrieval.results {
        texts_by_case
            .entry(result.case_reference.as_str())
            .or_default()
            .push(normalize_ws(&result.text));
    }

    let valid = |citation: &CaseCitation| -> bool {
        let Some(chunks) = texts_by_case.get(citation.case_reference.as_str()) else {
            return false;
        };
        match citation.quote.as_deref() {
            None | Some("") => true,
            Some(quote) => {
                let needle = normalize_ws(quote);
                chunks.iter().any(|text| text.contains(&needle))
            }
        }
    };

    for step in prediction.reasoning_trace.iter_mut() {
        step.citations.retain(|c| valid(c));
    }

    let mut removed_issues: Vec<String> = Vec::new();
    prediction.issue_predictions.retain_mut(|issue| {
        let before = issue.citations.len();
        issue.citations.retain(|c| valid(c));
        if issue.citations.is_empty() {
            tracing::warn!(
                issue = %issue.issue,
                dropped = before,
                "issue prediction removed: no verifiable citations"
            );
            removed_issues.push(issue.issue.clone());
            false
        } else {
            true
        }
    });

    if !removed_issues.is_empty() {
        let step_number = prediction.reasoning_trace.len() + 1;
        prediction.reasoning_trace.push(ReasoningStep {
            step_number,
            category: "uncited_claim_removed".to_string(),
            title: "Uncited claims removed".to_string(),
            content: format!(
                "Claims for {} were removed because their citations could not be verified \
                 against the retrieved cases.",
                removed_issues.join(", ")
            ),
            citations: Vec::new(),
            confidence: Some(0.0),
        });
        prediction.overall_outcome = Outcome::Uncertain;
        prediction.overall_confidence = prediction.overall_confidence.min(0.3);
        prediction
            .uncertainties
            .push("One or more claims lacked verifiable citations.".to_string());
    }
}

fn citation_from(draft: DraftCitation) -> CaseCitation {
    CaseCitation {
        case_reference: draft.case_reference,
        year: draft.year,
        region: None,
        chunk_id: None,
        quote: draft.quote,
        similarity: None,
        relevance: draft.relevance,
    }
}

fn is_hard_provider_error(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::Exhausted { .. } | LlmError::Provider { .. } | LlmError::Http(_)
    )
}

/// Whitespace-normalize for substring checks.
fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip markdown fences and parse the model's JSON.
fn parse_draft(content: &str) -> Option<Draft> {
    let trimmed = content.trim();
    let body = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.split("```").next().unwrap_or(rest)
    } else if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        rest.split("```").next().unwrap_or(rest)
    } else {
        trimmed
    };
    serde_json::from_str(body.trim()).ok()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Draft {
    overall_outcome: String,
    overall_confidence: f32,
    outcome_summary: String,
    issue_predictions: Vec<DraftIssue>,
    reasoning_trace: Vec<DraftStep>,
    key_strengths: Vec<String>,
    key_weaknesses: Vec<String>,
    uncertainties: Vec<String>,
    missing_information: Vec<String>,
    assumptions_made: Vec<String>,
    settlement_range: Option<(f64, f64)>,
    tenant_recovery_amount: Option<f64>,
    landlord_recovery_amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DraftIssue {
    #[serde(alias = "issue_type")]
    issue: String,
    predicted_outcome: String,
    predicted_amount: Option<f64>,
    amount_range: Option<(f64, f64)>,
    confidence: f32,
    reasoning: String,
    key_factors: Vec<String>,
    #[serde(alias = "supporting_cases")]
    citations: Vec<DraftCitation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DraftStep {
    step_number: Option<usize>,
    category: String,
    title: String,
    content: String,
    citations: Vec<DraftCitation>,
    confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DraftCitation {
    case_reference: String,
    year: Option<i32>,
    quote: Option<String>,
    relevance: Option<String>,
}
