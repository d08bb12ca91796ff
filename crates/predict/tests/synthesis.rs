use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use casecast_core::{CaseDocument, IssueKind};
use casecast_llm::{LlmError, LlmRequest, LlmResponse};
use casecast_predict::{
    CaseFile, ChatModel, Outcome, PartyRole, PredictOptions, SynthesisConfig, Synthesizer,
};
use casecast_rag::{Engine, EngineConfig, HashEmbedder};

/// Scripted stand-in for the chat capability; pops pre-baked replies.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, model: &str, _req: &LlmRequest) -> casecast_llm::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted model ran out of replies");
        match next {
            Ok(content) => Ok(LlmResponse {
                content,
                model: model.to_string(),
                prompt_tokens: 100,
                completion_tokens: 200,
            }),
            Err(last) => Err(LlmError::Exhausted { attempts: 6, last }),
        }
    }
}

fn decision(reference: &str, year: i32, region: &str, body: &str) -> CaseDocument {
    CaseDocument {
        case_reference: reference.to_string(),
        year,
        region: Some(region.to_string()),
        region_name: None,
        case_type: Some("HMF".to_string()),
        case_type_name: None,
        title: None,
        full_text: format!("BACKGROUND\nThe application concerns a tenancy deposit.\nREASONS\n{body}\nDECISION\nThe tribunal so orders."),
        source_path: format!("{reference}.pdf"),
        ingested_at: None,
    }
}

async fn seeded_engine(dir: &std::path::Path) -> Engine {
    // Thresholds tuned down for the deterministic hash embedder, whose
    // cosine scores run lower than a production embedding model's.
    let config = EngineConfig {
        min_confidence_threshold: 0.2,
        min_similarity_threshold: 0.05,
        ..EngineConfig::with_data_dir(dir)
    };
    let mut engine = Engine::open(config, Arc::new(HashEmbedder::default())).unwrap();
    engine.set_current_year(2026);
    for doc in [
        decision(
            "LON_00BK_HMF_2023_0001",
            2023,
            "LON",
            "The landlord failed to protect the deposit within 30 days as required by section 213 of the Housing Act 2004. The tribunal awarded the tenant a penalty of twice the deposit.",
        ),
        decision(
            "LON_00AG_HMF_2022_0002",
            2022,
            "LON",
            "The deposit was unprotected and no prescribed information was served. Section 214 proceedings followed and the tenant recovered the deposit in full.",
        ),
        decision(
            "CHI_00ML_HNA_2022_0003",
            2022,
            "CHI",
            "The landlord claimed for professional cleaning. Without a check-in inventory the cleaning claim failed and the deposit was returned.",
        ),
        decision(
            "MAN_00BR_HNA_2021_0004",
            2021,
            "MAN",
            "Damage to the carpet was proved with dated photographs and invoices. The landlord recovered part of the deposit for the damage.",
        ),
    ] {
        engine.ingest_document(&doc).await.unwrap();
    }
    engine
}

fn complete_case() -> CaseFile {
    let mut case_file = CaseFile::new("case-1", PartyRole::Tenant);
    case_file.property.address = Some("12 High Street".to_string());
    case_file.property.region = Some("LON".to_string());
    case_file.tenancy.start_date = Some("2023-01-15".to_string());
    case_file.tenancy.deposit_amount = Some(1500.0);
    case_file.tenancy.deposit_protected = Some(false);
    case_file.issues = vec![IssueKind::DepositProtection];
    case_file
}

fn synthesizer(model: &Arc<ScriptedModel>) -> Synthesizer {
    Synthesizer::new(model.clone(), SynthesisConfig::default())
}

const VALID_PREDICTION_JSON: &str = r#"{
    "overall_outcome": "tenant_favored",
    "overall_confidence": 0.82,
    "outcome_summary": "Based on precedent the tenant is likely to recover the deposit with a penalty.",
    "issue_predictions": [
        {
            "issue": "deposit_protection",
            "predicted_outcome": "tenant_favored",
            "confidence": 0.85,
            "reasoning": "In similar cases an unprotected deposit led to a penalty award.",
            "key_factors": ["deposit never protected"],
            "predicted_amount": 3000.0,
            "citations": [
                {"case_reference": "LON_00BK_HMF_2023_0001", "year": 2023,
                 "quote": "The landlord failed to protect the deposit within 30 days",
                 "relevance": "Same failure to protect"}
            ]
        }
    ],
    "reasoning_trace": [
        {
            "step_number": 1,
            "category": "precedent_comparison",
            "title": "Unprotected deposit precedent",
            "content": "The retrieved cases show penalties for unprotected deposits.",
            "citations": [
                {"case_reference": "LON_00AG_HMF_2022_0002", "year": 2022,
                 "quote": "The deposit was unprotected", "relevance": "Direct parallel"}
            ]
        }
    ],
    "key_strengths": ["strict liability favours the tenant"],
    "key_weaknesses": [],
    "uncertainties": []
}"#;

#[tokio::test]
async fn incomplete_intake_is_refused_without_llm_calls() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path()).await;
    let model = ScriptedModel::new(vec![]);
    let synth = synthesizer(&model);

    let mut case_file = complete_case();
    case_file.property.address = None;
    case_file.issues = vec![IssueKind::Cleaning];

    let prediction = synth
        .predict(&case_file, &engine, PredictOptions::default())
        .await
        .unwrap();

    assert_eq!(prediction.overall_outcome, Outcome::Uncertain);
    assert_eq!(prediction.missing_information, vec!["property_address"]);
    assert_eq!(
        prediction.reasoning_trace[0].category,
        "missing_required_fields"
    );
    assert_eq!(model.call_count(), 0);
    assert!(!prediction.disclaimer.is_empty());
}

#[tokio::test]
async fn valid_response_keeps_outcome_and_citations() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path()).await;
    let model = ScriptedModel::new(vec![Ok(VALID_PREDICTION_JSON.to_string())]);
    let synth = synthesizer(&model);

    let prediction = synth
        .predict(&complete_case(), &engine, PredictOptions::default())
        .await
        .unwrap();

    assert_eq!(prediction.overall_outcome, Outcome::TenantFavored);
    assert_eq!(prediction.issue_predictions.len(), 1);
    assert_eq!(prediction.issue_predictions[0].citations.len(), 1);
    assert!(prediction
        .retrieved_cases
        .contains(&"LON_00BK_HMF_2023_0001".to_string()));
    assert_eq!(model.call_count(), 1);
    assert!(prediction.rag_confidence.is_some());
    assert_eq!(
        prediction.model_version.as_deref(),
        Some("claude-sonnet-4-20250514")
    );
}

#[tokio::test]
async fn uncited_claim_downgrades_to_uncertain() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path()).await;
    let fabricated = r#"{
        "overall_outcome": "tenant_favored",
        "overall_confidence": 0.9,
        "outcome_summary": "Confident but unsupported.",
        "issue_predictions": [
            {
                "issue": "deposit_protection",
                "predicted_outcome": "tenant_favored",
                "confidence": 0.9,
                "reasoning": "Cites a case that was never retrieved.",
                "citations": [
                    {"case_reference": "LON_00BK_HMF_2099_9999", "year": 2099,
                     "quote": "entirely invented text", "relevance": "fabricated"}
                ]
            }
        ],
        "reasoning_trace": []
    }"#;
    let model = ScriptedModel::new(vec![Ok(fabricated.to_string())]);
    let synth = synthesizer(&model);

    let prediction = synth
        .predict(&complete_case(), &engine, PredictOptions::default())
        .await
        .unwrap();

    assert_eq!(prediction.overall_outcome, Outcome::Uncertain);
    assert!(prediction.issue_predictions.is_empty());
    assert!(prediction
        .reasoning_trace
        .iter()
        .any(|s| s.category == "uncited_claim_removed"));
    assert!(prediction.overall_confidence <= 0.3);
}

#[tokio::test]
async fn misquoted_citation_is_dropped_but_cited_issue_survives() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path()).await;
    let mixed = r#"{
        "overall_outcome": "tenant_favored",
        "overall_confidence": 0.7,
        "outcome_summary": "One good citation, one bad quote.",
        "issue_predictions": [
            {
                "issue": "deposit_protection",
                "predicted_outcome": "tenant_favored",
                "confidence": 0.8,
                "reasoning": "Supported by precedent.",
                "citations": [
                    {"case_reference": "LON_00BK_HMF_2023_0001", "year": 2023,
                     "quote": "The landlord failed to protect the deposit",
                     "relevance": "good"},
                    {"case_reference": "LON_00BK_HMF_2023_0001", "year": 2023,
                     "quote": "words that appear nowhere in the decision",
                     "relevance": "bad"}
                ]
            }
        ],
        "reasoning_trace": []
    }"#;
    let model = ScriptedModel::new(vec![Ok(mixed.to_string())]);
    let synth = synthesizer(&model);

    let prediction = synth
        .predict(&complete_case(), &engine, PredictOptions::default())
        .await
        .unwrap();

    assert_eq!(prediction.overall_outcome, Outcome::TenantFavored);
    assert_eq!(prediction.issue_predictions.len(), 1);
    assert_eq!(prediction.issue_predictions[0].citations.len(), 1);
    assert_eq!(
        prediction.issue_predictions[0].citations[0].relevance.as_deref(),
        Some("good")
    );
}

#[tokio::test]
async fn malformed_json_twice_yields_synthesis_failure() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path()).await;
    let model = ScriptedModel::new(vec![
        Ok("I believe the tenant will win.".to_string()),
        Ok("Still not JSON, sorry.".to_string()),
    ]);
    let synth = synthesizer(&model);

    let prediction = synth
        .predict(&complete_case(), &engine, PredictOptions::default())
        .await
        .unwrap();

    assert_eq!(prediction.overall_outcome, Outcome::Uncertain);
    assert_eq!(model.call_count(), 2);
    assert!(prediction
        .reasoning_trace
        .iter()
        .any(|s| s.category == "synthesis_failure"));
}

#[tokio::test]
async fn hard_provider_error_falls_back_once() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path()).await;
    let model = ScriptedModel::new(vec![
        Err("rate limited".to_string()),
        Ok(VALID_PREDICTION_JSON.to_string()),
    ]);
    let synth = synthesizer(&model);

    let prediction = synth
        .predict(&complete_case(), &engine, PredictOptions::default())
        .await
        .unwrap();

    assert_eq!(model.call_count(), 2);
    assert_eq!(
        prediction.model_version.as_deref(),
        Some("claude-3-5-haiku-20241022")
    );
    assert_eq!(prediction.overall_outcome, Outcome::TenantFavored);
}

#[tokio::test]
async fn empty_corpus_abstains_before_the_model() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::with_data_dir(dir.path());
    let engine = Engine::open(config, Arc::new(HashEmbedder::default())).unwrap();
    let model = ScriptedModel::new(vec![]);
    let synth = synthesizer(&model);

    let prediction = synth
        .predict(&complete_case(), &engine, PredictOptions::default())
        .await
        .unwrap();

    assert_eq!(prediction.overall_outcome, Outcome::Uncertain);
    assert_eq!(model.call_count(), 0);
    assert_eq!(prediction.reasoning_trace[0].category, "empty_corpus");
}

#[tokio::test]
async fn exhausted_budget_times_out_uncertain() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path()).await;
    let model = ScriptedModel::new(vec![Ok(VALID_PREDICTION_JSON.to_string())]);
    let config = SynthesisConfig {
        budget: Duration::ZERO,
        ..SynthesisConfig::default()
    };
    let synth = Synthesizer::new(model.clone(), config);

    let prediction = synth
        .predict(&complete_case(), &engine, PredictOptions::default())
        .await
        .unwrap();

    assert_eq!(prediction.overall_outcome, Outcome::Uncertain);
    assert!(prediction
        .reasoning_trace
        .iter()
        .any(|s| s.category == "timeout"));
}

#[tokio::test]
async fn reasoning_can_be_omitted() {
    let dir = tempdir().unwrap();
    let engine = seeded_engine(dir.path()).await;
    let model = ScriptedModel::new(vec![Ok(VALID_PREDICTION_JSON.to_string())]);
    let synth = synthesizer(&model);

    let prediction = synth
        .predict(
            &complete_case(),
            &engine,
            PredictOptions {
                include_reasoning: false,
                max_cases: None,
            },
        )
        .await
        .unwrap();

    assert!(prediction.reasoning_trace.is_empty());
    assert_eq!(prediction.issue_predictions.len(), 1);
}
