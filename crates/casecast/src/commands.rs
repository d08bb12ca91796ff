use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use casecast_index::SearchFilter;
use casecast_llm::{LlmClient, LlmProvider};
use casecast_predict::{
    CaseFile, PredictOptions, PredictionStore, SynthesisConfig, Synthesizer,
};
use casecast_rag::{Engine, HashEmbedder, IngestOptions, OpenAiEmbedder};

use crate::config::AppConfig;

fn open_engine(config: &AppConfig) -> Result<Engine> {
    config.require_embedding_credentials()?;
    let engine_config = config.engine_config();
    let embedder = OpenAiEmbedder::from_env(
        &engine_config.embedding_model,
        engine_config.embedding_batch_size,
    )
    .context("embedding provider configuration")?;
    Ok(Engine::open(engine_config, Arc::new(embedder))?)
}

/// For commands that never embed (stats, clear, rebuild) the engine opens
/// without provider credentials.
fn open_engine_offline(config: &AppConfig) -> Result<Engine> {
    Ok(Engine::open(
        config.engine_config(),
        Arc::new(HashEmbedder::default()),
    )?)
}

pub async fn ingest(config: &AppConfig, pdf_dir: &str, reingest: bool) -> Result<()> {
    let engine = open_engine(config)?;
    let options = IngestOptions {
        skip_existing: !reingest,
    };
    let report = engine.ingest(Path::new(pdf_dir), options).await?;
    println!(
        "documents: {} in / {} ok / {} skipped",
        report.documents_in, report.documents_ok, report.documents_skipped
    );
    println!("chunks created: {}", report.chunks_created);
    println!(
        "embedding tokens: {} (~${:.4})",
        report.embedding_tokens, report.cost_estimate_usd
    );
    println!("pii redactions: {}", report.pii_redactions);
    Ok(())
}

pub async fn query(
    config: &AppConfig,
    text: &str,
    region: Option<String>,
    year_min: Option<i32>,
    top_k: usize,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config)?;
    let filter = SearchFilter {
        year_min,
        ..Default::default()
    };
    let outcome = engine
        .retrieve(text, top_k, &filter, region.as_deref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.is_uncertain {
        if let Some(reason) = &outcome.uncertainty_reason {
            eprintln!("uncertain: {reason}");
        }
    }
    println!(
        "confidence {:.2}, {} result(s) in {:.0} ms",
        outcome.confidence,
        outcome.results.len(),
        outcome.retrieval_time_ms
    );
    for (i, result) in outcome.results.iter().enumerate() {
        println!(
            "\n{}. {} ({}) [{}] score {:.3}",
            i + 1,
            result.case_reference,
            result.year,
            result.section_kind.as_str(),
            result.final_score
        );
        if let Some(note) = &result.relevance {
            println!("   {note}");
        }
        let preview: String = result.text.chars().take(240).collect();
        println!("   {preview}…");
    }
    Ok(())
}

pub async fn predict(
    config: &AppConfig,
    case_file_path: &str,
    include_reasoning: bool,
    max_cases: Option<usize>,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(case_file_path)
        .with_context(|| format!("failed to read case file {case_file_path}"))?;
    let case_file: CaseFile = serde_json::from_str(&raw).context("invalid case file JSON")?;

    let engine = open_engine(config)?;
    let chat = LlmClient::from_env(LlmProvider::Anthropic).context("llm provider configuration")?;
    let synthesis = SynthesisConfig {
        primary_model: config.primary_model.clone(),
        fallback_model: config.fallback_model.clone(),
        ..SynthesisConfig::default()
    };
    let synthesizer = Synthesizer::new(Arc::new(chat), synthesis);

    let prediction = synthesizer
        .predict(
            &case_file,
            &engine,
            PredictOptions {
                include_reasoning,
                max_cases,
            },
        )
        .await?;

    let store = PredictionStore::open(&config.engine_config().predictions_dir())?;
    store.save(&prediction)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    println!(
        "outcome: {} (confidence {:.2})",
        prediction.overall_outcome.as_str(),
        prediction.overall_confidence
    );
    if !prediction.outcome_summary.is_empty() {
        println!("{}", prediction.outcome_summary);
    }
    for issue in &prediction.issue_predictions {
        println!(
            "\n- {}: {} (confidence {:.2})",
            issue.issue,
            issue.predicted_outcome.as_str(),
            issue.confidence
        );
        if let Some(amount) = issue.predicted_amount {
            println!("  predicted amount: £{amount:.2}");
        }
        for citation in &issue.citations {
            println!("  cites {}", citation.case_reference);
        }
    }
    if include_reasoning {
        for step in &prediction.reasoning_trace {
            println!("\n[{}] {}. {}", step.category, step.step_number, step.title);
            println!("{}", step.content);
        }
    }
    println!("\n{}", prediction.disclaimer);
    Ok(())
}

pub async fn stats(config: &AppConfig) -> Result<()> {
    let engine = open_engine_offline(config)?;
    let stats = engine.corpus_stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub async fn clear(config: &AppConfig) -> Result<()> {
    let engine = open_engine_offline(config)?;
    engine.clear().await?;
    println!("index cleared");
    Ok(())
}

pub async fn rebuild_bm25(config: &AppConfig) -> Result<()> {
    let engine = open_engine_offline(config)?;
    let report = engine.rebuild_sparse_from_semantic().await?;
    println!(
        "rebuilt sparse index: {} chunks across {} cases",
        report.chunks_indexed, report.unique_cases
    );
    Ok(())
}
