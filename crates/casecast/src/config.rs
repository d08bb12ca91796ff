use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use casecast_rag::EngineConfig;

/// Application configuration resolved from the environment at startup.
/// This is the only place the process reads environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub embedding_model: String,
    pub primary_model: String,
    pub fallback_model: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            primary_model: env::var("PREDICTION_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
            fallback_model: env::var("PREDICTION_FALLBACK_MODEL")
                .unwrap_or_else(|_| "claude-3-5-haiku-20241022".to_string()),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            embedding_model: self.embedding_model.clone(),
            ..EngineConfig::with_data_dir(&self.data_dir)
        }
    }

    /// Fails fast when the embedding provider credential is absent.
    pub fn require_embedding_credentials(&self) -> Result<()> {
        if env::var("OPENAI_API_KEY").unwrap_or_default().is_empty() {
            return Err(anyhow!(
                "OPENAI_API_KEY is not set; it is required for embedding generation"
            ));
        }
        Ok(())
    }
}
