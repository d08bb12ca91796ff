use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};
use crate::prediction::Prediction;

/// One JSON record per prediction under `<data>/predictions/`. Write-once:
/// the engine never mutates a stored prediction.
pub struct PredictionStore {
    dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub prediction_id: String,
    pub case_id: String,
    pub overall_outcome: String,
    pub overall_confidence: f32,
    pub created_at: String,
}

impl PredictionStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, prediction_id: &str) -> PathBuf {
        self.dir.join(format!("prediction_{prediction_id}.json"))
    }

    pub fn save(&self, prediction: &Prediction) -> Result<PathBuf> {
        let path = self.path_for(&prediction.prediction_id);
        if path.exists() {
            return Err(PredictError::AlreadyStored(prediction.prediction_id.clone()));
        }
        let payload = serde_json::to_vec_pretty(prediction)?;
        std::fs::write(&path, payload)?;
        tracing::info!(prediction_id = %prediction.prediction_id, path = %path.display(), "prediction saved");
        Ok(path)
    }

    pub fn get(&self, prediction_id: &str) -> Result<Option<Prediction>> {
        let path = self.path_for(prediction_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn list_for_case(&self, case_id: &str) -> Result<Vec<PredictionSummary>> {
        let mut summaries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !(name.starts_with("prediction_") && name.ends_with(".json")) {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let Ok(prediction) = serde_json::from_str::<Prediction>(&raw) else {
                tracing::warn!(file = name, "skipping unreadable prediction record");
                continue;
            };
            if prediction.case_id == case_id {
                summaries.push(PredictionSummary {
                    prediction_id: prediction.prediction_id,
                    case_id: prediction.case_id,
                    overall_outcome: prediction.overall_outcome.as_str().to_string(),
                    overall_confidence: prediction.overall_confidence,
                    created_at: prediction.created_at,
                });
            }
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn prediction(case_id: &str) -> Prediction {
        Prediction::uncertain(case_id, "timeout", "budget exceeded", Vec::new(), "disclaimer")
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempdir().unwrap();
        let store = PredictionStore::open(dir.path()).unwrap();
        let original = prediction("case-1");
        store.save(&original).unwrap();
        let loaded = store.get(&original.prediction_id).unwrap().unwrap();
        assert_eq!(loaded.case_id, "case-1");
        assert_eq!(loaded.overall_outcome, original.overall_outcome);
        assert_eq!(loaded.disclaimer, "disclaimer");
    }

    #[test]
    fn predictions_are_write_once() {
        let dir = tempdir().unwrap();
        let store = PredictionStore::open(dir.path()).unwrap();
        let record = prediction("case-1");
        store.save(&record).unwrap();
        assert!(matches!(
            store.save(&record),
            Err(PredictError::AlreadyStored(_))
        ));
    }

    #[test]
    fn list_filters_by_case() {
        let dir = tempdir().unwrap();
        let store = PredictionStore::open(dir.path()).unwrap();
        store.save(&prediction("case-a")).unwrap();
        store.save(&prediction("case-a")).unwrap();
        store.save(&prediction("case-b")).unwrap();
        assert_eq!(store.list_for_case("case-a").unwrap().len(), 2);
        assert_eq!(store.list_for_case("case-b").unwrap().len(), 1);
        assert!(store.list_for_case("case-c").unwrap().is_empty());
    }

    #[test]
    fn missing_prediction_is_none() {
        let dir = tempdir().unwrap();
        let store = PredictionStore::open(dir.path()).unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }
}
