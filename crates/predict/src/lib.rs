//! Prediction synthesis over retrieved tribunal precedent: case-file
//! completeness gating, two-phase LLM prompting and the cite-or-abstain
//! rule that keeps every emitted claim anchored in the retrieval.

pub mod casefile;
pub mod error;
pub mod prediction;
pub mod prompts;
pub mod store;
pub mod synthesizer;

pub use casefile::{
    CaseFile, Claim, EvidenceItem, PartyRole, PropertyDetails, TenancyDetails, REQUIRED_FIELDS,
};
pub use error::{PredictError, Result};
pub use prediction::{CaseCitation, IssuePrediction, Outcome, Prediction, ReasoningStep};
pub use prompts::DEFAULT_DISCLAIMER;
pub use store::{PredictionStore, PredictionSummary};
pub use synthesizer::{
    validate_citations, ChatModel, PredictOptions, SynthesisConfig, Synthesizer,
};
