//! Trust derivation for cluster peers.
//!
//! Turns on-chain commitments into a set of trusted cluster ids:
//! - `extractor` reads commitments out of finalized blocks
//! - `inscription` keeps the latest claim per participant
//! - `evaluator` checks a participant against live chain state
//! - `manager` diffs verdicts against the current trusted set
//! - `engine` drives all of the above one finalized block at a time

pub mod engine;
pub mod evaluator;
pub mod extractor;
pub mod inscription;
pub mod manager;

#[cfg(test)]
mod proptests;

pub use engine::{CycleOutcome, EngineSettings, TrustEngine};
pub use evaluator::{FailurePolicy, TrustEvaluator, TrustPolicy, UntrustedReason, Verdict};
pub use extractor::{CommitmentExtractor, ExtractionReport};
pub use inscription::{Inscription, InscriptionStore};
pub use manager::{ReconcileOutcome, TrustSetManager};
