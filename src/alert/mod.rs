//! Trigger evaluation.
//!
//! - `thresholds`: probability → trigger band classification.
//! - `evaluator`: per (unit, lead time) trigger decisions.
//! - `staleness`: forecast issue-time freshness.

pub mod evaluator;
pub mod staleness;
pub mod thresholds;

pub use evaluator::{Evaluation, TriggerDecision, evaluate_country, evaluate_unit};
pub use thresholds::{TriggerBand, classify};
