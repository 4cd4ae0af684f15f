//! Trigger band classification.
//!
//! Bands are half-open on the upper side:
//!
//! ```text
//!   p <  minimum            -> None
//!   minimum <= p < medium   -> Minimum
//!   medium  <= p < maximum  -> Medium
//!   p >= maximum            -> Maximum
//! ```
//!
//! With equal thresholds the higher band wins, so classification is total
//! and monotonic in `p` for any non-decreasing threshold triple.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::TriggerThresholds;

/// Trigger bands, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerBand {
    None,
    Minimum,
    Medium,
    Maximum,
}

impl TriggerBand {
    /// A genuine trigger is any band above `None`.
    pub fn is_trigger(self) -> bool {
        self != TriggerBand::None
    }
}

impl fmt::Display for TriggerBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerBand::None => write!(f, "none"),
            TriggerBand::Minimum => write!(f, "minimum"),
            TriggerBand::Medium => write!(f, "medium"),
            TriggerBand::Maximum => write!(f, "maximum"),
        }
    }
}

/// Classifies a forecast probability against a threshold triple.
///
/// `probability` must already be known to lie in `[0, 1]`; range checking
/// belongs to the evaluator, which records bad values as faults.
pub fn classify(probability: f64, thresholds: &TriggerThresholds) -> TriggerBand {
    if probability >= thresholds.maximum {
        TriggerBand::Maximum
    } else if probability >= thresholds.medium {
        TriggerBand::Medium
    } else if probability >= thresholds.minimum {
        TriggerBand::Minimum
    } else {
        TriggerBand::None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> TriggerThresholds {
        TriggerThresholds { minimum: 0.6, medium: 0.7, maximum: 0.8 }
    }

    #[test]
    fn test_probability_between_minimum_and_medium_is_minimum_band() {
        let band = classify(0.65, &standard());
        assert_eq!(band, TriggerBand::Minimum);
        assert!(band.is_trigger());
    }

    #[test]
    fn test_probability_below_minimum_is_not_a_trigger() {
        let band = classify(0.59, &standard());
        assert_eq!(band, TriggerBand::None);
        assert!(!band.is_trigger());
    }

    #[test]
    fn test_band_edges_are_inclusive_on_lower_bound() {
        let t = standard();
        assert_eq!(classify(0.6, &t), TriggerBand::Minimum);
        assert_eq!(classify(0.7, &t), TriggerBand::Medium);
        assert_eq!(classify(0.8, &t), TriggerBand::Maximum);
        assert_eq!(classify(1.0, &t), TriggerBand::Maximum);
        assert_eq!(classify(0.0, &t), TriggerBand::None);
    }

    #[test]
    fn test_classification_is_monotonic_in_probability() {
        let triples = [
            standard(),
            TriggerThresholds { minimum: 0.5, medium: 0.5, maximum: 0.9 },
            TriggerThresholds { minimum: 0.0, medium: 0.3, maximum: 0.3 },
            TriggerThresholds { minimum: 1.0, medium: 1.0, maximum: 1.0 },
        ];
        for t in &triples {
            let mut previous = TriggerBand::None;
            for step in 0..=1000 {
                let p = step as f64 / 1000.0;
                let band = classify(p, t);
                assert!(
                    band >= previous,
                    "band dropped from {} to {} at p={} for {:?}",
                    previous,
                    band,
                    p,
                    t
                );
                assert_eq!(band.is_trigger(), band != TriggerBand::None);
                previous = band;
            }
        }
    }

    #[test]
    fn test_bands_serialize_lowercase() {
        let json = serde_json::to_string(&TriggerBand::Medium).expect("serializes");
        assert_eq!(json, "\"medium\"");
    }
}
