/// Structured logging for the flood trigger engine
///
/// Context-rich logging keyed by pipeline stage and country/place code,
/// built on `tracing`. `init_logger` installs the subscriber (console,
/// optionally mirrored to an append-only file for scheduled runs); the
/// helpers below classify per-unit failures so that expected gaps in
/// upstream data do not drown out real faults.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::model::{ExposureError, ForecastError, MappingError};
use tracing_subscriber::fmt::writer::MakeWriterExt;

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Registry,
    Mapping,
    Trigger,
    Exposure,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Registry => write!(f, "REGISTRY"),
            Stage::Mapping => write!(f, "MAPPING"),
            Stage::Trigger => write!(f, "TRIGGER"),
            Stage::Exposure => write!(f, "EXPOSURE"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected gap, e.g. a station that did not report this lead time
    Expected,
    /// Indicates corrupt input or a configuration fault
    Unexpected,
    /// Cannot tell whether this is expected
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level/filter '{value}': {reason}")]
    Filter { value: String, reason: String },
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("logger already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. When `log_file` is set every
/// event is also appended there. Calling this twice returns
/// `AlreadyInitialised`.
pub fn init_logger(
    level: &str,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| LoggingError::Filter {
            value: level.to_string(),
            reason: e.to_string(),
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false);

    let result = match (log_file, console_timestamps) {
        (Some(path), timestamps) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::LogFile {
                    path: path.to_string(),
                    source,
                })?;
            let writer = std::io::stderr.and(Mutex::new(file));
            if timestamps {
                builder.with_writer(writer).try_init()
            } else {
                builder.without_time().with_writer(writer).try_init()
            }
        }
        (None, true) => builder.with_writer(std::io::stderr).try_init(),
        (None, false) => builder.without_time().with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| LoggingError::AlreadyInitialised(e.to_string()))
}

/// Test-friendly subscriber; ignores repeated initialisation.
pub fn init_test_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Errors that know which kind of failure they are.
pub trait ClassifyFailure: std::error::Error {
    fn failure_type(&self) -> FailureType;
}

impl ClassifyFailure for ForecastError {
    fn failure_type(&self) -> FailureType {
        match self {
            // A station not reporting one lead time is routine for GloFAS
            // point data; values outside [0, 1] mean the feed is broken.
            ForecastError::MissingForecast { .. } => FailureType::Expected,
            ForecastError::InvalidForecastValue { .. } => FailureType::Unexpected,
        }
    }
}

impl ClassifyFailure for ExposureError {
    fn failure_type(&self) -> FailureType {
        match self {
            // Either a dataset still being produced upstream or a broken one.
            ExposureError::ExposureSourceUnavailable { .. } => FailureType::Unknown,
        }
    }
}

impl ClassifyFailure for MappingError {
    fn failure_type(&self) -> FailureType {
        match self {
            MappingError::AmbiguousMapping { .. } | MappingError::InvalidAdministrativeUnit { .. } => {
                FailureType::Unexpected
            }
        }
    }
}

/// Log a stage failure at the level its classification calls for.
pub fn log_stage_failure<E: ClassifyFailure>(stage: Stage, country: &str, operation: &str, err: &E) {
    let error_msg = err.to_string();
    let failure_type = err.failure_type();

    match failure_type {
        FailureType::Expected => tracing::debug!(
            stage = %stage, country, failure = %failure_type, "{} failed: {}", operation, error_msg
        ),
        FailureType::Unexpected => tracing::error!(
            stage = %stage, country, failure = %failure_type, "{} failed: {}", operation, error_msg
        ),
        FailureType::Unknown => tracing::warn!(
            stage = %stage, country, failure = %failure_type, "{} failed: {}", operation, error_msg
        ),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of the run across countries.
pub fn log_run_summary(total_countries: usize, evaluated: usize, failed: usize, records: usize) {
    let message = format!(
        "Run complete: {}/{} countries evaluated, {} failed, {} records",
        evaluated, total_countries, failed, records
    );

    if failed == 0 {
        tracing::info!(stage = %Stage::System, "{}", message);
    } else if evaluated == 0 {
        tracing::error!(stage = %Stage::System, "{}", message);
    } else {
        tracing::warn!(stage = %Stage::System, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CountryCode;

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::Exposure.to_string(), "EXPOSURE");
        assert_eq!(Stage::System.to_string(), "SYS");
    }

    #[test]
    fn test_failure_classification_follows_variant() {
        let mwi = CountryCode::parse("MWI").expect("valid code");
        let missing = ForecastError::MissingForecast {
            country: mwi.clone(),
            place_code: "MWI101001".to_string(),
            lead_time: "7-day".to_string(),
            station_code: "G1".to_string(),
        };
        assert_eq!(missing.failure_type(), FailureType::Expected);

        let invalid = ForecastError::InvalidForecastValue {
            country: mwi.clone(),
            place_code: "MWI101001".to_string(),
            lead_time: "7-day".to_string(),
            station_code: "G1".to_string(),
            value: 1.4,
        };
        assert_eq!(invalid.failure_type(), FailureType::Unexpected);

        // The reason text plays no part in the classification.
        let unavailable = ExposureError::ExposureSourceUnavailable {
            source_name: "population".to_string(),
            dataset: "pop".to_string(),
            reason: "no forecast outside [0, 1]".to_string(),
        };
        assert_eq!(unavailable.failure_type(), FailureType::Unknown);

        let ambiguous = MappingError::AmbiguousMapping {
            country: mwi,
            place_code: "MWI101001".to_string(),
            candidates: vec!["G1".to_string(), "G1".to_string()],
        };
        assert_eq!(ambiguous.failure_type(), FailureType::Unexpected);
    }

    #[test]
    fn test_invalid_filter_is_reported() {
        // Only reached when RUST_LOG is unset; a broken directive must not
        // silently fall back to "off".
        if std::env::var("RUST_LOG").is_err() {
            let err = init_logger("engine=loud", None, false).expect_err("bad filter should fail");
            assert!(matches!(err, LoggingError::Filter { .. }));
        }
    }
}
