//! Flood trigger evaluation and exposure aggregation for impact-based
//! forecasting.
//!
//! Module layout:
//!
//! - `model`: shared domain types and the error taxonomy
//! - `countries`: validated, immutable country profile registry
//! - `config`: engine run configuration (TOML + environment)
//! - `credentials`: secret acquisition behind `CredentialProvider`
//! - `logging`: tracing setup and stage-tagged failure logging
//! - `mapping`: station → administrative unit mapping
//! - `alert`: trigger bands, evaluation, forecast staleness
//! - `exposure`: geometry, rasters, exposure aggregation
//! - `mock`: mock forecasts for demo countries
//! - `ingest`: JSON run bundle reader
//! - `assemble`: result records and their output order
//! - `report`: run report, diagnostics, JSON-lines output
//! - `engine`: run orchestration, parallelism, cancellation

pub mod alert;
pub mod assemble;
pub mod config;
pub mod countries;
pub mod credentials;
pub mod engine;
pub mod exposure;
pub mod ingest;
pub mod logging;
pub mod mapping;
pub mod mock;
pub mod model;
pub mod report;

pub use countries::{CountryProfile, CountryRegistry};
pub use engine::{CancellationToken, EngineError, RunInput, RunOptions, run};
pub use report::RunReport;
