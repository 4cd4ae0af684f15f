//! Run input ingestion.
//!
//! Forecasts, boundaries and exposure datasets are produced by external
//! jobs (GloFAS download, boundary export, raster preprocessing). The
//! engine reads them from one JSON run bundle.

pub mod bundle;

pub use bundle::{IngestError, RunBundle, load_bundle, parse_bundle};
