//! Exposure aggregation for triggered units.
//!
//! For every configured exposure source the dataset is resolved once,
//! then counted per unit on the worker pool. Each unit writes only its
//! own output slot; slots are merged after all workers finish, so a
//! cancelled run leaves nothing half-written.
//!
//! Raster counts sum `cell_value * raster_value` over cells whose centre
//! lies inside the unit. Cells are visited in row-major order, so repeated
//! runs over the same inputs are bit-identical; any consumer re-summing in
//! another order should allow a relative error of 1e-9.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::countries::{CountryProfile, ExposureDataset, ExposureSource};
use crate::engine::{CancellationToken, Cancelled};
use crate::exposure::geometry::{self, Geometry};
use crate::exposure::raster::{AttributeTable, ExposureCatalog, Raster};
use crate::logging::{Stage, log_stage_failure};
use crate::model::{AdministrativeUnit, ExposureError};

/// Exposure count for one (unit, source), or the reason it is missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExposureValue {
    Computed { count: f64 },
    Failed { reason: String },
}

impl ExposureValue {
    pub fn count(&self) -> Option<f64> {
        match self {
            ExposureValue::Computed { count } => Some(*count),
            ExposureValue::Failed { .. } => None,
        }
    }
}

/// Per-unit exposure for one country.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureOutcome {
    /// place code → source name → value. Every aggregated unit carries an
    /// entry for every configured source.
    pub by_unit: BTreeMap<String, BTreeMap<String, ExposureValue>>,
    /// One entry per source that could not be resolved.
    pub failures: Vec<ExposureError>,
}

enum Resolved<'a> {
    Raster { raster: &'a Raster, factor: f64 },
    Attribute { table: &'a AttributeTable, column: &'a str },
}

impl Resolved<'_> {
    fn count(&self, unit: &AdministrativeUnit) -> f64 {
        match self {
            Resolved::Raster { raster, factor } => raster_count(raster, *factor, &unit.geometry),
            Resolved::Attribute { table, column } => table.value(&unit.place_code, column),
        }
    }
}

fn resolve<'a>(
    source: &'a ExposureSource,
    catalog: &'a dyn ExposureCatalog,
) -> Result<Resolved<'a>, ExposureError> {
    let unavailable = |reason: String| ExposureError::ExposureSourceUnavailable {
        source_name: source.name.clone(),
        dataset: source.dataset.dataset_id().to_string(),
        reason,
    };
    match &source.dataset {
        ExposureDataset::Raster { raster, raster_value } => {
            let raster = catalog.raster(raster).map_err(unavailable)?;
            Ok(Resolved::Raster {
                raster,
                factor: *raster_value,
            })
        }
        ExposureDataset::Attribute { table, column } => {
            let table = catalog.attribute_table(table).map_err(unavailable)?;
            if !table.has_column(column) {
                return Err(unavailable(format!("column '{}' not found", column)));
            }
            Ok(Resolved::Attribute { table, column })
        }
    }
}

/// Sums the weighted raster cells whose centre falls inside `footprint`.
/// Units outside the raster's coverage count 0.
pub fn raster_count(raster: &Raster, factor: f64, footprint: &Geometry) -> f64 {
    let Some(bounds) = geometry::bounds(footprint) else {
        return 0.0;
    };
    let Some((rows, cols)) = raster.window(bounds) else {
        return 0.0;
    };

    let mut total = 0.0;
    for row in rows {
        for col in cols.clone() {
            if !geometry::contains(footprint, raster.cell_center(row, col)) {
                continue;
            }
            if let Some(value) = raster.cell_value(row, col) {
                total += value * factor;
            }
        }
    }
    total
}

/// Aggregates every exposure source of `profile` over `units`.
///
/// `units` should be exactly the units with at least one triggered lead
/// time; nothing else is computed. A source whose dataset cannot be
/// resolved is marked `Failed` for every unit and recorded in
/// `failures`; other sources still compute.
pub fn aggregate_exposure(
    profile: &CountryProfile,
    units: &[&AdministrativeUnit],
    catalog: &dyn ExposureCatalog,
    cancel: &CancellationToken,
) -> Result<ExposureOutcome, Cancelled> {
    let mut outcome = ExposureOutcome::default();
    if units.is_empty() {
        return Ok(outcome);
    }

    for source in profile.all_exposure_sources() {
        cancel.check()?;

        let per_unit: Vec<(String, ExposureValue)> = match resolve(source, catalog) {
            Ok(resolved) => {
                let counts: Option<Vec<(String, ExposureValue)>> = units
                    .par_iter()
                    .map(|unit| {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let count = resolved.count(unit);
                        Some((unit.place_code.clone(), ExposureValue::Computed { count }))
                    })
                    .collect();
                counts.ok_or(Cancelled)?
            }
            Err(err) => {
                log_stage_failure(Stage::Exposure, profile.code().as_str(), "resolve exposure source", &err);
                let reason = err.to_string();
                outcome.failures.push(err);
                units
                    .iter()
                    .map(|unit| {
                        (
                            unit.place_code.clone(),
                            ExposureValue::Failed {
                                reason: reason.clone(),
                            },
                        )
                    })
                    .collect()
            }
        };

        for (place_code, value) in per_unit {
            outcome
                .by_unit
                .entry(place_code)
                .or_default()
                .insert(source.name.clone(), value);
        }
    }

    tracing::debug!(
        country = %profile.code(),
        units = units.len(),
        failed_sources = outcome.failures.len(),
        "exposure aggregated"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
