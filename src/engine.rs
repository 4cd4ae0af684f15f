//! Run orchestration.
//!
//! One run evaluates every country of the registry against the run input.
//! Countries share nothing mutable, so each is a separate task on the
//! rayon pool; within a country the phases are strictly ordered:
//!
//! 1. forecast selection (live input, or mock data for `mock` profiles)
//! 2. station/unit mapping
//! 3. trigger evaluation over monitored units
//! 4. exposure aggregation over triggered units only
//! 5. record assembly
//!
//! A mapping fault abandons that country; per-triple and per-source faults
//! are recorded and the run carries on. Records are ordered only after all
//! countries finish, and nothing is returned if the run was cancelled.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Deserialize;

use crate::alert::evaluate_country;
use crate::alert::staleness::is_stale_at;
use crate::assemble::{ResultRecord, assemble_country, order_records};
use crate::countries::{CountryProfile, CountryRegistry};
use crate::exposure::{ExposureCatalog, aggregate_exposure};
use crate::logging::{Stage, log_run_summary, log_stage_failure};
use crate::mapping::map_stations;
use crate::mock::MockForecast;
use crate::model::{AdministrativeUnit, ForecastStation};
use crate::report::{CountryDiagnostics, RunDiagnostics, RunReport};

/// Default `max_forecast_age_hours`.
pub const DEFAULT_MAX_FORECAST_AGE_HOURS: i64 = 48;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Returned by work that stopped because the run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("run cancelled")]
pub struct Cancelled;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }
}

// ---------------------------------------------------------------------------
// Inputs and options
// ---------------------------------------------------------------------------

/// Everything the external collaborators materialised for one country.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CountryInput {
    #[serde(default)]
    pub stations: Vec<ForecastStation>,
    #[serde(default)]
    pub units: Vec<AdministrativeUnit>,
    /// Issue time of the forecast, if the feed reported one.
    #[serde(default)]
    pub forecast_issued: Option<DateTime<Utc>>,
}

/// Per-run input keyed by ISO3 code.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunInput {
    #[serde(default)]
    pub countries: BTreeMap<String, CountryInput>,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run clock, used for staleness and `generated_at`.
    pub now: DateTime<Utc>,
    pub max_forecast_age_hours: i64,
    /// Worker threads; `None` uses the global rayon pool.
    pub workers: Option<usize>,
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            max_forecast_age_hours: DEFAULT_MAX_FORECAST_AGE_HOURS,
            workers: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("run input names unknown country: {0}")]
    UnknownCountry(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("no unit was evaluated in any country")]
    NothingEvaluated(Box<RunDiagnostics>),
    #[error("cannot build worker pool: {0}")]
    WorkerPool(String),
}

impl From<Cancelled> for EngineError {
    fn from(_: Cancelled) -> Self {
        EngineError::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

struct CountryRun {
    records: Vec<ResultRecord>,
    diagnostics: CountryDiagnostics,
}

/// Evaluates every registry country and returns the ordered report.
///
/// Countries present in the registry but absent from `input` are still
/// listed in diagnostics (`input_present = false`). A country in `input`
/// that the registry does not know aborts the run before any evaluation.
pub fn run(
    registry: &CountryRegistry,
    input: &RunInput,
    catalog: &dyn ExposureCatalog,
    options: &RunOptions,
) -> Result<RunReport, EngineError> {
    for code in input.countries.keys() {
        if registry.get_profile(code).is_err() {
            return Err(EngineError::UnknownCountry(code.clone()));
        }
    }

    match options.workers {
        Some(workers) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| EngineError::WorkerPool(e.to_string()))?;
            pool.install(|| run_countries(registry, input, catalog, options))
        }
        None => run_countries(registry, input, catalog, options),
    }
}

fn run_countries(
    registry: &CountryRegistry,
    input: &RunInput,
    catalog: &dyn ExposureCatalog,
    options: &RunOptions,
) -> Result<RunReport, EngineError> {
    let runs: Vec<CountryRun> = registry
        .profiles()
        .par_iter()
        .map(|profile| {
            run_country(
                profile,
                input.countries.get(profile.code().as_str()),
                catalog,
                options,
            )
        })
        .collect::<Result<_, Cancelled>>()?;
    options.cancel.check()?;

    let mut records = Vec::new();
    let mut countries = Vec::with_capacity(runs.len());
    for country_run in runs {
        records.extend(country_run.records);
        countries.push(country_run.diagnostics);
    }
    let records = order_records(&registry.list_countries(), records);
    let diagnostics = RunDiagnostics::new(countries, &records);

    let totals = &diagnostics.totals;
    log_run_summary(
        totals.countries,
        totals.countries - totals.failed_countries,
        totals.failed_countries,
        records.len(),
    );

    if totals.decisions == 0 {
        return Err(EngineError::NothingEvaluated(Box::new(diagnostics)));
    }
    Ok(RunReport::new(options.now, records, diagnostics))
}

fn run_country(
    profile: &CountryProfile,
    input: Option<&CountryInput>,
    catalog: &dyn ExposureCatalog,
    options: &RunOptions,
) -> Result<CountryRun, Cancelled> {
    options.cancel.check()?;

    let country = profile.code().as_str();
    let mut diagnostics = CountryDiagnostics::for_profile(profile);

    let empty = CountryInput::default();
    let input = match input {
        Some(input) => input,
        None => {
            tracing::warn!(country, "no run input for country");
            diagnostics.input_present = false;
            &empty
        }
    };

    if let Some(issued) = input.forecast_issued {
        if is_stale_at(issued, options.max_forecast_age_hours, options.now) {
            tracing::warn!(
                country,
                issued = %issued.to_rfc3339(),
                max_age_hours = options.max_forecast_age_hours,
                "forecast is stale"
            );
            diagnostics.stale_forecast = true;
        }
    }

    let stations: Cow<'_, [ForecastStation]> = if profile.mock() {
        tracing::info!(country, "mock profile, replacing forecast with mock data");
        Cow::Owned(MockForecast::for_profile(profile).apply(profile, &input.stations))
    } else {
        Cow::Borrowed(&input.stations)
    };

    let mapping = match map_stations(profile, &stations, &input.units) {
        Ok(mapping) => mapping,
        Err(err) => {
            log_stage_failure(Stage::Mapping, country, "map stations", &err);
            diagnostics.mapping_error = Some(err);
            return Ok(CountryRun {
                records: Vec::new(),
                diagnostics,
            });
        }
    };
    diagnostics.monitored_units = mapping.monitored_count();
    diagnostics.unmonitored_units = mapping.unmonitored().into_iter().map(str::to_string).collect();
    diagnostics.outside_focus_units = mapping.outside_focus().len();
    tracing::debug!(
        country,
        monitored = diagnostics.monitored_units,
        unmonitored = diagnostics.unmonitored_units.len(),
        outside_focus = diagnostics.outside_focus_units,
        "stations mapped"
    );

    let evaluation = evaluate_country(profile, &mapping, &stations);
    options.cancel.check()?;

    let triggered: BTreeSet<&str> = evaluation.triggered_place_codes().into_iter().collect();
    let triggered_units: Vec<&AdministrativeUnit> = input
        .units
        .iter()
        .filter(|u| triggered.contains(u.place_code.as_str()))
        .collect();
    let exposure = aggregate_exposure(profile, &triggered_units, catalog, &options.cancel)?;

    let records = assemble_country(profile, &input.units, &evaluation.decisions, &exposure);

    diagnostics.decisions = evaluation.decisions.len();
    diagnostics.triggered_units = triggered_units.len();
    diagnostics.forecast_faults = evaluation.faults;
    diagnostics.exposure_failures = exposure.failures;

    Ok(CountryRun { records, diagnostics })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
