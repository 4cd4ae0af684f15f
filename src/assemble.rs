//! Result assembly.
//!
//! Merges trigger decisions with exposure counts into one record per
//! (country, unit, lead time), and fixes the output order:
//! country (registry order), then place code, then lead time ascending.
//! Downstream diffs rely on that order.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::alert::{TriggerBand, TriggerDecision};
use crate::countries::CountryProfile;
use crate::exposure::{ExposureOutcome, ExposureValue};
use crate::model::{AdministrativeUnit, CountryCode, ReturnPeriod};

/// Version of the record layout written by `report::write_json_lines`.
pub const SCHEMA_VERSION: u32 = 1;

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub country: CountryCode,
    pub place_code: String,
    pub admin_level: u8,
    pub lead_time: String,
    pub lead_time_days: u32,
    pub station_code: String,
    pub return_period: ReturnPeriod,
    pub probability: f64,
    pub band: TriggerBand,
    pub triggered: bool,
    /// Fired only because of `if_mock_trigger`.
    pub forced_trigger: bool,
    /// Present on triggered records only: one entry per configured source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure: Option<BTreeMap<String, ExposureValue>>,
}

/// Builds the records for one country.
///
/// Every triggered record carries every configured exposure source; a
/// source with no computed value is filled with a `Failed` marker rather
/// than left out.
pub fn assemble_country(
    profile: &CountryProfile,
    units: &[AdministrativeUnit],
    decisions: &[TriggerDecision],
    exposure: &ExposureOutcome,
) -> Vec<ResultRecord> {
    let levels: HashMap<&str, u8> = units
        .iter()
        .map(|u| (u.place_code.as_str(), u.admin_level))
        .collect();

    decisions
        .iter()
        .map(|decision| {
            let sources = decision.triggered.then(|| {
                let computed = exposure.by_unit.get(&decision.place_code);
                profile
                    .all_exposure_sources()
                    .map(|source| {
                        let value = computed
                            .and_then(|by_source| by_source.get(&source.name))
                            .cloned()
                            .unwrap_or_else(|| ExposureValue::Failed {
                                reason: "exposure was not computed".to_string(),
                            });
                        (source.name.clone(), value)
                    })
                    .collect()
            });

            ResultRecord {
                country: decision.country.clone(),
                place_code: decision.place_code.clone(),
                admin_level: levels
                    .get(decision.place_code.as_str())
                    .copied()
                    .unwrap_or(profile.admin_level()),
                lead_time: decision.lead_time.name.clone(),
                lead_time_days: decision.lead_time.days,
                station_code: decision.station_code.clone(),
                return_period: profile.return_period(),
                probability: decision.probability,
                band: decision.band,
                triggered: decision.triggered,
                forced_trigger: decision.forced,
                exposure: sources,
            }
        })
        .collect()
}

/// Puts records from all countries into contract order.
///
/// `country_order` is the registry order; countries not listed sort last
/// by code.
pub fn order_records(country_order: &[&CountryCode], mut records: Vec<ResultRecord>) -> Vec<ResultRecord> {
    let position: HashMap<&CountryCode, usize> = country_order
        .iter()
        .enumerate()
        .map(|(i, code)| (*code, i))
        .collect();
    records.sort_by(|a, b| {
        let pa = position.get(&a.country).copied().unwrap_or(usize::MAX);
        let pb = position.get(&b.country).copied().unwrap_or(usize::MAX);
        pa.cmp(&pb)
            .then_with(|| a.country.cmp(&b.country))
            .then_with(|| a.place_code.cmp(&b.place_code))
            .then_with(|| a.lead_time_days.cmp(&b.lead_time_days))
            .then_with(|| a.lead_time.cmp(&b.lead_time))
    });
    records
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
