//! Trigger evaluation per (unit, lead time).
//!
//! Only monitored units are evaluated; each reads the probability of its
//! controlling station. Missing and out-of-range probabilities are
//! reported as faults for that triple and never defaulted.
//!
//! `if_mock_trigger` forces `triggered = true` on `None`-band decisions
//! but leaves probability and band untouched; `forced` marks those
//! decisions so they can be told apart from genuine triggers.

use std::collections::HashMap;

use serde::Serialize;

use crate::alert::thresholds::{TriggerBand, classify};
use crate::countries::CountryProfile;
use crate::logging::{Stage, log_stage_failure};
use crate::mapping::StationUnitMapping;
use crate::model::{CountryCode, ForecastError, ForecastStation, LeadTime};

/// Trigger state for one (country, unit, lead time).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerDecision {
    pub country: CountryCode,
    pub place_code: String,
    pub lead_time: LeadTime,
    pub station_code: String,
    pub probability: f64,
    pub band: TriggerBand,
    pub triggered: bool,
    /// `true` when only `if_mock_trigger` made this decision fire.
    pub forced: bool,
}

/// Everything the evaluator produced for one country.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Ordered by place code, then lead time ascending.
    pub decisions: Vec<TriggerDecision>,
    pub faults: Vec<ForecastError>,
}

impl Evaluation {
    /// Place codes with at least one triggered lead time, deduplicated,
    /// in place-code order.
    pub fn triggered_place_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self
            .decisions
            .iter()
            .filter(|d| d.triggered)
            .map(|d| d.place_code.as_str())
            .collect();
        codes.dedup();
        codes
    }
}

/// Decides one triple from the controlling station's forecast.
pub fn evaluate_unit(
    profile: &CountryProfile,
    place_code: &str,
    station: &ForecastStation,
    lead_time: &LeadTime,
) -> Result<TriggerDecision, ForecastError> {
    let probability = station
        .probability(&lead_time.name)
        .ok_or_else(|| ForecastError::MissingForecast {
            country: profile.code().clone(),
            place_code: place_code.to_string(),
            lead_time: lead_time.name.clone(),
            station_code: station.station_code.clone(),
        })?;

    if !(0.0..=1.0).contains(&probability) {
        return Err(ForecastError::InvalidForecastValue {
            country: profile.code().clone(),
            place_code: place_code.to_string(),
            lead_time: lead_time.name.clone(),
            station_code: station.station_code.clone(),
            value: probability,
        });
    }

    let band = classify(probability, profile.thresholds());
    let forced = !band.is_trigger() && profile.if_mock_trigger();

    Ok(TriggerDecision {
        country: profile.code().clone(),
        place_code: place_code.to_string(),
        lead_time: lead_time.clone(),
        station_code: station.station_code.clone(),
        probability,
        band,
        triggered: band.is_trigger() || forced,
        forced,
    })
}

/// Evaluates every monitored unit of a country at every lead time.
///
/// `stations` must be the station set the mapping was built from.
pub fn evaluate_country(
    profile: &CountryProfile,
    mapping: &StationUnitMapping,
    stations: &[ForecastStation],
) -> Evaluation {
    let by_code: HashMap<&str, &ForecastStation> = stations
        .iter()
        .map(|s| (s.station_code.as_str(), s))
        .collect();

    let mut evaluation = Evaluation::default();
    for (place_code, station_code) in mapping.monitored() {
        for lead_time in profile.lead_times() {
            let result = match by_code.get(station_code) {
                Some(station) => evaluate_unit(profile, place_code, station, lead_time),
                None => Err(ForecastError::MissingForecast {
                    country: profile.code().clone(),
                    place_code: place_code.to_string(),
                    lead_time: lead_time.name.clone(),
                    station_code: station_code.to_string(),
                }),
            };
            match result {
                Ok(decision) => evaluation.decisions.push(decision),
                Err(fault) => {
                    log_stage_failure(Stage::Trigger, profile.code().as_str(), "evaluate trigger", &fault);
                    evaluation.faults.push(fault);
                }
            }
        }
    }

    let triggered = evaluation.decisions.iter().filter(|d| d.triggered).count();
    tracing::info!(
        country = %profile.code(),
        decisions = evaluation.decisions.len(),
        triggered,
        faults = evaluation.faults.len(),
        "triggers evaluated"
    );
    evaluation
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countries::CountryRegistry;
    use crate::mapping::map_stations;
    use crate::exposure::geometry;
    use crate::model::{AdministrativeUnit, StationLocation};
    use std::collections::BTreeMap;

    fn profile(if_mock_trigger: bool) -> CountryProfile {
        let text = format!(
            r#"
            [[country]]
            code = "MWI"
            place_code_initial = "MW"
            placecode_len = 5
            admin_level = 3
            levels = [3, 2, 1]
            if_mock_trigger = {}
            lead_times = {{ "7-day" = 7, "3-day" = 3 }}
            trigger_levels = {{ minimum = 0.6, medium = 0.7, maximum = 0.8 }}

            [country.exposure_sources.population]
            source = "population/population_mwi"
            raster_value = 1.0
            "#,
            if_mock_trigger
        );
        CountryRegistry::from_toml_str(&text)
            .expect("test profile is valid")
            .profiles()[0]
            .clone()
    }

    fn station(code: &str, place_code: &str, probabilities: &[(&str, f64)]) -> ForecastStation {
        ForecastStation {
            station_code: code.to_string(),
            location: StationLocation::PlaceCodes {
                place_codes: vec![place_code.to_string()],
            },
            hydro_order: 1,
            drainage_area_km2: None,
            probabilities: probabilities
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn unit(code: &str) -> AdministrativeUnit {
        AdministrativeUnit {
            place_code: code.to_string(),
            admin_level: 3,
            name: None,
            geometry: geometry::empty(),
        }
    }

    fn lead(name: &str, days: u32) -> LeadTime {
        LeadTime { name: name.to_string(), days }
    }

    #[test]
    fn test_probability_in_minimum_band_triggers() {
        let s = station("G1", "MW10201", &[("7-day", 0.65)]);
        let d = evaluate_unit(&profile(false), "MW10201", &s, &lead("7-day", 7)).expect("valid forecast");
        assert_eq!(d.band, TriggerBand::Minimum);
        assert!(d.triggered);
        assert!(!d.forced);
        assert_eq!(d.probability, 0.65);
    }

    #[test]
    fn test_probability_below_minimum_does_not_trigger() {
        let s = station("G1", "MW10201", &[("7-day", 0.59)]);
        let d = evaluate_unit(&profile(false), "MW10201", &s, &lead("7-day", 7)).expect("valid forecast");
        assert_eq!(d.band, TriggerBand::None);
        assert!(!d.triggered);
    }

    #[test]
    fn test_mock_trigger_forces_flag_but_keeps_band_and_probability() {
        let s = station("G1", "MW10201", &[("7-day", 0.2)]);
        let d = evaluate_unit(&profile(true), "MW10201", &s, &lead("7-day", 7)).expect("valid forecast");
        assert!(d.triggered, "if_mock_trigger should force the trigger");
        assert!(d.forced);
        assert_eq!(d.band, TriggerBand::None);
        assert_eq!(d.probability, 0.2);

        let genuine = station("G1", "MW10201", &[("7-day", 0.61)]);
        let g = evaluate_unit(&profile(true), "MW10201", &genuine, &lead("7-day", 7)).expect("valid forecast");
        assert!(g.triggered);
        assert!(!g.forced, "a genuine minimum-band trigger is not forced");
        assert_ne!(d, g);
    }

    #[test]
    fn test_missing_probability_is_a_fault_not_zero() {
        let s = station("G1", "MW10201", &[("3-day", 0.9)]);
        let err = evaluate_unit(&profile(false), "MW10201", &s, &lead("7-day", 7))
            .expect_err("no 7-day forecast should be an error");
        assert!(matches!(err, ForecastError::MissingForecast { .. }));
    }

    #[test]
    fn test_out_of_range_probability_is_rejected() {
        for bad in [-0.1, 1.01, f64::NAN] {
            let s = station("G1", "MW10201", &[("7-day", bad)]);
            let result = evaluate_unit(&profile(false), "MW10201", &s, &lead("7-day", 7));
            assert!(
                matches!(result, Err(ForecastError::InvalidForecastValue { .. })),
                "probability {} should be invalid",
                bad
            );
        }
    }

    #[test]
    fn test_country_evaluation_orders_and_isolates_faults() {
        let p = profile(false);
        let stations = [
            station("G1", "MW10202", &[("3-day", 0.75), ("7-day", 0.85)]),
            station("G2", "MW10201", &[("7-day", 0.5)]),
        ];
        let units = [unit("MW10202"), unit("MW10201"), unit("MW10301")];
        let mapping = map_stations(&p, &stations, &units).expect("valid mapping");
        let evaluation = evaluate_country(&p, &mapping, &stations);

        let keys: Vec<_> = evaluation
            .decisions
            .iter()
            .map(|d| (d.place_code.as_str(), d.lead_time.days))
            .collect();
        assert_eq!(keys, [("MW10201", 7), ("MW10202", 3), ("MW10202", 7)]);

        assert_eq!(evaluation.faults.len(), 1, "MW10201 has no 3-day forecast");
        assert!(
            evaluation.decisions.iter().all(|d| d.place_code != "MW10301"),
            "unmonitored units must never be evaluated"
        );
        assert_eq!(evaluation.triggered_place_codes(), ["MW10202"]);
    }
}
