/// Core data types for the flood trigger engine.
///
/// This module defines the shared domain model imported by all other
/// modules: country codes, lead times, trigger thresholds, forecast
/// stations, administrative units, and the per-stage error types.
/// It contains no I/O.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exposure::geometry;
pub use crate::exposure::geometry::Geometry;

// ---------------------------------------------------------------------------
// Country codes
// ---------------------------------------------------------------------------

/// ISO 3166-1 alpha-3 country code, e.g. `"MWI"`.
///
/// Always exactly three uppercase ASCII letters; the constructor rejects
/// anything else so a malformed code can never key a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn parse(code: &str) -> Result<Self, ProfileError> {
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(code.to_string()))
        } else {
            Err(ProfileError::InvalidProfile {
                country: code.to_string(),
                reason: "country code must be exactly 3 uppercase letters".to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CountryCode {
    type Error = ProfileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Lead times and return periods
// ---------------------------------------------------------------------------

/// A named forecast horizon, e.g. `"7-day"` → 7 days.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadTime {
    pub name: String,
    pub days: u32,
}

/// GloFAS return-period threshold the forecast probability refers to,
/// written `rl5`, `rl10`, … in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReturnPeriod(u32);

impl ReturnPeriod {
    pub fn years(self) -> u32 {
        self.0
    }
}

impl Default for ReturnPeriod {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<String> for ReturnPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .strip_prefix("rl")
            .and_then(|years| years.parse::<u32>().ok())
            .filter(|&years| years > 0)
            .map(Self)
            .ok_or_else(|| format!("invalid return period '{}', expected e.g. 'rl5'", value))
    }
}

impl From<ReturnPeriod> for String {
    fn from(rp: ReturnPeriod) -> Self {
        rp.to_string()
    }
}

impl fmt::Display for ReturnPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rl{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Threshold types
// ---------------------------------------------------------------------------

/// Trigger probability thresholds for a country.
///
/// Probabilities in `[0, 1]`, non-decreasing:
///   minimum <= medium <= maximum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerThresholds {
    pub minimum: f64,
    pub medium: f64,
    pub maximum: f64,
}

impl TriggerThresholds {
    /// Checks range and ordering. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        for (label, value) in [
            ("minimum", self.minimum),
            ("medium", self.medium),
            ("maximum", self.maximum),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} threshold {} is outside [0, 1]", label, value));
            }
        }
        if self.minimum > self.medium || self.medium > self.maximum {
            return Err(format!(
                "thresholds must be non-decreasing, got minimum={} medium={} maximum={}",
                self.minimum, self.medium, self.maximum
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Forecast stations
// ---------------------------------------------------------------------------

/// Where a forecast station's measurement applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StationLocation {
    /// Pre-assigned place codes from the station/district mapping table.
    /// The station covers each listed unit and all of its descendants.
    PlaceCodes { place_codes: Vec<String> },
    /// Station coordinate; covers the finest-level unit(s) containing it.
    Coordinate { lon: f64, lat: f64 },
}

/// A forecast point together with this run's per-lead-time probabilities.
///
/// `probabilities` is keyed by lead-time name (`"7-day"`), each value the
/// forecast probability of exceeding the country's return-period
/// discharge within that lead time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastStation {
    pub station_code: String,
    pub location: StationLocation,
    /// Position along the river network; larger is further downstream.
    #[serde(default)]
    pub hydro_order: u32,
    #[serde(default)]
    pub drainage_area_km2: Option<f64>,
    #[serde(default)]
    pub probabilities: BTreeMap<String, f64>,
}

impl ForecastStation {
    pub fn probability(&self, lead_time: &str) -> Option<f64> {
        self.probabilities.get(lead_time).copied()
    }
}

// ---------------------------------------------------------------------------
// Administrative units
// ---------------------------------------------------------------------------

/// A polygon in the country's admin hierarchy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdministrativeUnit {
    pub place_code: String,
    pub admin_level: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "geometry::empty", deserialize_with = "geometry::deserialize")]
    pub geometry: Geometry,
}

impl AdministrativeUnit {
    /// Returns `true` if `ancestor` is this unit or one of its parents,
    /// judged by place-code prefix.
    pub fn is_within(&self, ancestor: &str) -> bool {
        self.place_code.starts_with(ancestor)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while loading or querying country profiles.
///
/// All of these are configuration faults and abort the run before any
/// evaluation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("unknown country: {0}")]
    UnknownCountry(String),
    #[error("invalid profile for {country}: {reason}")]
    InvalidProfile { country: String, reason: String },
    #[error("failed to parse country profiles: {0}")]
    Parse(String),
    #[error("failed to read country profiles from {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Station/unit reconciliation faults. Fatal for the affected country only.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingError {
    #[error("{country}: cannot choose a controlling station for {place_code} among {candidates:?}")]
    AmbiguousMapping {
        country: CountryCode,
        place_code: String,
        candidates: Vec<String>,
    },
    #[error("{country}: invalid administrative unit {place_code}: {reason}")]
    InvalidAdministrativeUnit {
        country: CountryCode,
        place_code: String,
        reason: String,
    },
}

/// Per-(unit, lead time) forecast faults. Recoverable: the triple is
/// excluded from results and recorded in diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecastError {
    #[error("{country}/{place_code}/{lead_time}: no forecast from station {station_code}")]
    MissingForecast {
        country: CountryCode,
        place_code: String,
        lead_time: String,
        station_code: String,
    },
    #[error("{country}/{place_code}/{lead_time}: station {station_code} reported probability {value} outside [0, 1]")]
    InvalidForecastValue {
        country: CountryCode,
        place_code: String,
        lead_time: String,
        station_code: String,
        value: f64,
    },
}

/// Per-source exposure faults. Recoverable: only the affected source is
/// marked failed.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExposureError {
    #[error("exposure source '{source_name}' ({dataset}) unavailable: {reason}")]
    ExposureSourceUnavailable {
        source_name: String,
        dataset: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code_accepts_iso3() {
        let code = CountryCode::parse("MWI").expect("MWI is a valid ISO3 code");
        assert_eq!(code.as_str(), "MWI");
        assert_eq!(code.to_string(), "MWI");
    }

    #[test]
    fn test_country_code_rejects_malformed_codes() {
        for bad in ["mwi", "MW", "MWIX", "M1I", ""] {
            assert!(
                CountryCode::parse(bad).is_err(),
                "'{}' should not be accepted as a country code",
                bad
            );
        }
    }

    #[test]
    fn test_return_period_round_trips_through_text() {
        let rp = ReturnPeriod::try_from("rl10".to_string()).expect("rl10 should parse");
        assert_eq!(rp.years(), 10);
        assert_eq!(rp.to_string(), "rl10");
        assert!(ReturnPeriod::try_from("10".to_string()).is_err());
        assert!(ReturnPeriod::try_from("rl0".to_string()).is_err());
    }

    #[test]
    fn test_thresholds_validation() {
        let ok = TriggerThresholds { minimum: 0.6, medium: 0.7, maximum: 0.8 };
        assert!(ok.validate().is_ok());

        let flat = TriggerThresholds { minimum: 0.7, medium: 0.7, maximum: 0.7 };
        assert!(flat.validate().is_ok(), "equal thresholds are non-decreasing");

        let descending = TriggerThresholds { minimum: 0.8, medium: 0.7, maximum: 0.9 };
        assert!(descending.validate().is_err());

        let out_of_range = TriggerThresholds { minimum: 0.6, medium: 0.7, maximum: 1.2 };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_unit_place_code_ancestry() {
        let unit = AdministrativeUnit {
            place_code: "MW10203".to_string(),
            admin_level: 3,
            name: None,
            geometry: geometry::empty(),
        };
        assert!(unit.is_within("MW102"));
        assert!(unit.is_within("MW10203"));
        assert!(!unit.is_within("MW103"));
    }

    #[test]
    fn test_station_probability_lookup_by_lead_time_name() {
        let station = ForecastStation {
            station_code: "G1001".to_string(),
            location: StationLocation::Coordinate { lon: 33.0, lat: -14.0 },
            hydro_order: 1,
            drainage_area_km2: None,
            probabilities: BTreeMap::from([("7-day".to_string(), 0.65)]),
        };
        assert_eq!(station.probability("7-day"), Some(0.65));
        assert_eq!(station.probability("3-day"), None);
    }
}
