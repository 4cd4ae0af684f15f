/// Station-to-administrative-unit mapping.
///
/// Resolves, for one country and one run, which forecast station controls
/// each administrative unit. A unit covered by no station is
/// `Unmonitored`: it is excluded from trigger evaluation and can never
/// trigger.
///
/// # Coverage
/// - A station with pre-assigned place codes covers each listed unit and
///   every unit below it in the hierarchy (place-code prefix).
/// - A station with a coordinate covers the finest-level unit(s) whose
///   geometry contains the point.
///
/// # Controlling station
/// When several stations cover a unit the most downstream one wins
/// (`hydro_order`), then the one with the larger drainage area, then the
/// lexicographically smallest station code. The choice depends only on
/// the candidate set, never on input order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use geo::Coord;
use serde::Serialize;

use crate::countries::CountryProfile;
use crate::exposure::geometry;
use crate::model::{AdministrativeUnit, ForecastStation, MappingError, StationLocation};

/// Coverage state of one administrative unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitCoverage {
    Controlled { station_code: String },
    Unmonitored,
}

/// Read-only result of `map_stations`.
#[derive(Debug, Clone, PartialEq)]
pub struct StationUnitMapping {
    coverage: BTreeMap<String, UnitCoverage>,
    outside_focus: Vec<String>,
}

impl StationUnitMapping {
    /// Controlling station for a unit, if monitored.
    pub fn controlling_station(&self, place_code: &str) -> Option<&str> {
        match self.coverage.get(place_code) {
            Some(UnitCoverage::Controlled { station_code }) => Some(station_code),
            _ => None,
        }
    }

    pub fn coverage(&self, place_code: &str) -> Option<&UnitCoverage> {
        self.coverage.get(place_code)
    }

    /// Monitored units and their controlling station, by place code.
    pub fn monitored(&self) -> impl Iterator<Item = (&str, &str)> {
        self.coverage.iter().filter_map(|(code, coverage)| match coverage {
            UnitCoverage::Controlled { station_code } => Some((code.as_str(), station_code.as_str())),
            UnitCoverage::Unmonitored => None,
        })
    }

    /// Place codes of in-scope units with no controlling station.
    pub fn unmonitored(&self) -> Vec<&str> {
        self.coverage
            .iter()
            .filter(|(_, c)| **c == UnitCoverage::Unmonitored)
            .map(|(code, _)| code.as_str())
            .collect()
    }

    pub fn monitored_count(&self) -> usize {
        self.monitored().count()
    }

    /// Units skipped because the profile's focus list excludes them.
    pub fn outside_focus(&self) -> &[String] {
        &self.outside_focus
    }
}

/// Builds the station/unit mapping for one country.
///
/// Fails with `InvalidAdministrativeUnit` if a unit does not follow the
/// profile's place-code and level conventions, and with `AmbiguousMapping`
/// if a unit's winning station code appears on more than one station
/// record. Evaluation looks stations up by code, so a controlling code
/// must name exactly one record.
pub fn map_stations(
    profile: &CountryProfile,
    stations: &[ForecastStation],
    units: &[AdministrativeUnit],
) -> Result<StationUnitMapping, MappingError> {
    let mut seen = BTreeSet::new();
    for unit in units {
        validate_unit(profile, unit)?;
        if !seen.insert(unit.place_code.as_str()) {
            return Err(invalid_unit(profile, unit, "duplicate place code".to_string()));
        }
    }

    let mut station_codes = BTreeSet::new();
    let duplicated: BTreeSet<&str> = stations
        .iter()
        .map(|s| s.station_code.as_str())
        .filter(|code| !station_codes.insert(*code))
        .collect();

    let mut coverage = BTreeMap::new();
    let mut outside_focus = Vec::new();

    for unit in units {
        if !profile.in_focus(&unit.place_code) {
            outside_focus.push(unit.place_code.clone());
            continue;
        }

        let candidates: Vec<&ForecastStation> = stations
            .iter()
            .filter(|station| covers(profile, station, unit))
            .collect();

        let state = match select_controlling(&candidates, &duplicated) {
            Selection::None => UnitCoverage::Unmonitored,
            Selection::Unique(station) => UnitCoverage::Controlled {
                station_code: station.station_code.clone(),
            },
            Selection::Tied(codes) => {
                return Err(MappingError::AmbiguousMapping {
                    country: profile.code().clone(),
                    place_code: unit.place_code.clone(),
                    candidates: codes,
                });
            }
        };
        coverage.insert(unit.place_code.clone(), state);
    }

    outside_focus.sort();
    tracing::debug!(
        country = %profile.code(),
        units = coverage.len(),
        outside_focus = outside_focus.len(),
        "station mapping built"
    );

    Ok(StationUnitMapping {
        coverage,
        outside_focus,
    })
}

fn covers(profile: &CountryProfile, station: &ForecastStation, unit: &AdministrativeUnit) -> bool {
    match &station.location {
        StationLocation::PlaceCodes { place_codes } => {
            place_codes.iter().any(|code| unit.is_within(code))
        }
        StationLocation::Coordinate { lon, lat } => {
            unit.admin_level == profile.admin_level()
                && geometry::contains(&unit.geometry, Coord { x: *lon, y: *lat })
        }
    }
}

enum Selection<'a> {
    None,
    Unique(&'a ForecastStation),
    Tied(Vec<String>),
}

/// `Greater` means `a` should control in preference to `b`.
fn precedence(a: &ForecastStation, b: &ForecastStation) -> Ordering {
    a.hydro_order
        .cmp(&b.hydro_order)
        .then_with(|| match (a.drainage_area_km2, b.drainage_area_km2) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.station_code.cmp(&a.station_code))
}

/// Precedence is total over distinct codes, so the only unresolvable case
/// is a winner whose code is shared by another record.
fn select_controlling<'a>(
    candidates: &[&'a ForecastStation],
    duplicated: &BTreeSet<&str>,
) -> Selection<'a> {
    let Some(best) = candidates.iter().copied().max_by(|a, b| precedence(a, b)) else {
        return Selection::None;
    };
    if duplicated.contains(best.station_code.as_str()) {
        let mut codes: Vec<String> = candidates.iter().map(|c| c.station_code.clone()).collect();
        codes.sort();
        return Selection::Tied(codes);
    }
    Selection::Unique(best)
}

fn validate_unit(profile: &CountryProfile, unit: &AdministrativeUnit) -> Result<(), MappingError> {
    if !unit.place_code.starts_with(profile.place_code_initial()) {
        return Err(invalid_unit(
            profile,
            unit,
            format!("place code must start with '{}'", profile.place_code_initial()),
        ));
    }
    if !profile.levels().contains(&unit.admin_level) {
        return Err(invalid_unit(
            profile,
            unit,
            format!("admin level {} not in {:?}", unit.admin_level, profile.levels()),
        ));
    }
    if unit.admin_level == profile.admin_level()
        && unit.place_code.len() != profile.finest_place_code_len()
    {
        return Err(invalid_unit(
            profile,
            unit,
            format!(
                "admin{} place code must be {} characters",
                unit.admin_level,
                profile.finest_place_code_len()
            ),
        ));
    }
    Ok(())
}

fn invalid_unit(profile: &CountryProfile, unit: &AdministrativeUnit, reason: String) -> MappingError {
    MappingError::InvalidAdministrativeUnit {
        country: profile.code().clone(),
        place_code: unit.place_code.clone(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
