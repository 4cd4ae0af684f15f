/// Country profile registry for the flood trigger engine.
///
/// Holds one validated, immutable `CountryProfile` per monitored country:
/// lead times, trigger thresholds, admin hierarchy, place-code layout and
/// exposure sources. This is the single source of truth for per-country
/// settings; the engine receives a `&CountryRegistry` and never reads
/// configuration from anywhere else.
///
/// Profiles are validated once, when the registry is built. A registry
/// that exists is a registry whose every profile is well-formed.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::model::{CountryCode, LeadTime, ProfileError, ReturnPeriod, TriggerThresholds};

/// Built-in profiles shipped with the engine.
pub const BUILTIN_PROFILES: &str = include_str!("../config/countries.toml");

// ---------------------------------------------------------------------------
// Raw configuration records
// ---------------------------------------------------------------------------

/// One `[[country]]` entry exactly as written in the profiles TOML.
///
/// Integer fields are read signed so that negative values reach
/// validation and fail with a precise message rather than a parse error.
#[derive(Debug, Clone, Deserialize)]
pub struct CountryProfileSpec {
    pub code: String,
    pub admin_level: i64,
    pub levels: Vec<i64>,
    pub place_code_initial: String,
    pub placecode_len: i64,
    pub lead_times: BTreeMap<String, i64>,
    pub trigger_levels: TriggerThresholds,
    #[serde(default)]
    pub return_period: ReturnPeriod,
    #[serde(default)]
    pub mock: bool,
    #[serde(default)]
    pub if_mock_trigger: bool,
    #[serde(default)]
    pub notify_email: bool,
    pub exposure_sources: BTreeMap<String, ExposureSourceSpec>,
    #[serde(default)]
    pub subpopulation_sources: BTreeMap<String, ExposureSourceSpec>,
    #[serde(default)]
    pub focus_areas: Option<Vec<String>>,
}

/// Exposure dataset reference: either a raster with a per-cell multiplier
/// or a per-unit attribute column.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExposureSourceSpec {
    Raster { source: String, raster_value: f64 },
    Attribute { source: String, col_name: String },
}

#[derive(Debug, Deserialize)]
struct ProfileDocument {
    #[serde(rename = "country", default)]
    countries: Vec<CountryProfileSpec>,
}

// ---------------------------------------------------------------------------
// Validated profile
// ---------------------------------------------------------------------------

/// Where an exposure count comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ExposureDataset {
    /// Raster summed over the unit; each cell value is multiplied by
    /// `raster_value` to give the count it contributes.
    Raster { raster: String, raster_value: f64 },
    /// Numeric column of a per-place-code table.
    Attribute { table: String, column: String },
}

impl ExposureDataset {
    /// Identifier of the underlying dataset, for diagnostics.
    pub fn dataset_id(&self) -> &str {
        match self {
            ExposureDataset::Raster { raster, .. } => raster,
            ExposureDataset::Attribute { table, .. } => table,
        }
    }
}

/// A named exposure source, e.g. `population` or `pop_u18`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureSource {
    pub name: String,
    pub dataset: ExposureDataset,
}

/// Immutable, validated configuration for one country.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryProfile {
    code: CountryCode,
    admin_level: u8,
    levels: Vec<u8>,
    place_code_initial: String,
    placecode_len: usize,
    lead_times: Vec<LeadTime>,
    thresholds: TriggerThresholds,
    return_period: ReturnPeriod,
    mock: bool,
    if_mock_trigger: bool,
    notify_email: bool,
    exposure_sources: Vec<ExposureSource>,
    subpopulation_sources: Vec<ExposureSource>,
    focus_areas: Option<BTreeSet<String>>,
}

impl CountryProfile {
    /// Validates a raw spec into a profile.
    ///
    /// Fails with `InvalidProfile` if thresholds are out of order, a lead
    /// time is non-positive, `placecode_len` is shorter than the place-code
    /// prefix, or `levels` is not strictly decreasing from `admin_level`
    /// down to 1.
    pub fn from_spec(spec: CountryProfileSpec) -> Result<Self, ProfileError> {
        let code = CountryCode::parse(&spec.code)?;
        let invalid = |reason: String| ProfileError::InvalidProfile {
            country: spec.code.clone(),
            reason,
        };

        spec.trigger_levels.validate().map_err(invalid)?;

        if spec.lead_times.is_empty() {
            return Err(invalid("at least one lead time is required".to_string()));
        }
        let mut lead_times = Vec::with_capacity(spec.lead_times.len());
        for (name, &days) in &spec.lead_times {
            if name.trim().is_empty() {
                return Err(invalid("lead time names must not be empty".to_string()));
            }
            let days = u32::try_from(days)
                .ok()
                .filter(|&d| d > 0)
                .ok_or_else(|| invalid(format!("lead time '{}' must be positive, got {}", name, days)))?;
            lead_times.push(LeadTime {
                name: name.clone(),
                days,
            });
        }
        lead_times.sort_by(|a, b| a.days.cmp(&b.days).then_with(|| a.name.cmp(&b.name)));

        if spec.place_code_initial.is_empty() {
            return Err(invalid("place_code_initial must not be empty".to_string()));
        }
        let placecode_len = usize::try_from(spec.placecode_len)
            .ok()
            .filter(|&len| len >= spec.place_code_initial.len())
            .ok_or_else(|| {
                invalid(format!(
                    "placecode_len {} is shorter than place code prefix '{}'",
                    spec.placecode_len, spec.place_code_initial
                ))
            })?;

        let admin_level = u8::try_from(spec.admin_level)
            .ok()
            .filter(|&l| l > 0)
            .ok_or_else(|| invalid(format!("admin_level must be positive, got {}", spec.admin_level)))?;
        let levels = validate_levels(&spec.levels, admin_level).map_err(invalid)?;

        if spec.exposure_sources.is_empty() {
            return Err(invalid("at least one exposure source is required".to_string()));
        }
        let exposure_sources = convert_sources(&spec.exposure_sources).map_err(invalid)?;
        let subpopulation_sources = convert_sources(&spec.subpopulation_sources).map_err(invalid)?;
        if let Some(clash) = subpopulation_sources
            .iter()
            .find(|s| exposure_sources.iter().any(|b| b.name == s.name))
        {
            return Err(invalid(format!(
                "exposure source name '{}' is used for both population and sub-population",
                clash.name
            )));
        }

        let focus_areas = spec
            .focus_areas
            .map(|codes| codes.into_iter().collect::<BTreeSet<_>>());

        Ok(Self {
            code,
            admin_level,
            levels,
            place_code_initial: spec.place_code_initial,
            placecode_len,
            lead_times,
            thresholds: spec.trigger_levels,
            return_period: spec.return_period,
            mock: spec.mock,
            if_mock_trigger: spec.if_mock_trigger,
            notify_email: spec.notify_email,
            exposure_sources,
            subpopulation_sources,
            focus_areas,
        })
    }

    pub fn code(&self) -> &CountryCode {
        &self.code
    }

    /// Depth of the finest admin level evaluated, e.g. 3 or 4.
    pub fn admin_level(&self) -> u8 {
        self.admin_level
    }

    /// Admin levels from finest to coarsest, always ending at 1.
    pub fn levels(&self) -> &[u8] {
        &self.levels
    }

    pub fn place_code_initial(&self) -> &str {
        &self.place_code_initial
    }

    /// Characters after the prefix in a finest-level place code.
    pub fn placecode_len(&self) -> usize {
        self.placecode_len
    }

    /// Full length of a finest-level place code.
    pub fn finest_place_code_len(&self) -> usize {
        self.place_code_initial.len() + self.placecode_len
    }

    /// Lead times in ascending order of days.
    pub fn lead_times(&self) -> &[LeadTime] {
        &self.lead_times
    }

    pub fn thresholds(&self) -> &TriggerThresholds {
        &self.thresholds
    }

    pub fn return_period(&self) -> ReturnPeriod {
        self.return_period
    }

    /// Replace supplied forecasts with mock forecasts.
    pub fn mock(&self) -> bool {
        self.mock
    }

    /// Force `triggered = true` for otherwise untriggered units.
    pub fn if_mock_trigger(&self) -> bool {
        self.if_mock_trigger
    }

    pub fn notify_email(&self) -> bool {
        self.notify_email
    }

    pub fn exposure_sources(&self) -> &[ExposureSource] {
        &self.exposure_sources
    }

    pub fn subpopulation_sources(&self) -> &[ExposureSource] {
        &self.subpopulation_sources
    }

    /// Base sources followed by sub-population sources.
    pub fn all_exposure_sources(&self) -> impl Iterator<Item = &ExposureSource> {
        self.exposure_sources.iter().chain(self.subpopulation_sources.iter())
    }

    /// Returns `true` if `place_code` is in scope for evaluation.
    /// Without a focus list every unit is in scope.
    pub fn in_focus(&self, place_code: &str) -> bool {
        self.focus_areas
            .as_ref()
            .map(|areas| areas.contains(place_code))
            .unwrap_or(true)
    }

    pub fn has_focus_areas(&self) -> bool {
        self.focus_areas.is_some()
    }
}

fn validate_levels(levels: &[i64], admin_level: u8) -> Result<Vec<u8>, String> {
    let converted: Vec<u8> = levels
        .iter()
        .map(|&l| u8::try_from(l).ok().filter(|&l| l > 0))
        .collect::<Option<_>>()
        .ok_or_else(|| format!("admin levels must be positive integers, got {:?}", levels))?;

    match (converted.first(), converted.last()) {
        (Some(&first), Some(&1)) if first == admin_level => {}
        _ => {
            return Err(format!(
                "levels {:?} must start at admin_level {} and end at 1",
                levels, admin_level
            ));
        }
    }
    if converted.windows(2).any(|w| w[0] <= w[1]) {
        return Err(format!("levels {:?} must be strictly decreasing", levels));
    }
    Ok(converted)
}

fn convert_sources(specs: &BTreeMap<String, ExposureSourceSpec>) -> Result<Vec<ExposureSource>, String> {
    specs
        .iter()
        .map(|(name, spec)| {
            if name.trim().is_empty() {
                return Err("exposure source names must not be empty".to_string());
            }
            let dataset = match spec {
                ExposureSourceSpec::Raster { source, raster_value } => {
                    if !raster_value.is_finite() || *raster_value <= 0.0 {
                        return Err(format!(
                            "raster_value for '{}' must be a positive number, got {}",
                            name, raster_value
                        ));
                    }
                    ExposureDataset::Raster {
                        raster: source.clone(),
                        raster_value: *raster_value,
                    }
                }
                ExposureSourceSpec::Attribute { source, col_name } => ExposureDataset::Attribute {
                    table: source.clone(),
                    column: col_name.clone(),
                },
            };
            Ok(ExposureSource {
                name: name.clone(),
                dataset,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered set of validated country profiles.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRegistry {
    profiles: Vec<CountryProfile>,
}

impl CountryRegistry {
    /// Validates every spec, preserving input order. Duplicate codes are
    /// rejected.
    pub fn from_specs(specs: Vec<CountryProfileSpec>) -> Result<Self, ProfileError> {
        let mut seen = HashSet::new();
        let mut profiles = Vec::with_capacity(specs.len());
        for spec in specs {
            let profile = CountryProfile::from_spec(spec)?;
            if !seen.insert(profile.code().clone()) {
                return Err(ProfileError::InvalidProfile {
                    country: profile.code().to_string(),
                    reason: "duplicate country profile".to_string(),
                });
            }
            profiles.push(profile);
        }
        Ok(Self { profiles })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        let document: ProfileDocument =
            toml::from_str(text).map_err(|e| ProfileError::Parse(e.to_string()))?;
        Self::from_specs(document.countries)
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|e| ProfileError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Registry built from the profiles embedded in the binary.
    pub fn builtin() -> Result<Self, ProfileError> {
        Self::from_toml_str(BUILTIN_PROFILES)
    }

    /// Looks up a profile by ISO3 code.
    pub fn get_profile(&self, code: &str) -> Result<&CountryProfile, ProfileError> {
        self.profiles
            .iter()
            .find(|p| p.code().as_str() == code)
            .ok_or_else(|| ProfileError::UnknownCountry(code.to_string()))
    }

    /// Country codes in configuration order.
    pub fn list_countries(&self) -> Vec<&CountryCode> {
        self.profiles.iter().map(|p| p.code()).collect()
    }

    pub fn profiles(&self) -> &[CountryProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Keeps only the listed countries, in registry order. An empty list
    /// keeps everything; an unknown code is an error.
    pub fn restrict_to(&self, codes: &[String]) -> Result<Self, ProfileError> {
        if codes.is_empty() {
            return Ok(self.clone());
        }
        for code in codes {
            self.get_profile(code)?;
        }
        let profiles = self
            .profiles
            .iter()
            .filter(|p| codes.iter().any(|c| c == p.code().as_str()))
            .cloned()
            .collect();
        Ok(Self { profiles })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
