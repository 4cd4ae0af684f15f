// Loading profiles and engine configuration from disk.

use std::io::Write;

use tempfile::NamedTempFile;

use ibf_flood_engine::config::{ConfigError, EngineConfig};
use ibf_flood_engine::countries::CountryRegistry;
use ibf_flood_engine::model::ProfileError;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

const TWO_PROFILES: &str = r#"
[[country]]
code = "SSD"
place_code_initial = "SS"
placecode_len = 6
admin_level = 3
levels = [3, 2, 1]
lead_times = { "7-day" = 7 }
trigger_levels = { minimum = 0.6, medium = 0.7, maximum = 0.8 }

[country.exposure_sources.population]
source = "population/ssd_ppp_2020_adjusted"
raster_value = 1.0

[[country]]
code = "ETH"
place_code_initial = "ETH"
return_period = "rl10"
placecode_len = 6
admin_level = 3
levels = [3, 2, 1]
lead_times = { "7-day" = 7 }
trigger_levels = { minimum = 0.6, medium = 0.7, maximum = 0.8 }

[country.exposure_sources.population]
source = "population/hrsl_eth_pop_resized_100"
raster_value = 1.0
"#;

#[test]
fn test_profiles_file_keeps_insertion_order() {
    let file = write_temp(TWO_PROFILES);
    let registry = CountryRegistry::load(file.path()).expect("profiles load");
    let codes: Vec<_> = registry.list_countries().iter().map(|c| c.as_str()).collect();
    assert_eq!(codes, ["SSD", "ETH"], "configuration order, not sorted");
    assert_eq!(
        registry.get_profile("ETH").expect("ETH present").return_period().years(),
        10
    );
}

#[test]
fn test_malformed_profile_fails_at_load() {
    let broken = TWO_PROFILES.replace("minimum = 0.6, medium = 0.7", "minimum = 0.75, medium = 0.7");
    let file = write_temp(&broken);
    let err = CountryRegistry::load(file.path()).expect_err("non-monotonic thresholds must fail");
    assert!(matches!(err, ProfileError::InvalidProfile { .. }));
}

#[test]
fn test_engine_config_points_at_external_profiles() {
    let profiles = write_temp(TWO_PROFILES);
    let config_text = format!(
        r#"
        countries = ["ETH"]
        profiles = "{}"
        max_forecast_age_hours = 24

        [logging]
        level = "debug"
        timestamps = false
        "#,
        profiles.path().display()
    );
    let config = EngineConfig::from_toml_str(&config_text, "inline").expect("valid config");
    assert_eq!(config.max_forecast_age_hours, 24);
    assert!(!config.logging.timestamps);

    let registry = config.registry().expect("external profiles load");
    assert_eq!(registry.len(), 1);
    assert!(registry.get_profile("SSD").is_err());
}

#[test]
fn test_missing_profiles_file_is_a_config_error() {
    let config = EngineConfig {
        profiles: Some("/nonexistent/countries.toml".into()),
        ..EngineConfig::default()
    };
    let err = config.registry().expect_err("missing file must fail");
    assert!(matches!(err, ConfigError::Profiles(ProfileError::Io { .. })));
}

#[test]
fn test_sample_engine_config_parses() {
    let text = include_str!("../config/engine.toml");
    let config = EngineConfig::from_toml_str(text, "config/engine.toml").expect("sample config is valid");
    assert_eq!(config.countries, ["PHL"]);
    let registry = config.registry().expect("built-in registry");
    assert!(registry.get_profile("PHL").expect("PHL present").mock());
}

#[test]
fn test_negative_forecast_age_rejected() {
    let err = EngineConfig::from_toml_str("max_forecast_age_hours = -1", "inline")
        .expect_err("negative age must fail");
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}
