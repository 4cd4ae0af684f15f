//! Run Report Module
//!
//! The run report is what the engine hands to the outside world: the
//! ordered result records plus a diagnostics block describing everything
//! that could not be evaluated. The block is always present, also on
//! partial failure.
//!
//! On disk the report is JSON lines: one `"kind": "result"` line per
//! record, then exactly one `"kind": "diagnostics"` line. Every line
//! carries `schema_version`.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::assemble::{ResultRecord, SCHEMA_VERSION};
use crate::countries::CountryProfile;
use crate::model::{CountryCode, ExposureError, ForecastError, MappingError};

// ============================================================================
// Diagnostics
// ============================================================================

/// What happened to one country during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryDiagnostics {
    pub country: CountryCode,
    /// `false` if the run input had no entry for this country.
    pub input_present: bool,
    pub monitored_units: usize,
    pub unmonitored_units: Vec<String>,
    pub outside_focus_units: usize,
    pub decisions: usize,
    pub triggered_units: usize,
    pub forecast_faults: Vec<ForecastError>,
    pub exposure_failures: Vec<ExposureError>,
    /// Set when the country was abandoned at the mapping phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_error: Option<MappingError>,
    pub stale_forecast: bool,
    pub mock: bool,
    pub if_mock_trigger: bool,
    pub notify_email: bool,
}

impl CountryDiagnostics {
    /// Empty diagnostics carrying the profile's flags.
    pub fn for_profile(profile: &CountryProfile) -> Self {
        Self {
            country: profile.code().clone(),
            input_present: true,
            monitored_units: 0,
            unmonitored_units: Vec::new(),
            outside_focus_units: 0,
            decisions: 0,
            triggered_units: 0,
            forecast_faults: Vec::new(),
            exposure_failures: Vec::new(),
            mapping_error: None,
            stale_forecast: false,
            mock: profile.mock(),
            if_mock_trigger: profile.if_mock_trigger(),
            notify_email: profile.notify_email(),
        }
    }

    pub fn failed(&self) -> bool {
        self.mapping_error.is_some()
    }

    pub fn missing_forecasts(&self) -> usize {
        self.forecast_faults
            .iter()
            .filter(|f| matches!(f, ForecastError::MissingForecast { .. }))
            .count()
    }

    pub fn invalid_forecasts(&self) -> usize {
        self.forecast_faults
            .iter()
            .filter(|f| matches!(f, ForecastError::InvalidForecastValue { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub countries: usize,
    pub failed_countries: usize,
    pub monitored_units: usize,
    pub unmonitored_units: usize,
    pub missing_forecasts: usize,
    pub invalid_forecasts: usize,
    pub exposure_failures: usize,
    pub decisions: usize,
    pub triggered_records: usize,
}

/// Per-run diagnostic summary, countries in registry order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunDiagnostics {
    pub countries: Vec<CountryDiagnostics>,
    pub totals: RunTotals,
}

impl RunDiagnostics {
    pub fn new(countries: Vec<CountryDiagnostics>, records: &[ResultRecord]) -> Self {
        let mut totals = RunTotals {
            countries: countries.len(),
            triggered_records: records.iter().filter(|r| r.triggered).count(),
            ..RunTotals::default()
        };
        for c in &countries {
            totals.failed_countries += usize::from(c.failed());
            totals.monitored_units += c.monitored_units;
            totals.unmonitored_units += c.unmonitored_units.len();
            totals.missing_forecasts += c.missing_forecasts();
            totals.invalid_forecasts += c.invalid_forecasts();
            totals.exposure_failures += c.exposure_failures.len();
            totals.decisions += c.decisions;
        }
        Self { countries, totals }
    }

    pub fn country(&self, code: &str) -> Option<&CountryDiagnostics> {
        self.countries.iter().find(|c| c.country.as_str() == code)
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub records: Vec<ResultRecord>,
    pub diagnostics: RunDiagnostics,
}

impl RunReport {
    pub fn new(generated_at: DateTime<Utc>, records: Vec<ResultRecord>, diagnostics: RunDiagnostics) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at,
            records,
            diagnostics,
        }
    }

    pub fn triggered(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.iter().filter(|r| r.triggered)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to serialize report line: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ResultLine<'a> {
    kind: &'static str,
    schema_version: u32,
    #[serde(flatten)]
    record: &'a ResultRecord,
}

#[derive(Serialize)]
struct DiagnosticsLine<'a> {
    kind: &'static str,
    schema_version: u32,
    generated_at: &'a DateTime<Utc>,
    #[serde(flatten)]
    diagnostics: &'a RunDiagnostics,
}

/// Writes the report as JSON lines, diagnostics last.
pub fn write_json_lines<W: Write>(report: &RunReport, mut writer: W) -> Result<(), ReportError> {
    for record in &report.records {
        let line = ResultLine {
            kind: "result",
            schema_version: report.schema_version,
            record,
        };
        serde_json::to_writer(&mut writer, &line)?;
        writer.write_all(b"\n")?;
    }

    let line = DiagnosticsLine {
        kind: "diagnostics",
        schema_version: report.schema_version,
        generated_at: &report.generated_at,
        diagnostics: &report.diagnostics,
    };
    serde_json::to_writer(&mut writer, &line)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

// ============================================================================
// Console Summary
// ============================================================================

pub fn print_summary(report: &RunReport) {
    let totals = &report.diagnostics.totals;

    println!();
    println!("========================================");
    println!("FLOOD TRIGGER RUN SUMMARY");
    println!("========================================");
    println!("Generated: {}", report.generated_at.to_rfc3339());
    println!(
        "Countries: {} ({} failed)",
        totals.countries, totals.failed_countries
    );
    println!(
        "Units:     {} monitored, {} unmonitored",
        totals.monitored_units, totals.unmonitored_units
    );
    println!(
        "Records:   {} ({} triggered)",
        report.records.len(),
        totals.triggered_records
    );

    for country in &report.diagnostics.countries {
        let mut flags = Vec::new();
        if country.mock {
            flags.push("mock");
        }
        if country.if_mock_trigger {
            flags.push("forced triggers");
        }
        if country.stale_forecast {
            flags.push("STALE FORECAST");
        }
        if !country.input_present {
            flags.push("no input");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };

        match &country.mapping_error {
            Some(err) => println!("  {} ✗ {}{}", country.country, err, flags),
            None => println!(
                "  {} ✓ {} triggered unit(s), {} missing / {} invalid forecast(s), {} exposure failure(s){}",
                country.country,
                country.triggered_units,
                country.missing_forecasts(),
                country.invalid_forecasts(),
                country.exposure_failures.len(),
                flags
            ),
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::TriggerBand;
    use crate::countries::CountryRegistry;
    use crate::model::ReturnPeriod;
    use chrono::TimeZone;

    fn record(place_code: &str, triggered: bool) -> ResultRecord {
        ResultRecord {
            country: CountryCode::parse("MWI").expect("valid code"),
            place_code: place_code.to_string(),
            admin_level: 3,
            lead_time: "7-day".to_string(),
            lead_time_days: 7,
            station_code: "G1".to_string(),
            return_period: ReturnPeriod::default(),
            probability: if triggered { 0.9 } else { 0.1 },
            band: if triggered { TriggerBand::Maximum } else { TriggerBand::None },
            triggered,
            forced_trigger: false,
            exposure: None,
        }
    }

    fn diagnostics() -> CountryDiagnostics {
        let registry = CountryRegistry::builtin().expect("built-in profiles must validate");
        let mut mwi = CountryDiagnostics::for_profile(registry.get_profile("MWI").expect("MWI present"));
        mwi.monitored_units = 2;
        mwi.unmonitored_units = vec!["MW10301".to_string()];
        mwi.forecast_faults.push(ForecastError::MissingForecast {
            country: mwi.country.clone(),
            place_code: "MW10201".to_string(),
            lead_time: "3-day".to_string(),
            station_code: "G2".to_string(),
        });
        mwi
    }

    fn report() -> RunReport {
        let records = vec![record("MW10201", false), record("MW10202", true)];
        let diagnostics = RunDiagnostics::new(vec![diagnostics()], &records);
        RunReport::new(Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap(), records, diagnostics)
    }

    #[test]
    fn test_totals_sum_country_diagnostics() {
        let report = report();
        let totals = &report.diagnostics.totals;
        assert_eq!(totals.countries, 1);
        assert_eq!(totals.monitored_units, 2);
        assert_eq!(totals.unmonitored_units, 1);
        assert_eq!(totals.missing_forecasts, 1);
        assert_eq!(totals.invalid_forecasts, 0);
        assert_eq!(totals.triggered_records, 1);
        assert_eq!(report.triggered().count(), 1);
    }

    #[test]
    fn test_json_lines_put_diagnostics_last() {
        let report = report();
        let mut buffer = Vec::new();
        write_json_lines(&report, &mut buffer).expect("writing to a Vec cannot fail");

        let text = String::from_utf8(buffer).expect("utf-8 output");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("each line is a JSON object"))
            .collect();

        assert_eq!(lines.len(), 3, "two records plus one diagnostics line");
        assert_eq!(lines[0]["kind"], "result");
        assert_eq!(lines[0]["place_code"], "MW10201");
        assert_eq!(lines[0]["schema_version"], 1);
        assert_eq!(lines[1]["place_code"], "MW10202");
        assert_eq!(lines[2]["kind"], "diagnostics");
        assert_eq!(lines[2]["totals"]["missing_forecasts"], 1);
        assert_eq!(lines[2]["countries"][0]["unmonitored_units"][0], "MW10301");
        assert_eq!(
            lines[2]["countries"][0]["forecast_faults"][0]["kind"],
            "missing_forecast"
        );
    }

    #[test]
    fn test_diagnostics_line_written_for_empty_report() {
        let report = RunReport::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap(),
            Vec::new(),
            RunDiagnostics::default(),
        );
        let mut buffer = Vec::new();
        write_json_lines(&report, &mut buffer).expect("writing to a Vec cannot fail");
        let text = String::from_utf8(buffer).expect("utf-8 output");
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"kind\":\"diagnostics\""));
    }

    #[test]
    fn test_failed_country_counted() {
        let mut mwi = diagnostics();
        mwi.mapping_error = Some(MappingError::AmbiguousMapping {
            country: mwi.country.clone(),
            place_code: "MW10201".to_string(),
            candidates: vec!["G1".to_string(), "G1".to_string()],
        });
        let diagnostics = RunDiagnostics::new(vec![mwi], &[]);
        assert_eq!(diagnostics.totals.failed_countries, 1);
        assert!(diagnostics.country("MWI").expect("MWI listed").failed());
        assert!(diagnostics.country("ZMB").is_none());
    }
}
