/// JSON run bundle reader
///
/// A bundle carries everything one run needs:
///
/// ```json
/// {
///   "countries": {
///     "MWI": {
///       "forecast_issued": "2024-05-01T00:00:00Z",
///       "stations": [ { "station_code": "G1053", "location": { "type": "place_codes", "place_codes": ["MW102"] },
///                       "hydro_order": 3, "probabilities": { "7-day": 0.72 } } ],
///       "units": [ { "place_code": "MW10201", "admin_level": 3, "geometry": { "polygons": [] } } ]
///     }
///   },
///   "rasters": { "population/population_mwi": { "origin_x": 32.0, "origin_y": -9.0, ... } },
///   "tables":  { "mwi_3_population_ubr": { "columns": ["ubr_pop_u18"], "rows": { "MW10201": { "ubr_pop_u18": 1200 } } } }
/// }
/// ```
///
/// Rasters and tables are decoded one entry at a time. An entry that does
/// not decode is still registered in the catalog as malformed, and a
/// structurally valid raster is checked when a source first uses it, so a
/// broken dataset only fails the sources that reference it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::engine::{CountryInput, RunInput};
use crate::exposure::{AttributeTable, InMemoryCatalog, Raster};
use crate::model::CountryCode;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("cannot read run bundle {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed run bundle: {0}")]
    Json(#[from] serde_json::Error),
    #[error("run bundle key '{0}' is not an ISO3 country code")]
    InvalidCountryCode(String),
}

// ============================================================================
// Bundle Structures
// ============================================================================

/// Raw bundle as deserialized. Dataset entries stay undecoded JSON until
/// `into_parts`.
#[derive(Debug, Deserialize)]
pub struct RunBundle {
    #[serde(default)]
    pub countries: BTreeMap<String, CountryInput>,
    #[serde(default)]
    pub rasters: HashMap<String, Value>,
    #[serde(default)]
    pub tables: HashMap<String, Value>,
}

impl RunBundle {
    /// Splits the bundle into engine input and exposure catalog.
    pub fn into_parts(self) -> Result<(RunInput, InMemoryCatalog), IngestError> {
        for code in self.countries.keys() {
            CountryCode::parse(code).map_err(|_| IngestError::InvalidCountryCode(code.clone()))?;
        }

        let mut catalog = InMemoryCatalog::new();
        for (id, value) in self.rasters {
            match serde_json::from_value::<Raster>(value) {
                Ok(raster) => catalog.insert_raster(id, raster),
                Err(e) => {
                    tracing::warn!(dataset = %id, error = %e, "malformed raster in run bundle");
                    catalog.insert_malformed_raster(id, e.to_string());
                }
            }
        }
        for (id, value) in self.tables {
            match serde_json::from_value::<AttributeTable>(value) {
                Ok(table) => catalog.insert_table(id, table),
                Err(e) => {
                    tracing::warn!(dataset = %id, error = %e, "malformed attribute table in run bundle");
                    catalog.insert_malformed_table(id, e.to_string());
                }
            }
        }

        Ok((
            RunInput {
                countries: self.countries,
            },
            catalog,
        ))
    }
}

// ============================================================================
// Readers
// ============================================================================

pub fn parse_bundle(text: &str) -> Result<(RunInput, InMemoryCatalog), IngestError> {
    let bundle: RunBundle = serde_json::from_str(text)?;
    let stations: usize = bundle.countries.values().map(|c| c.stations.len()).sum();
    let units: usize = bundle.countries.values().map(|c| c.units.len()).sum();
    tracing::info!(
        countries = bundle.countries.len(),
        stations,
        units,
        rasters = bundle.rasters.len(),
        tables = bundle.tables.len(),
        "run bundle parsed"
    );
    bundle.into_parts()
}

pub fn load_bundle(path: &Path) -> Result<(RunInput, InMemoryCatalog), IngestError> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_bundle(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::ExposureCatalog;
    use crate::model::StationLocation;

    const BUNDLE: &str = r#"{
        "countries": {
            "MWI": {
                "forecast_issued": "2024-05-01T00:00:00Z",
                "stations": [
                    { "station_code": "G1053",
                      "location": { "type": "place_codes", "place_codes": ["MW102"] },
                      "hydro_order": 3,
                      "probabilities": { "7-day": 0.72 } },
                    { "station_code": "G2001",
                      "location": { "type": "coordinate", "lon": 34.5, "lat": -14.5 } }
                ],
                "units": [
                    { "place_code": "MW10201", "admin_level": 3 }
                ]
            }
        },
        "rasters": {
            "population/population_mwi": {
                "origin_x": 34.0, "origin_y": -14.0,
                "cell_width": 0.5, "cell_height": 0.5,
                "rows": 1, "cols": 2,
                "values": [1.0, 2.0]
            }
        },
        "tables": {
            "mwi_3_population_ubr": {
                "columns": ["ubr_pop_u18"],
                "rows": { "MW10201": { "ubr_pop_u18": 1200.0 } }
            }
        }
    }"#;

    #[test]
    fn test_parse_bundle_builds_input_and_catalog() {
        let (input, catalog) = parse_bundle(BUNDLE).expect("bundle is well-formed");
        let mwi = &input.countries["MWI"];
        assert_eq!(mwi.stations.len(), 2);
        assert_eq!(mwi.stations[0].hydro_order, 3);
        assert_eq!(mwi.stations[1].hydro_order, 0, "hydro_order defaults to 0");
        assert!(matches!(mwi.stations[1].location, StationLocation::Coordinate { .. }));
        assert!(mwi.forecast_issued.is_some());
        assert!(mwi.units[0].geometry.0.is_empty());

        assert!(catalog.raster("population/population_mwi").is_ok());
        let table = catalog.attribute_table("mwi_3_population_ubr").expect("table present");
        assert_eq!(table.value("MW10201", "ubr_pop_u18"), 1200.0);
    }

    #[test]
    fn test_malformed_raster_does_not_sink_the_bundle() {
        let text = r#"{
            "rasters": {
                "population/population_mwi": {
                    "origin_x": 0.0, "origin_y": 1.0, "cell_width": 1.0, "cell_height": 1.0,
                    "rows": 1, "cols": 1, "values": [5.0]
                },
                "population/population_zmb": {
                    "origin_x": 0.0, "origin_y": 1.0, "cell_width": 1.0, "cell_height": 1.0,
                    "rows": 1, "values": [5.0]
                }
            },
            "tables": { "mwi_3_population_ubr": { "columns": "ubr_pop_u18" } }
        }"#;
        let (_, catalog) = parse_bundle(text).expect("one bad dataset must not fail the bundle");

        assert!(catalog.raster("population/population_mwi").is_ok());
        let err = catalog.raster("population/population_zmb").expect_err("raster without cols");
        assert!(err.contains("malformed") && err.contains("cols"), "got: {}", err);
        assert!(catalog.attribute_table("mwi_3_population_ubr").is_err());
    }

    #[test]
    fn test_lowercase_country_key_rejected() {
        let err = parse_bundle(r#"{ "countries": { "mwi": {} } }"#).expect_err("lowercase code");
        assert!(matches!(err, IngestError::InvalidCountryCode(code) if code == "mwi"));
    }

    #[test]
    fn test_malformed_json_reported() {
        let err = parse_bundle("{ \"countries\": [").expect_err("truncated JSON");
        assert!(matches!(err, IngestError::Json(_)));
    }

    #[test]
    fn test_missing_file_reported_with_path() {
        let err = load_bundle(Path::new("/nonexistent/run.json")).expect_err("no such file");
        assert!(err.to_string().contains("/nonexistent/run.json"));
    }
}
