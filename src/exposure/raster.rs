/// In-memory exposure datasets.
///
/// Raster and attribute-table I/O happen outside the engine; by the time a
/// run starts every dataset is materialised and reachable through an
/// `ExposureCatalog`. A dataset the catalog cannot produce, or one that is
/// internally inconsistent, surfaces as `ExposureSourceUnavailable` for the
/// sources that reference it.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use geo::{Coord, Rect};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Raster grid
// ---------------------------------------------------------------------------

/// North-up raster grid.
///
/// `origin_x`/`origin_y` is the north-west corner; cell `(row, col)` spans
/// `[origin_x + col*w, origin_x + (col+1)*w]` horizontally and
/// `[origin_y - (row+1)*h, origin_y - row*h]` vertically. `values` is
/// row-major, `rows * cols` long.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Raster {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub nodata: Option<f64>,
    pub values: Vec<f64>,
}

impl Raster {
    /// Checks the grid is internally consistent. Returns the reason if not.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.cell_width.is_finite() && self.cell_width > 0.0)
            || !(self.cell_height.is_finite() && self.cell_height > 0.0)
        {
            return Err(format!(
                "cell size must be positive, got {}x{}",
                self.cell_width, self.cell_height
            ));
        }
        if !self.origin_x.is_finite() || !self.origin_y.is_finite() {
            return Err("origin must be finite".to_string());
        }
        let expected = self.rows.checked_mul(self.cols);
        if expected != Some(self.values.len()) {
            return Err(format!(
                "expected {}x{} values, found {}",
                self.rows,
                self.cols,
                self.values.len()
            ));
        }
        Ok(())
    }

    /// Centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        Coord {
            x: self.origin_x + (col as f64 + 0.5) * self.cell_width,
            y: self.origin_y - (row as f64 + 0.5) * self.cell_height,
        }
    }

    /// Contributing value of a cell: nodata, non-finite and negative cells
    /// contribute nothing.
    pub fn cell_value(&self, row: usize, col: usize) -> Option<f64> {
        let value = *self.values.get(row * self.cols + col)?;
        if !value.is_finite() || value < 0.0 || self.nodata == Some(value) {
            return None;
        }
        Some(value)
    }

    /// Inclusive row and column ranges whose cells may intersect `bounds`.
    /// `None` when the rectangle lies entirely outside the grid.
    pub fn window(&self, bounds: Rect<f64>) -> Option<(RangeInclusive<usize>, RangeInclusive<usize>)> {
        if self.rows == 0 || self.cols == 0 {
            return None;
        }
        let (min, max) = (bounds.min(), bounds.max());
        let col_lo = ((min.x - self.origin_x) / self.cell_width).floor();
        let col_hi = ((max.x - self.origin_x) / self.cell_width).floor();
        let row_lo = ((self.origin_y - max.y) / self.cell_height).floor();
        let row_hi = ((self.origin_y - min.y) / self.cell_height).floor();

        let last_col = (self.cols - 1) as f64;
        let last_row = (self.rows - 1) as f64;
        if col_hi < 0.0 || row_hi < 0.0 || col_lo > last_col || row_lo > last_row {
            return None;
        }
        let clamp = |v: f64, last: f64| v.max(0.0).min(last) as usize;
        Some((
            clamp(row_lo, last_row)..=clamp(row_hi, last_row),
            clamp(col_lo, last_col)..=clamp(col_hi, last_col),
        ))
    }
}

// ---------------------------------------------------------------------------
// Attribute tables
// ---------------------------------------------------------------------------

/// Per-place-code numeric attributes, e.g. sub-population counts.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AttributeTable {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: HashMap<String, HashMap<String, f64>>,
}

impl AttributeTable {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Value for a unit; absent units and blank cells count 0.
    pub fn value(&self, place_code: &str, column: &str) -> f64 {
        self.rows
            .get(place_code)
            .and_then(|row| row.get(column))
            .copied()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Lookup of materialised exposure datasets by identifier.
///
/// Implementations must be shareable across the aggregation worker pool.
pub trait ExposureCatalog: Sync {
    fn raster(&self, id: &str) -> Result<&Raster, String>;
    fn attribute_table(&self, id: &str) -> Result<&AttributeTable, String>;
}

/// Catalog backed by hash maps, filled by the ingest layer or by tests.
///
/// An entry that arrived malformed is kept with its reason, so lookups
/// for it fail while every other dataset stays usable.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    rasters: HashMap<String, Result<Raster, String>>,
    tables: HashMap<String, Result<AttributeTable, String>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raster(&mut self, id: impl Into<String>, raster: Raster) {
        self.rasters.insert(id.into(), Ok(raster));
    }

    pub fn insert_table(&mut self, id: impl Into<String>, table: AttributeTable) {
        self.tables.insert(id.into(), Ok(table));
    }

    /// Registers a raster that could not be decoded.
    pub fn insert_malformed_raster(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        self.rasters.insert(id.into(), Err(reason.into()));
    }

    /// Registers an attribute table that could not be decoded.
    pub fn insert_malformed_table(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        self.tables.insert(id.into(), Err(reason.into()));
    }

    pub fn with_raster(mut self, id: impl Into<String>, raster: Raster) -> Self {
        self.insert_raster(id, raster);
        self
    }

    pub fn with_table(mut self, id: impl Into<String>, table: AttributeTable) -> Self {
        self.insert_table(id, table);
        self
    }
}

impl ExposureCatalog for InMemoryCatalog {
    fn raster(&self, id: &str) -> Result<&Raster, String> {
        let raster = match self.rasters.get(id) {
            None => return Err(format!("raster '{}' not found", id)),
            Some(Err(reason)) => return Err(format!("raster '{}' is malformed: {}", id, reason)),
            Some(Ok(raster)) => raster,
        };
        raster.validate().map_err(|reason| format!("raster '{}' is corrupt: {}", id, reason))?;
        Ok(raster)
    }

    fn attribute_table(&self, id: &str) -> Result<&AttributeTable, String> {
        match self.tables.get(id) {
            None => Err(format!("attribute table '{}' not found", id)),
            Some(Err(reason)) => Err(format!("attribute table '{}' is malformed: {}", id, reason)),
            Some(Ok(table)) => Ok(table),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x3 grid of unit cells covering [0,3]x[0,3].
    fn grid(values: Vec<f64>) -> Raster {
        Raster {
            origin_x: 0.0,
            origin_y: 3.0,
            cell_width: 1.0,
            cell_height: 1.0,
            rows: 3,
            cols: 3,
            nodata: Some(-9999.0),
            values,
        }
    }

    #[test]
    fn test_cell_centers_follow_north_up_layout() {
        let raster = grid(vec![0.0; 9]);
        assert_eq!(raster.cell_center(0, 0), Coord { x: 0.5, y: 2.5 });
        assert_eq!(raster.cell_center(2, 1), Coord { x: 1.5, y: 0.5 });
    }

    #[test]
    fn test_nodata_and_negative_cells_do_not_contribute() {
        let raster = grid(vec![1.0, -9999.0, -2.0, f64::NAN, 4.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(raster.cell_value(0, 0), Some(1.0));
        assert_eq!(raster.cell_value(0, 1), None);
        assert_eq!(raster.cell_value(0, 2), None);
        assert_eq!(raster.cell_value(1, 0), None);
        assert_eq!(raster.cell_value(1, 1), Some(4.0));
    }

    #[test]
    fn test_window_clamps_to_grid() {
        let raster = grid(vec![0.0; 9]);
        let rect = |lo: f64, hi: f64| Rect::new(Coord { x: lo, y: lo }, Coord { x: hi, y: hi });
        let (rows, cols) = raster.window(rect(0.2, 1.2)).expect("box overlaps grid");
        assert_eq!((rows, cols), (1..=2, 0..=1));

        let (rows, cols) = raster.window(rect(-10.0, 10.0)).expect("box covers grid");
        assert_eq!((rows, cols), (0..=2, 0..=2));

        assert!(raster.window(rect(5.0, 6.0)).is_none());
    }

    #[test]
    fn test_validate_rejects_inconsistent_grid() {
        assert!(grid(vec![0.0; 9]).validate().is_ok());
        assert!(grid(vec![0.0; 8]).validate().is_err());
        let mut raster = grid(vec![0.0; 9]);
        raster.cell_width = 0.0;
        assert!(raster.validate().is_err());
    }

    #[test]
    fn test_catalog_reports_missing_and_corrupt_rasters() {
        let catalog = InMemoryCatalog::new()
            .with_raster("good", grid(vec![1.0; 9]))
            .with_raster("short", grid(vec![1.0; 4]));
        assert!(catalog.raster("good").is_ok());
        assert!(catalog.raster("short").unwrap_err().contains("corrupt"));
        assert!(catalog.raster("absent").unwrap_err().contains("not found"));
    }

    #[test]
    fn test_malformed_entries_fail_only_their_own_lookup() {
        let mut catalog = InMemoryCatalog::new().with_raster("good", grid(vec![1.0; 9]));
        catalog.insert_malformed_raster("broken", "missing field `cols`");
        catalog.insert_malformed_table("ubr", "invalid type: string, expected a map");

        assert!(catalog.raster("good").is_ok());
        let err = catalog.raster("broken").unwrap_err();
        assert!(err.contains("malformed") && err.contains("cols"), "got: {}", err);
        assert!(catalog.attribute_table("ubr").unwrap_err().contains("malformed"));
    }

    #[test]
    fn test_attribute_table_defaults_to_zero() {
        let table = AttributeTable {
            columns: vec!["ubr_pop_u18".to_string()],
            rows: HashMap::from([(
                "MW10201".to_string(),
                HashMap::from([("ubr_pop_u18".to_string(), 120.0)]),
            )]),
        };
        assert!(table.has_column("ubr_pop_u18"));
        assert!(!table.has_column("ubr_pop_65"));
        assert_eq!(table.value("MW10201", "ubr_pop_u18"), 120.0);
        assert_eq!(table.value("MW99999", "ubr_pop_u18"), 0.0);
    }
}
