/// Population exposure for triggered administrative units.
///
/// Submodules:
/// - `geometry`: unit boundaries and point containment.
/// - `raster`: materialised raster grids, attribute tables and the
///   `ExposureCatalog` the engine reads them through.
/// - `aggregate`: per-unit, per-source exposure counts.

pub mod aggregate;
pub mod geometry;
pub mod raster;

pub use aggregate::{ExposureOutcome, ExposureValue, aggregate_exposure};
pub use raster::{AttributeTable, ExposureCatalog, InMemoryCatalog, Raster};
