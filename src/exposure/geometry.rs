/// Administrative boundary geometry.
///
/// Unit footprints are `geo::MultiPolygon<f64>` in the same planar
/// coordinate system as the exposure rasters (usually WGS84 lon/lat).
/// Bundles carry them as `{ "polygons": [ { "exterior": [[x, y], ...],
/// "holes": [...] } ] }`; rings may be open or closed.
///
/// # Boundary rule
/// Points strictly inside or outside are decided by `geo`. A point lying
/// exactly on a boundary falls back to the half-open crossing test (an
/// edge counts when `(y_i > y) != (y_j > y)`), so for polygons that tile
/// the plane a point on a shared edge belongs to exactly one of them and
/// raster cells on a boundary are never counted twice.

use geo::coordinate_position::CoordPos;
use geo::{BoundingRect, Coord, CoordinatePosition, LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Deserializer};

/// Footprint of an administrative unit.
pub type Geometry = MultiPolygon<f64>;

/// A footprint with no polygons. Contains nothing.
pub fn empty() -> Geometry {
    MultiPolygon::new(Vec::new())
}

/// Single axis-aligned rectangle, handy for tests and gridded boundaries.
pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Geometry {
    let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
    MultiPolygon::new(vec![rect.to_polygon()])
}

/// Returns `true` if `point` lies inside `geometry` under the boundary
/// rule above.
pub fn contains(geometry: &Geometry, point: Coord<f64>) -> bool {
    match geometry.coordinate_position(&point) {
        CoordPos::Inside => true,
        CoordPos::Outside => false,
        CoordPos::OnBoundary => geometry.0.iter().any(|polygon| {
            crosses_odd(polygon.exterior(), point)
                && !polygon.interiors().iter().any(|hole| crosses_odd(hole, point))
        }),
    }
}

/// Bounding rectangle over all polygons, or `None` for an empty footprint.
pub fn bounds(geometry: &Geometry) -> Option<Rect<f64>> {
    geometry.bounding_rect()
}

/// Half-open even-odd crossing test against one closed ring.
fn crosses_odd(ring: &LineString<f64>, point: Coord<f64>) -> bool {
    let mut inside = false;
    for edge in ring.lines() {
        let (a, b) = (edge.start, edge.end);
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

// ---------------------------------------------------------------------------
// Bundle form
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct BoundaryRecord {
    #[serde(default)]
    polygons: Vec<PolygonRecord>,
}

#[derive(Debug, Deserialize)]
struct PolygonRecord {
    exterior: Vec<[f64; 2]>,
    #[serde(default)]
    holes: Vec<Vec<[f64; 2]>>,
}

impl From<BoundaryRecord> for Geometry {
    fn from(record: BoundaryRecord) -> Self {
        let polygons = record
            .polygons
            .into_iter()
            .filter(|p| p.exterior.len() >= 3)
            .map(|p| {
                let holes = p.holes.into_iter().map(LineString::from).collect();
                Polygon::new(LineString::from(p.exterior), holes)
            })
            .collect();
        MultiPolygon::new(polygons)
    }
}

/// `deserialize_with` hook for unit footprints in bundle form.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Geometry, D::Error>
where
    D: Deserializer<'de>,
{
    BoundaryRecord::deserialize(deserializer).map(Geometry::from)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
