use serde::{Deserialize, Serialize};

/// Closed coordinate ring, `[lon, lat]` per vertex, GeoJSON winding.
pub type Ring = Vec<[f64; 2]>;

/// Parcel outline as delivered by the cadastral provider. The serde layout
/// matches the GeoJSON `geometry` member exactly, so provider payloads
/// deserialize directly into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum ParcelGeometry {
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl ParcelGeometry {
    /// Lenient parse of a GeoJSON geometry value. Anything that is not a
    /// polygonal geometry (points, lines, malformed shapes) yields `None`.
    pub fn from_geojson(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Outer ring of every polygon in the geometry.
    pub fn outer_rings(&self) -> impl Iterator<Item = &Ring> {
        let slices: Vec<&Ring> = match self {
            ParcelGeometry::Polygon(rings) => rings.first().into_iter().collect(),
            ParcelGeometry::MultiPolygon(polys) => {
                polys.iter().filter_map(|rings| rings.first()).collect()
            }
        };
        slices.into_iter()
    }

    /// All rings, outer and holes alike.
    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        let slices: Vec<&Ring> = match self {
            ParcelGeometry::Polygon(rings) => rings.iter().collect(),
            ParcelGeometry::MultiPolygon(polys) => polys.iter().flatten().collect(),
        };
        slices.into_iter()
    }

    /// Whether there is anything drawable here: at least one outer ring with
    /// three or more finite vertices.
    pub fn is_renderable(&self) -> bool {
        self.outer_rings().any(|ring| {
            ring.len() >= 3
                && ring
                    .iter()
                    .all(|[x, y]| x.is_finite() && y.is_finite())
        })
    }

    /// `[min_lon, min_lat, max_lon, max_lat]` over every vertex.
    pub fn bounds(&self) -> Option<[f64; 4]> {
        let mut bounds: Option<[f64; 4]> = None;
        for ring in self.rings() {
            for &[x, y] in ring {
                if !x.is_finite() || !y.is_finite() {
                    continue;
                }
                bounds = Some(match bounds {
                    None => [x, y, x, y],
                    Some([min_x, min_y, max_x, max_y]) => {
                        [min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y)]
                    }
                });
            }
        }
        bounds
    }

    /// Area-weighted centroid over the outer rings, used to position label
    /// and marker artifacts. Falls back to the vertex mean when the shoelace
    /// area degenerates (collinear or duplicate vertices).
    pub fn centroid(&self) -> Option<[f64; 2]> {
        let mut area_sum = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;

        for ring in self.outer_rings() {
            if ring.len() < 3 {
                continue;
            }
            for i in 0..ring.len() {
                let [x0, y0] = ring[i];
                let [x1, y1] = ring[(i + 1) % ring.len()];
                if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
                    return None;
                }
                let cross = x0 * y1 - x1 * y0;
                area_sum += cross;
                cx += (x0 + x1) * cross;
                cy += (y0 + y1) * cross;
            }
        }

        if area_sum.abs() > f64::EPSILON {
            let factor = 1.0 / (3.0 * area_sum);
            return Some([cx * factor, cy * factor]);
        }

        // Degenerate area: average the outer-ring vertices instead.
        let mut count = 0usize;
        let (mut sx, mut sy) = (0.0, 0.0);
        for ring in self.outer_rings() {
            for &[x, y] in ring {
                if x.is_finite() && y.is_finite() {
                    sx += x;
                    sy += y;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return None;
        }
        Some([sx / count as f64, sy / count as f64])
    }

    /// Even-odd point-in-polygon test across every ring, so holes punch out
    /// naturally. Used for client-side hit testing of tracked parcels.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        let polygon_hit = |rings: &[Ring]| {
            let mut inside = false;
            for ring in rings {
                if ring.len() < 3 {
                    continue;
                }
                let mut j = ring.len() - 1;
                for i in 0..ring.len() {
                    let [xi, yi] = ring[i];
                    let [xj, yj] = ring[j];
                    if ((yi > lat) != (yj > lat))
                        && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi
                    {
                        inside = !inside;
                    }
                    j = i;
                }
            }
            inside
        };

        match self {
            ParcelGeometry::Polygon(rings) => polygon_hit(rings),
            ParcelGeometry::MultiPolygon(polys) => polys.iter().any(|rings| polygon_hit(rings)),
        }
    }
}
