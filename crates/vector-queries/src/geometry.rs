//! Planar vector geometries in GeoJSON layout.

use cube_common::BoundingBox;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Geometry of a feature. Coordinates are `[x, y]` in the layer's CRS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: [f64; 2],
    },

    LineString {
        coordinates: Vec<[f64; 2]>,
    },

    /// Linear rings; the first is the exterior, the rest are holes.
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },

    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
}

/// Geometry type of a feature or a whole layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPolygon,
    /// Mixed or unknown types.
    Unknown,
}

impl GeometryType {
    /// Whether zones of this type can be aggregated over.
    pub fn is_areal(&self) -> bool {
        matches!(self, GeometryType::Polygon | GeometryType::MultiPolygon)
    }

    /// Common type of a layer with features of types `a` and `b`.
    ///
    /// Polygons and multipolygons promote to multipolygon.
    pub fn merge(a: GeometryType, b: GeometryType) -> GeometryType {
        use GeometryType::*;
        match (a, b) {
            (x, y) if x == y => x,
            (Polygon, MultiPolygon) | (MultiPolygon, Polygon) => MultiPolygon,
            _ => Unknown,
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

impl Geometry {
    /// Create a rectangular polygon.
    pub fn rect(bbox: &BoundingBox) -> Self {
        Geometry::Polygon {
            coordinates: vec![bbox.to_ring()],
        }
    }

    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point { .. } => GeometryType::Point,
            Geometry::LineString { .. } => GeometryType::LineString,
            Geometry::Polygon { .. } => GeometryType::Polygon,
            Geometry::MultiPolygon { .. } => GeometryType::MultiPolygon,
        }
    }

    fn vertices(&self) -> Box<dyn Iterator<Item = &[f64; 2]> + '_> {
        match self {
            Geometry::Point { coordinates } => Box::new(std::iter::once(coordinates)),
            Geometry::LineString { coordinates } => Box::new(coordinates.iter()),
            Geometry::Polygon { coordinates } => Box::new(coordinates.iter().flatten()),
            Geometry::MultiPolygon { coordinates } => {
                Box::new(coordinates.iter().flatten().flatten())
            }
        }
    }

    /// Segments of all lines and rings.
    fn segments(&self) -> Vec<([f64; 2], [f64; 2])> {
        let rings: Vec<&Vec<[f64; 2]>> = match self {
            Geometry::Point { .. } => Vec::new(),
            Geometry::LineString { coordinates } => vec![coordinates],
            Geometry::Polygon { coordinates } => coordinates.iter().collect(),
            Geometry::MultiPolygon { coordinates } => coordinates.iter().flatten().collect(),
        };
        rings
            .into_iter()
            .flat_map(|ring| ring.windows(2).map(|w| (w[0], w[1])))
            .collect()
    }

    /// Axis-aligned envelope; `None` for geometries without coordinates.
    pub fn envelope(&self) -> Option<BoundingBox> {
        let mut vertices = self.vertices();
        let first = vertices.next()?;
        let init = BoundingBox::new(first[0], first[1], first[0], first[1]);
        Some(vertices.fold(init, |b, p| {
            BoundingBox::new(
                b.min_x.min(p[0]),
                b.min_y.min(p[1]),
                b.max_x.max(p[0]),
                b.max_y.max(p[1]),
            )
        }))
    }

    /// Even-odd point in polygon test. Always false for points and lines.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        match self {
            Geometry::Polygon { coordinates } => polygon_contains(coordinates, x, y),
            Geometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .any(|polygon| polygon_contains(polygon, x, y)),
            _ => false,
        }
    }

    /// Whether the geometry and the rectangle share at least one point.
    pub fn intersects_rect(&self, rect: &BoundingBox) -> bool {
        let Some(env) = self.envelope() else {
            return false;
        };
        if !env.intersects(rect) {
            return false;
        }

        if self.vertices().any(|p| rect.contains_point(p[0], p[1])) {
            return true;
        }

        let corners = rect.to_ring();
        if corners[..4].iter().any(|c| self.contains_point(c[0], c[1])) {
            return true;
        }

        let rect_edges: Vec<([f64; 2], [f64; 2])> =
            corners.windows(2).map(|w| (w[0], w[1])).collect();
        self.segments().iter().any(|(a, b)| {
            rect_edges
                .iter()
                .any(|(c, d)| segments_intersect(*a, *b, *c, *d))
        })
    }
}

fn polygon_contains(rings: &[Vec<[f64; 2]>], x: f64, y: f64) -> bool {
    let mut inside = false;
    for ring in rings {
        if ring.len() < 3 {
            continue;
        }
        let mut j = ring.len() - 1;
        for i in 0..ring.len() {
            let [xi, yi] = ring[i];
            let [xj, yj] = ring[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
    }
    inside
}

fn orientation(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn on_segment(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> bool {
    p[0] >= a[0].min(b[0])
        && p[0] <= a[0].max(b[0])
        && p[1] >= a[1].min(b[1])
        && p[1] <= a[1].max(b[1])
}

/// Closed segment intersection, including touching and collinear overlap.
fn segments_intersect(p1: [f64; 2], p2: [f64; 2], q1: [f64; 2], q2: [f64; 2]) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Geometry {
        Geometry::rect(&BoundingBox::new(x0, y0, x0 + size, y0 + size))
    }

    #[test]
    fn test_envelope() {
        let g = Geometry::MultiPolygon {
            coordinates: vec![
                vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0).to_ring()],
                vec![BoundingBox::new(5.0, -2.0, 6.0, 3.0).to_ring()],
            ],
        };
        assert_eq!(g.envelope(), Some(BoundingBox::new(0.0, -2.0, 6.0, 3.0)));
        assert_eq!(
            Geometry::LineString {
                coordinates: vec![]
            }
            .envelope(),
            None
        );
    }

    #[test]
    fn test_contains_point_with_hole() {
        let g = Geometry::Polygon {
            coordinates: vec![
                BoundingBox::new(0.0, 0.0, 10.0, 10.0).to_ring(),
                BoundingBox::new(4.0, 4.0, 6.0, 6.0).to_ring(),
            ],
        };
        assert!(g.contains_point(1.0, 1.0));
        assert!(!g.contains_point(5.0, 5.0));
        assert!(!g.contains_point(11.0, 5.0));
    }

    #[test]
    fn test_intersects_rect() {
        let zone = square(0.0, 0.0, 2.0);
        assert!(zone.intersects_rect(&BoundingBox::new(1.0, 1.0, 3.0, 3.0)));
        // Shared edge
        assert!(zone.intersects_rect(&BoundingBox::new(2.0, 0.0, 4.0, 2.0)));
        // Rectangle inside the polygon
        assert!(square(0.0, 0.0, 10.0).intersects_rect(&BoundingBox::new(2.0, 2.0, 3.0, 3.0)));
        assert!(!zone.intersects_rect(&BoundingBox::new(3.0, 3.0, 4.0, 4.0)));

        // Triangle whose envelope overlaps but whose area does not
        let triangle = Geometry::Polygon {
            coordinates: vec![vec![[0.0, 0.0], [4.0, 0.0], [0.0, 4.0], [0.0, 0.0]]],
        };
        assert!(!triangle.intersects_rect(&BoundingBox::new(3.0, 3.0, 4.0, 4.0)));

        // Edges crossing without any vertex inside the other shape
        let bar = Geometry::rect(&BoundingBox::new(-1.0, 1.0, 5.0, 2.0));
        assert!(bar.intersects_rect(&BoundingBox::new(1.0, 0.0, 2.0, 3.0)));
    }

    #[test]
    fn test_merge_geometry_types() {
        assert_eq!(
            GeometryType::merge(GeometryType::Polygon, GeometryType::MultiPolygon),
            GeometryType::MultiPolygon
        );
        assert_eq!(
            GeometryType::merge(GeometryType::Polygon, GeometryType::Point),
            GeometryType::Unknown
        );
        assert!(GeometryType::Polygon.is_areal());
        assert!(!GeometryType::Unknown.is_areal());
    }

    #[test]
    fn test_geojson_layout() {
        let g: Geometry =
            serde_json::from_str(r#"{"type":"Point","coordinates":[7.5,51.9]}"#).unwrap();
        assert_eq!(
            g,
            Geometry::Point {
                coordinates: [7.5, 51.9]
            }
        );
        let json = serde_json::to_string(&square(0.0, 0.0, 1.0)).unwrap();
        assert!(json.starts_with(r#"{"type":"Polygon","coordinates":[[[0.0,0.0]"#));
    }
}
