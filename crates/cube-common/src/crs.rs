//! Coordinate Reference System types and utilities.
//!
//! Only a handful of reference systems are known natively. Anything else is
//! kept verbatim and compared by its normalized definition string.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// WGS84 semi-major axis used by Web Mercator (meters).
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Well-known CRS codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
    /// NAD83 Geographic
    Epsg4269,
    /// Any other EPSG code, not transformable by the built-in math
    Epsg(u32),
}

impl CrsCode {
    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg3857 => 3857,
            CrsCode::Epsg4269 => 4269,
            CrsCode::Epsg(code) => *code,
        }
    }

    fn from_epsg(code: u32) -> Self {
        match code {
            4326 => CrsCode::Epsg4326,
            3857 | 900913 => CrsCode::Epsg3857,
            4269 => CrsCode::Epsg4269,
            other => CrsCode::Epsg(other),
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326 | CrsCode::Epsg4269)
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// A parsed coordinate reference system definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    /// An EPSG-coded system.
    Code(CrsCode),
    /// A definition we cannot interpret (WKT, PROJ string, ...), whitespace-normalized.
    Custom(String),
}

impl Crs {
    /// Parse a user supplied CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326", "epsg:4326"
    /// - "CRS:84", "OGC:CRS84", "urn:ogc:def:crs:OGC:1.3:CRS84" (lon/lat WGS84)
    /// - "urn:ogc:def:crs:EPSG::3857"
    /// - "+init=epsg:3857"
    ///
    /// Any other non-empty string is accepted as a custom definition.
    pub fn parse(s: &str) -> Result<Self, CrsError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CrsError::Empty);
        }

        let upper = trimmed.to_uppercase();
        match upper.as_str() {
            "CRS:84" | "OGC:CRS84" | "WGS84" | "WGS 84" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84" => {
                return Ok(Crs::Code(CrsCode::Epsg4326));
            }
            _ => {}
        }

        let code = upper
            .strip_prefix("EPSG:")
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG::"))
            .or_else(|| upper.strip_prefix("+INIT=EPSG:"));

        if let Some(code) = code {
            let code: u32 = code
                .trim()
                .parse()
                .map_err(|_| CrsError::InvalidCode(trimmed.to_string()))?;
            return Ok(Crs::Code(CrsCode::from_epsg(code)));
        }

        let normalized = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(Crs::Custom(normalized))
    }

    /// Whether two definitions describe the same system.
    ///
    pub fn is_same(&self, other: &Crs) -> bool {
        self == other
    }

    /// Parse both strings and compare them; unparseable input is never equivalent.
    ///
    /// This is equivalence, not string equality: "EPSG:4326" and "CRS:84"
    /// are the same system.
    pub fn equivalent(a: &str, b: &str) -> bool {
        match (Crs::parse(a), Crs::parse(b)) {
            (Ok(a), Ok(b)) => a.is_same(&b),
            _ => false,
        }
    }

    pub fn code(&self) -> Option<CrsCode> {
        match self {
            Crs::Code(code) => Some(*code),
            Crs::Custom(_) => None,
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Code(code) => write!(f, "{}", code),
            Crs::Custom(def) => write!(f, "{}", def),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Identity,
    GeographicToMercator,
    MercatorToGeographic,
}

/// Point transformation between two reference systems.
///
/// Supports geographic (EPSG:4326 / EPSG:4269) to and from Web Mercator.
#[derive(Debug, Clone)]
pub struct Transformation {
    source: Crs,
    target: Crs,
    kind: Kind,
}

impl Transformation {
    /// Create a transformation from `source` to `target`.
    pub fn new(source: &Crs, target: &Crs) -> Result<Self, CrsError> {
        let kind = if source.is_same(target) {
            Kind::Identity
        } else {
            match (source.code(), target.code()) {
                (Some(s), Some(t)) if s.is_geographic() && t.is_geographic() => Kind::Identity,
                (Some(s), Some(CrsCode::Epsg3857)) if s.is_geographic() => {
                    Kind::GeographicToMercator
                }
                (Some(CrsCode::Epsg3857), Some(t)) if t.is_geographic() => {
                    Kind::MercatorToGeographic
                }
                _ => {
                    return Err(CrsError::UnsupportedTransformation {
                        from: source.to_string(),
                        to: target.to_string(),
                    })
                }
            }
        };

        Ok(Self {
            source: source.clone(),
            target: target.clone(),
            kind,
        })
    }

    pub fn source(&self) -> &Crs {
        &self.source
    }

    pub fn target(&self) -> &Crs {
        &self.target
    }

    /// Transform coordinate arrays in place.
    ///
    /// Fails on the first point that has no finite image; the arrays may
    /// then be partially transformed and must be discarded.
    pub fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<(), CrsError> {
        if xs.len() != ys.len() {
            return Err(CrsError::LengthMismatch(xs.len(), ys.len()));
        }

        for (i, (x, y)) in xs.iter_mut().zip(ys.iter_mut()).enumerate() {
            let (tx, ty) = match self.kind {
                Kind::Identity => (*x, *y),
                Kind::GeographicToMercator => geographic_to_mercator(*x, *y),
                Kind::MercatorToGeographic => mercator_to_geographic(*x, *y),
            };
            if !tx.is_finite() || !ty.is_finite() {
                return Err(CrsError::TransformFailed {
                    index: i,
                    x: *x,
                    y: *y,
                });
            }
            *x = tx;
            *y = ty;
        }
        Ok(())
    }
}

fn geographic_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    if lat.abs() >= 90.0 {
        return (f64::NAN, f64::NAN);
    }
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

fn mercator_to_geographic(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

#[derive(Debug, thiserror::Error)]
pub enum CrsError {
    #[error("Empty CRS definition")]
    Empty,

    #[error("Invalid EPSG code in '{0}'")]
    InvalidCode(String),

    #[error("No transformation available from {from} to {to}")]
    UnsupportedTransformation { from: String, to: String },

    #[error("Coordinate arrays differ in length ({0} vs {1})")]
    LengthMismatch(usize, usize),

    #[error("Transformation failed for point {index} ({x}, {y})")]
    TransformFailed { index: usize, x: f64, y: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(
            Crs::parse("EPSG:4326").unwrap(),
            Crs::Code(CrsCode::Epsg4326)
        );
        assert_eq!(
            Crs::parse("epsg:3857").unwrap(),
            Crs::Code(CrsCode::Epsg3857)
        );
        assert_eq!(Crs::parse("CRS:84").unwrap(), Crs::Code(CrsCode::Epsg4326));
        assert_eq!(
            Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(),
            Crs::Code(CrsCode::Epsg4326)
        );
        assert_eq!(
            Crs::parse("urn:ogc:def:crs:EPSG::32632").unwrap(),
            Crs::Code(CrsCode::Epsg(32632))
        );
        assert!(Crs::parse("EPSG:abc").is_err());
        assert!(Crs::parse("  ").is_err());
    }

    #[test]
    fn test_equivalence_is_not_string_equality() {
        assert!(Crs::equivalent("EPSG:4326", "CRS:84"));
        assert!(Crs::equivalent("EPSG:900913", "epsg:3857"));
        assert!(!Crs::equivalent("EPSG:4326", "EPSG:3857"));
        assert!(Crs::equivalent("+proj=longlat  +datum=WGS84", "+proj=longlat +datum=WGS84"));
    }

    #[test]
    fn test_mercator_roundtrip() {
        let wgs = Crs::parse("EPSG:4326").unwrap();
        let merc = Crs::parse("EPSG:3857").unwrap();

        let mut xs = vec![0.0, 7.5, -120.25];
        let mut ys = vec![0.0, 51.9, -33.0];
        Transformation::new(&wgs, &merc)
            .unwrap()
            .transform(&mut xs, &mut ys)
            .unwrap();

        assert!(xs[0].abs() < 1e-6 && ys[0].abs() < 1e-6);
        assert!((xs[1] - 834_900.0).abs() < 100.0);

        Transformation::new(&merc, &wgs)
            .unwrap()
            .transform(&mut xs, &mut ys)
            .unwrap();
        assert!((xs[1] - 7.5).abs() < 1e-9);
        assert!((ys[1] - 51.9).abs() < 1e-9);
        assert!((xs[2] + 120.25).abs() < 1e-9);
        assert!((ys[2] + 33.0).abs() < 1e-9);
    }

    #[test]
    fn test_transform_failure_on_pole() {
        let wgs = Crs::parse("EPSG:4326").unwrap();
        let merc = Crs::parse("EPSG:3857").unwrap();
        let mut xs = vec![0.0];
        let mut ys = vec![90.0];
        let result = Transformation::new(&wgs, &merc)
            .unwrap()
            .transform(&mut xs, &mut ys);
        assert!(matches!(result, Err(CrsError::TransformFailed { index: 0, .. })));
    }

    #[test]
    fn test_unsupported_transformation() {
        let utm = Crs::parse("EPSG:32632").unwrap();
        let wgs = Crs::parse("EPSG:4326").unwrap();
        assert!(Transformation::new(&utm, &wgs).is_err());
    }
}
