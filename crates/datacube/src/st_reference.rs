//! Spatiotemporal reference: the window, resolution and time axis of a cube.

use cube_common::{BoundingBox, DateTime, DateUnit, Duration};
use serde::{Deserialize, Serialize};

use crate::error::{CubeError, Result};

/// Fractional array coordinates of a world position.
///
/// `iy` is measured upward from the bottom edge of the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayCoords {
    pub it: f64,
    pub iy: f64,
    pub ix: f64,
}

/// A time index together with the information whether the query
/// timestamp had to be coarsened to the cube's unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeIndex {
    pub it: f64,
    pub precision_loss: bool,
}

/// Spatial window, pixel counts, CRS and time axis of a cube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StReference {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
    pub nx: u32,
    pub ny: u32,
    pub srs: String,
    pub t0: DateTime,
    pub t1: DateTime,
    pub dt: Duration,
}

impl StReference {
    /// Create a reference and check its invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        window: BoundingBox,
        nx: u32,
        ny: u32,
        srs: impl Into<String>,
        t0: DateTime,
        t1: DateTime,
        dt: Duration,
    ) -> Result<Self> {
        let st = Self {
            left: window.left(),
            right: window.right(),
            bottom: window.bottom(),
            top: window.top(),
            nx,
            ny,
            srs: srs.into(),
            t0,
            t1,
            dt,
        };
        st.validate()?;
        Ok(st)
    }

    /// Check the invariants of a reference, e.g. after deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.ny == 0 {
            return Err(CubeError::invalid_argument("nx and ny must be > 0"));
        }
        if !(self.right > self.left) || !(self.top > self.bottom) {
            return Err(CubeError::invalid_argument(format!(
                "empty spatial window ({}, {}, {}, {})",
                self.left, self.bottom, self.right, self.top
            )));
        }
        if self.dt.count <= 0 {
            return Err(CubeError::invalid_argument("dt must be positive"));
        }
        if self.t1 < self.t0 {
            return Err(CubeError::invalid_argument(format!(
                "t1 ({}) is before t0 ({})",
                self.t1, self.t0
            )));
        }
        if self.srs.trim().is_empty() {
            return Err(CubeError::invalid_argument("empty srs"));
        }
        Ok(())
    }

    pub fn window(&self) -> BoundingBox {
        BoundingBox::new(self.left, self.bottom, self.right, self.top)
    }

    pub fn dx(&self) -> f64 {
        (self.right - self.left) / self.nx as f64
    }

    pub fn dy(&self) -> f64 {
        (self.top - self.bottom) / self.ny as f64
    }

    /// Number of time steps; `t1` is inclusive.
    pub fn nt(&self) -> u32 {
        let steps = self.t1.diff(&self.t0, self.dt.unit) / i64::from(self.dt.count);
        (steps.max(0) + 1) as u32
    }

    /// Timestamp of time index `it`.
    pub fn datetime_at(&self, it: u32) -> Result<DateTime> {
        let steps = i32::try_from(it)
            .map_err(|_| CubeError::invalid_argument(format!("time index {} too large", it)))?;
        Ok(self.t0.add(&(self.dt * steps))?)
    }

    /// Fractional time index of `t`, `(t - t0) / dt` in units of `dt`.
    ///
    /// A timestamp coarser than `dt` is snapped to `dt`'s unit and flagged
    /// as a precision loss; a finer one is truncated silently.
    pub fn time_index(&self, t: &DateTime) -> TimeIndex {
        let unit = self.dt.unit;
        let precision_loss = t.unit() > unit;
        let snapped = t.with_unit(unit);
        let steps = snapped.diff(&self.t0, unit) as f64;
        TimeIndex {
            it: steps / f64::from(self.dt.count),
            precision_loss,
        }
    }

    /// Fractional array coordinates of a world position.
    pub fn array_coords(&self, x: f64, y: f64, it: f64) -> ArrayCoords {
        ArrayCoords {
            it,
            iy: (y - self.bottom) / self.dy(),
            ix: (x - self.left) / self.dx(),
        }
    }

    /// Whether fractional coordinates fall outside the cube.
    pub fn is_out_of_extent(&self, c: &ArrayCoords) -> bool {
        !(c.it >= 0.0
            && c.it < f64::from(self.nt())
            && c.ix >= 0.0
            && c.ix < f64::from(self.nx)
            && c.iy >= 0.0
            && c.iy < f64::from(self.ny))
    }

    /// Same reference with the spatial axes collapsed to one pixel.
    pub fn collapsed_space(&self) -> Self {
        Self {
            nx: 1,
            ny: 1,
            ..self.clone()
        }
    }

    pub fn time_unit(&self) -> DateUnit {
        self.dt.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> StReference {
        StReference::new(
            BoundingBox::new(0.0, 0.0, 4.0, 4.0),
            4,
            4,
            "EPSG:4326",
            DateTime::parse("2018-01-01").unwrap(),
            DateTime::parse("2018-01-10").unwrap(),
            Duration::parse("P2D").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_resolution_and_nt() {
        let st = reference();
        assert_eq!(st.dx(), 1.0);
        assert_eq!(st.dy(), 1.0);
        // 2018-01-01, 03, 05, 07, 09
        assert_eq!(st.nt(), 5);
        assert_eq!(st.datetime_at(4).unwrap().to_string(), "2018-01-09");
    }

    #[test]
    fn test_time_index() {
        let st = reference();
        let idx = st.time_index(&DateTime::parse("2018-01-04").unwrap());
        assert_eq!(idx.it, 1.5);
        assert!(!idx.precision_loss);

        let fine = st.time_index(&DateTime::parse("2018-01-04T23:59:59").unwrap());
        assert_eq!(fine.it, 1.5);
        assert!(!fine.precision_loss);

        let coarse = st.time_index(&DateTime::parse("2018-01").unwrap());
        assert_eq!(coarse.it, 0.0);
        assert!(coarse.precision_loss);

        let before = st.time_index(&DateTime::parse("2017-12-31").unwrap());
        assert!(before.it < 0.0);
    }

    #[test]
    fn test_extent() {
        let st = reference();
        assert!(!st.is_out_of_extent(&st.array_coords(0.0, 0.0, 0.0)));
        assert!(!st.is_out_of_extent(&st.array_coords(3.999, 3.999, 4.9)));
        assert!(st.is_out_of_extent(&st.array_coords(4.0, 1.0, 0.0)));
        assert!(st.is_out_of_extent(&st.array_coords(1.0, -0.1, 0.0)));
        assert!(st.is_out_of_extent(&st.array_coords(1.0, 1.0, 5.0)));
        assert!(st.is_out_of_extent(&st.array_coords(1.0, 1.0, -0.5)));
    }

    #[test]
    fn test_invalid_reference() {
        let t = DateTime::parse("2018-01-01").unwrap();
        let dt = Duration::parse("P1D").unwrap();
        let unit = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let flipped = BoundingBox::new(1.0, 0.0, 0.0, 1.0);
        assert!(StReference::new(unit, 0, 1, "EPSG:4326", t, t, dt).is_err());
        assert!(StReference::new(flipped, 1, 1, "EPSG:4326", t, t, dt).is_err());
        assert!(StReference::new(
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            1,
            1,
            "EPSG:4326",
            DateTime::parse("2018-01-02").unwrap(),
            t,
            dt
        )
        .is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let st = reference();
        let json = serde_json::to_string(&st).unwrap();
        assert!(json.contains("\"dt\":\"P2D\""));
        let back: StReference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, st);
    }
}
