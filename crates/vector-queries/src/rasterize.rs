//! Polygon to pixel mask rasterization.

use datacube::{CubeError, Result};

use crate::geometry::Geometry;

/// North-up pixel grid: `width` × `height` pixels of size `dx` × `dy`
/// starting at the top-left corner `(left, top)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGrid {
    pub left: f64,
    pub top: f64,
    pub dx: f64,
    pub dy: f64,
    pub width: usize,
    pub height: usize,
}

impl RasterGrid {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CubeError::invalid_argument("raster grid has no pixels"));
        }
        if !(self.dx > 0.0 && self.dy > 0.0) {
            return Err(CubeError::invalid_argument(format!(
                "invalid raster resolution ({}, {})",
                self.dx, self.dy
            )));
        }
        Ok(())
    }

    /// World coordinates of the centre of pixel `(row, col)`.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.left + (col as f64 + 0.5) * self.dx,
            self.top - (row as f64 + 0.5) * self.dy,
        )
    }
}

/// Burns a single geometry into a byte mask.
pub trait Rasterizer: Send + Sync {
    /// Row-major mask of `grid.height * grid.width` bytes, 1 inside and 0
    /// outside. Row 0 is the top.
    fn rasterize(&self, geometry: &Geometry, grid: &RasterGrid) -> Result<Vec<u8>>;
}

/// Marks a pixel when its centre lies inside the geometry.
#[derive(Debug, Default, Clone, Copy)]
pub struct CentroidRasterizer;

impl Rasterizer for CentroidRasterizer {
    fn rasterize(&self, geometry: &Geometry, grid: &RasterGrid) -> Result<Vec<u8>> {
        grid.validate()?;
        let mut mask = vec![0u8; grid.width * grid.height];
        for row in 0..grid.height {
            for col in 0..grid.width {
                let (x, y) = grid.pixel_center(row, col);
                if geometry.contains_point(x, y) {
                    mask[row * grid.width + col] = 1;
                }
            }
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_mask() {
        let triangle = Geometry::Polygon {
            coordinates: vec![vec![[0.0, 0.0], [4.0, 0.0], [0.0, 4.0], [0.0, 0.0]]],
        };
        let grid = RasterGrid {
            left: 0.0,
            top: 4.0,
            dx: 1.0,
            dy: 1.0,
            width: 4,
            height: 4,
        };
        let mask = CentroidRasterizer.rasterize(&triangle, &grid).unwrap();
        #[rustfmt::skip]
        assert_eq!(mask, vec![
            0, 0, 0, 0,
            1, 0, 0, 0,
            1, 1, 0, 0,
            1, 1, 1, 0,
        ]);
    }

    #[test]
    fn test_invalid_grid() {
        let g = Geometry::Point {
            coordinates: [0.0, 0.0],
        };
        let grid = RasterGrid {
            left: 0.0,
            top: 0.0,
            dx: 1.0,
            dy: 1.0,
            width: 0,
            height: 1,
        };
        assert!(CentroidRasterizer.rasterize(&g, &grid).is_err());
    }
}
