//! Synthetic cube generators.
//!
//! These generators create predictable, verifiable cubes that can be used
//! across the test suite. All grids use one world unit per pixel, start at
//! the origin and run daily from [`START_DATE`].

use std::sync::Arc;

use cube_common::{BoundingBox, DateTime, Duration};
use datacube::{BandCollection, ChunkShape, DummyCube, MemoryCube, StReference};

/// First time step of every generated cube.
pub const START_DATE: &str = "2020-01-01";

/// CRS of every generated cube.
pub const TEST_SRS: &str = "EPSG:3857";

/// Reference over `(0, 0)-(nx, ny)` with `nt` daily steps.
///
/// # Panics
///
/// Panics if any size is zero.
pub fn test_reference(nx: u32, ny: u32, nt: u32) -> StReference {
    let t0 = DateTime::parse(START_DATE).unwrap();
    let dt = Duration::parse("P1D").unwrap();
    let t1 = t0.add(&(dt * (nt as i32 - 1))).unwrap();
    StReference::new(
        BoundingBox::new(0.0, 0.0, f64::from(nx), f64::from(ny)),
        nx,
        ny,
        TEST_SRS,
        t0,
        t1,
        dt,
    )
    .unwrap()
}

/// Value of the ramp pattern at `(band, t, row, col)`, row 0 at the top.
///
/// Calculated as `band * 10000 + t * 1000 + row * 10 + col`, so every cell
/// is distinct as long as `col < 10` and `row < 100`.
pub fn ramp_value(band: usize, t: usize, row: usize, col: usize) -> f64 {
    (band * 10000 + t * 1000 + row * 10 + col) as f64
}

/// Dense `[band][t][row][col]` array filled with [`ramp_value`].
///
/// # Example
///
/// ```
/// use test_utils::create_ramp_values;
///
/// let data = create_ramp_values(1, 2, 2, 3);
/// assert_eq!(data.len(), 12);
/// assert_eq!(data[4], 11.0);   // t=0, row=1, col=1
/// assert_eq!(data[6], 1000.0); // t=1, row=0, col=0
/// ```
pub fn create_ramp_values(nbands: usize, nt: usize, ny: usize, nx: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(nbands * nt * ny * nx);
    for band in 0..nbands {
        for t in 0..nt {
            for row in 0..ny {
                for col in 0..nx {
                    data.push(ramp_value(band, t, row, col));
                }
            }
        }
    }
    data
}

/// In-memory cube holding the ramp pattern, one band per name.
pub fn ramp_cube(nx: u32, ny: u32, nt: u32, chunk: ChunkShape, bands: &[&str]) -> Arc<MemoryCube> {
    let data = create_ramp_values(bands.len(), nt as usize, ny as usize, nx as usize);
    MemoryCube::create(
        test_reference(nx, ny, nt),
        chunk,
        BandCollection::from_names(bands.iter().copied()).unwrap(),
        data,
    )
    .unwrap()
}

/// Cube with a single band `value` where every cell equals `value`.
pub fn constant_cube(nx: u32, ny: u32, nt: u32, chunk: ChunkShape, value: f64) -> Arc<DummyCube> {
    DummyCube::create(
        test_reference(nx, ny, nt),
        chunk,
        BandCollection::from_names(["value"]).unwrap(),
        value,
    )
    .unwrap()
}
