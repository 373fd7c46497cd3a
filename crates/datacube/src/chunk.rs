//! Chunk identifiers, shapes and buffers.

use serde::{Deserialize, Serialize};

use crate::error::{CubeError, Result};

/// Dense chunk identifier in `[0, count_chunks)`.
pub type ChunkId = u32;

/// Nominal chunk shape over (t, y, x).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkShape {
    pub t: u32,
    pub y: u32,
    pub x: u32,
}

impl ChunkShape {
    pub fn new(t: u32, y: u32, x: u32) -> Self {
        Self { t, y, x }
    }

    pub fn validate(&self) -> Result<()> {
        if self.t == 0 || self.y == 0 || self.x == 0 {
            return Err(CubeError::invalid_argument(format!(
                "chunk size must be positive, got ({}, {}, {})",
                self.t, self.y, self.x
            )));
        }
        Ok(())
    }

    pub fn cells(&self) -> usize {
        self.t as usize * self.y as usize * self.x as usize
    }
}

/// Position of a chunk in the chunk grid.
///
/// `y` counts upward from the bottom of the spatial window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkCoords {
    pub t: u32,
    pub y: u32,
    pub x: u32,
}

impl ChunkCoords {
    pub fn new(t: u32, y: u32, x: u32) -> Self {
        Self { t, y, x }
    }
}

/// Inclusive low/high array indices of a chunk along (t, y, x).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    pub low: [u32; 3],
    pub high: [u32; 3],
}

/// Decoded chunk data laid out as `[band][t][y][x]`, row 0 at the top.
///
/// `size` is the actual (possibly cropped) size `[bands, t, y, x]`.
#[derive(Debug, Clone)]
pub struct ChunkData {
    size: [usize; 4],
    buf: Option<Vec<f64>>,
}

impl ChunkData {
    /// A chunk without usable data.
    pub fn empty(size: [usize; 4]) -> Self {
        Self { size, buf: None }
    }

    /// Wrap a buffer; its length must match `size`.
    pub fn from_vec(size: [usize; 4], buf: Vec<f64>) -> Result<Self> {
        let expected = size.iter().product::<usize>();
        if buf.len() != expected {
            return Err(CubeError::invalid_argument(format!(
                "chunk buffer has {} values, expected {} for size {:?}",
                buf.len(),
                expected,
                size
            )));
        }
        Ok(Self {
            size,
            buf: Some(buf),
        })
    }

    pub fn filled(size: [usize; 4], value: f64) -> Self {
        Self {
            size,
            buf: Some(vec![value; size.iter().product()]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_none()
    }

    pub fn size(&self) -> [usize; 4] {
        self.size
    }

    pub fn count_bands(&self) -> usize {
        self.size[0]
    }

    pub fn size_t(&self) -> usize {
        self.size[1]
    }

    pub fn size_y(&self) -> usize {
        self.size[2]
    }

    pub fn size_x(&self) -> usize {
        self.size[3]
    }

    /// Raw values; an empty chunk has none.
    pub fn values(&self) -> &[f64] {
        self.buf.as_deref().unwrap_or(&[])
    }

    /// Flattened offset of `(band, t, y, x)`.
    #[inline]
    pub fn offset(&self, band: usize, t: usize, y: usize, x: usize) -> usize {
        let [_, nt, ny, nx] = self.size;
        band * (nt * ny * nx) + t * (ny * nx) + y * nx + x
    }

    /// Value at `(band, t, y, x)`; NaN for empty chunks or out-of-range indices.
    pub fn value(&self, band: usize, t: usize, y: usize, x: usize) -> f64 {
        let [nb, nt, ny, nx] = self.size;
        if band >= nb || t >= nt || y >= ny || x >= nx {
            return f64::NAN;
        }
        self.values()
            .get(self.offset(band, t, y, x))
            .copied()
            .unwrap_or(f64::NAN)
    }

    /// Bitwise equality, treating NaN payloads as values.
    pub fn bit_eq(&self, other: &ChunkData) -> bool {
        self.size == other.size
            && match (&self.buf, &other.buf) {
                (None, None) => true,
                (Some(a), Some(b)) => a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()),
                _ => false,
            }
    }

    /// Approximate heap size in bytes.
    pub fn memory_size(&self) -> usize {
        self.buf
            .as_ref()
            .map(|b| b.len() * std::mem::size_of::<f64>())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_is_band_major() {
        let buf: Vec<f64> = (0..2 * 3 * 2 * 2).map(|v| v as f64).collect();
        let chunk = ChunkData::from_vec([2, 3, 2, 2], buf).unwrap();
        assert_eq!(chunk.value(0, 0, 0, 1), 1.0);
        assert_eq!(chunk.value(0, 0, 1, 0), 2.0);
        assert_eq!(chunk.value(0, 1, 0, 0), 4.0);
        assert_eq!(chunk.value(1, 0, 0, 0), 12.0);
        assert!(chunk.value(2, 0, 0, 0).is_nan());
    }

    #[test]
    fn test_size_mismatch_rejected() {
        assert!(ChunkData::from_vec([1, 1, 2, 2], vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = ChunkData::empty([1, 1, 2, 2]);
        assert!(chunk.is_empty());
        assert!(chunk.values().is_empty());
        assert!(chunk.value(0, 0, 0, 0).is_nan());
        assert_eq!(chunk.memory_size(), 0);
    }

    #[test]
    fn test_bit_eq_with_nan() {
        let a = ChunkData::filled([1, 1, 1, 2], f64::NAN);
        let b = ChunkData::filled([1, 1, 1, 2], f64::NAN);
        assert!(a.bit_eq(&b));
        assert!(!a.bit_eq(&ChunkData::empty([1, 1, 1, 2])));
    }
}
