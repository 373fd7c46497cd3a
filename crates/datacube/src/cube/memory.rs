//! In-memory source cube.

use std::sync::Arc;

use crate::band::BandCollection;
use crate::chunk::{ChunkData, ChunkId, ChunkShape};
use crate::error::{CubeError, Result};
use crate::record::CubeRecord;
use crate::st_reference::StReference;

use super::{attach, Cube, CubeLinks};

/// A source cube backed by a dense `[band][t][y][x]` array whose row 0 is
/// the top of the window.
#[derive(Debug)]
pub struct MemoryCube {
    st_reference: StReference,
    chunk_size: ChunkShape,
    bands: BandCollection,
    data: Arc<Vec<f64>>,
    links: CubeLinks,
}

impl MemoryCube {
    pub fn create(
        st_reference: StReference,
        chunk_size: ChunkShape,
        bands: BandCollection,
        data: Vec<f64>,
    ) -> Result<Arc<Self>> {
        st_reference.validate()?;
        chunk_size.validate()?;
        if bands.is_empty() {
            return Err(CubeError::invalid_argument("a cube needs at least one band"));
        }

        let expected = bands.len()
            * st_reference.nt() as usize
            * st_reference.ny as usize
            * st_reference.nx as usize;
        if data.len() != expected {
            return Err(CubeError::invalid_argument(format!(
                "memory cube expects {} values, got {}",
                expected,
                data.len()
            )));
        }

        Ok(attach(Self {
            st_reference,
            chunk_size,
            bands,
            data: Arc::new(data),
            links: CubeLinks::new(),
        }))
    }

    /// The full array.
    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

impl Cube for MemoryCube {
    fn st_reference(&self) -> &StReference {
        &self.st_reference
    }

    fn chunk_size(&self) -> ChunkShape {
        self.chunk_size
    }

    fn bands(&self) -> &BandCollection {
        &self.bands
    }

    fn read_chunk(&self, id: ChunkId) -> Result<Arc<ChunkData>> {
        if id >= self.count_chunks() {
            return Err(CubeError::chunk_read(id, "chunk id out of range"));
        }

        let limits = self.chunk_limits(id);
        let size = self.chunk_buffer_size(id);
        let [nb, ct, cy, cx] = size;
        let (nt, ny, nx) = (
            self.size_t() as usize,
            self.size_y() as usize,
            self.size_x() as usize,
        );
        let [t0, _, x0] = limits.low.map(|v| v as usize);
        let y_high = limits.high[1] as usize;

        let mut buf = Vec::with_capacity(nb * ct * cy * cx);
        for b in 0..nb {
            for t in 0..ct {
                for ly in 0..cy {
                    // Local row 0 is the highest y index of the chunk
                    let row = ny - 1 - (y_high - ly);
                    let start = b * nt * ny * nx + (t0 + t) * ny * nx + row * nx + x0;
                    buf.extend_from_slice(&self.data[start..start + cx]);
                }
            }
        }

        Ok(Arc::new(ChunkData::from_vec(size, buf)?))
    }

    fn to_record(&self) -> CubeRecord {
        CubeRecord::Memory {
            st_reference: self.st_reference.clone(),
            chunk_size: self.chunk_size,
            bands: self.bands.clone(),
            data: self.data.as_ref().clone(),
        }
    }

    fn links(&self) -> &CubeLinks {
        &self.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube_common::{BoundingBox, DateTime, Duration};

    fn grid_cube() -> Arc<MemoryCube> {
        // 4x3 grid, values = 10 * row_from_top + col
        let st = StReference::new(
            BoundingBox::new(0.0, 0.0, 4.0, 3.0),
            4,
            3,
            "EPSG:4326",
            DateTime::parse("2020-01-01").unwrap(),
            DateTime::parse("2020-01-01").unwrap(),
            Duration::parse("P1D").unwrap(),
        )
        .unwrap();
        let data = (0..3)
            .flat_map(|r| (0..4).map(move |c| f64::from(10 * r + c)))
            .collect();
        MemoryCube::create(
            st,
            ChunkShape::new(1, 2, 3),
            BandCollection::from_names(["v"]).unwrap(),
            data,
        )
        .unwrap()
    }

    #[test]
    fn test_bottom_chunk_rows_top_down() {
        let cube = grid_cube();
        // chunk (0,0,0): array rows y = 0..=1 from the bottom => top rows 2 and 1
        let chunk = cube.read_chunk(0).unwrap();
        assert_eq!(chunk.size(), [1, 1, 2, 3]);
        assert_eq!(chunk.values(), &[10.0, 11.0, 12.0, 20.0, 21.0, 22.0]);
    }

    #[test]
    fn test_cropped_top_chunk() {
        let cube = grid_cube();
        // chunk (0,1,1): y = 2 (top row), x = 3
        let chunk = cube.read_chunk(3).unwrap();
        assert_eq!(chunk.size(), [1, 1, 1, 1]);
        assert_eq!(chunk.values(), &[3.0]);
    }

    #[test]
    fn test_length_mismatch() {
        let cube = grid_cube();
        let st = cube.st_reference().clone();
        assert!(MemoryCube::create(
            st,
            ChunkShape::new(1, 2, 2),
            BandCollection::from_names(["v"]).unwrap(),
            vec![0.0; 5]
        )
        .is_err());
    }
}
