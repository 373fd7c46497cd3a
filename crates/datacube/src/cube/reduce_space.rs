//! Spatial reduction: collapse x and y to a single pixel.

use std::sync::Arc;

use tracing::debug;

use crate::band::{Band, BandCollection};
use crate::chunk::{ChunkCoords, ChunkData, ChunkId, ChunkShape};
use crate::error::{CubeError, Result};
use crate::record::CubeRecord;
use crate::st_reference::StReference;
use crate::statistic::{reduce, Statistic};

use super::{attach, Cube, CubeLinks};

#[derive(Debug, Clone, Copy)]
struct Reducer {
    stat: Statistic,
    in_band: usize,
}

/// Applies one reducer per output band over all pixels of each time slice.
pub struct ReduceSpaceCube {
    in_cube: Arc<dyn Cube>,
    reducer_bands: Vec<(String, String)>,
    reducers: Vec<Reducer>,
    st_reference: StReference,
    chunk_size: ChunkShape,
    bands: BandCollection,
    links: CubeLinks,
}

impl ReduceSpaceCube {
    /// Create a reduction of `in_cube`.
    ///
    /// `reducer_bands` holds `(statistic, band)` pairs; statistics must be
    /// one of min, max, mean, median, count, var, sd, prod, sum and bands
    /// must exist in `in_cube`.
    pub fn create(
        in_cube: Arc<dyn Cube>,
        reducer_bands: Vec<(String, String)>,
    ) -> Result<Arc<Self>> {
        if reducer_bands.is_empty() {
            return Err(CubeError::invalid_argument(
                "reduce_space needs at least one reducer",
            ));
        }

        let already_reduced = in_cube.size_x() == 1 && in_cube.size_y() == 1;
        let mut reducers = Vec::with_capacity(reducer_bands.len());
        let mut bands = BandCollection::new();

        for (stat_name, band_name) in &reducer_bands {
            let stat: Statistic = stat_name.parse()?;
            let in_band = in_cube.bands().index_of(band_name).ok_or_else(|| {
                CubeError::invalid_argument(format!(
                    "input cube has no band '{}'",
                    band_name
                ))
            })?;

            let mut band = in_cube
                .bands()
                .get_index(in_band)
                .cloned()
                .unwrap_or_else(|| Band::new(band_name.clone()));
            if !already_reduced {
                band.name = format!("{}_{}", band_name, stat);
            }
            bands.add(band)?;
            reducers.push(Reducer { stat, in_band });
        }

        let st_reference = in_cube.st_reference().collapsed_space();
        let chunk_size = ChunkShape::new(in_cube.chunk_size().t, 1, 1);

        Ok(attach(Self {
            links: CubeLinks::with_parents(vec![Arc::clone(&in_cube)]),
            in_cube,
            reducer_bands,
            reducers,
            st_reference,
            chunk_size,
            bands,
        }))
    }

    pub fn in_cube(&self) -> &Arc<dyn Cube> {
        &self.in_cube
    }
}

impl Cube for ReduceSpaceCube {
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

        let size = self.chunk_buffer_size(id);
        let nt = size[1];
        let ct = self.chunk_coords_from_id(id).t;

        // values[reducer * nt + t]
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); self.reducers.len() * nt];
        let mut any_data = false;

        for cy in 0..self.in_cube.count_chunks_y() {
            for cx in 0..self.in_cube.count_chunks_x() {
                let in_id = self.in_cube.chunk_id_from_coords(ChunkCoords::new(ct, cy, cx));
                let chunk = self.in_cube.read_chunk(in_id)?;
                if chunk.is_empty() {
                    continue;
                }
                any_data = true;

                let [_, in_nt, in_ny, in_nx] = chunk.size();
                let plane = in_ny * in_nx;
                for (k, reducer) in self.reducers.iter().enumerate() {
                    for t in 0..nt.min(in_nt) {
                        let start = chunk.offset(reducer.in_band, t, 0, 0);
                        values[k * nt + t].extend_from_slice(&chunk.values()[start..start + plane]);
                    }
                }
            }
        }

        if !any_data {
            debug!(chunk_id = id, "All input chunks empty");
            return Ok(Arc::new(ChunkData::empty(size)));
        }

        let buf = self
            .reducers
            .iter()
            .enumerate()
            .flat_map(|(k, reducer)| (0..nt).map(move |t| (k, t, reducer.stat)))
            .map(|(k, t, stat)| reduce(stat, &mut std::mem::take(&mut values[k * nt + t])))
            .collect();

        Ok(Arc::new(ChunkData::from_vec(size, buf)?))
    }

    fn to_record(&self) -> CubeRecord {
        CubeRecord::ReduceSpace {
            reducer_bands: self.reducer_bands.clone(),
            in_cube: Box::new(self.in_cube.to_record()),
        }
    }

    fn links(&self) -> &CubeLinks {
        &self.links
    }
}
