//! Zarr V3 backed source cube.
//!
//! A cube is stored as one 4-D `Float64` array `[band, t, y, x]` whose row 0
//! is the top of the window. The spatiotemporal reference, bands and chunk
//! size live in the array attributes.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::band::BandCollection;
use crate::cache::{CacheStats, ChunkCache};
use crate::chunk::{ChunkData, ChunkId, ChunkShape};
use crate::error::{CubeError, Result};
use crate::record::CubeRecord;
use crate::st_reference::StReference;

use super::{attach, Cube, CubeLinks};

const ATTR_ST_REFERENCE: &str = "st_reference";
const ATTR_BANDS: &str = "bands";
const ATTR_CHUNK_SIZE: &str = "chunk_size";

/// A cube read from a Zarr array on the local filesystem.
pub struct ZarrCube {
    path: String,
    array: Array<FilesystemStore>,
    st_reference: StReference,
    chunk_size: ChunkShape,
    stored_chunk_size: ChunkShape,
    bands: BandCollection,
    chunk_cache: Mutex<ChunkCache>,
    links: CubeLinks,
}

impl ZarrCube {
    /// Open the Zarr array at `path`.
    ///
    /// `chunk_size` overrides the chunking stored with the array.
    pub fn open(
        path: impl AsRef<Path>,
        chunk_size: Option<ChunkShape>,
        cache_bytes: usize,
    ) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let store = FilesystemStore::new(path)
            .map_err(|e| CubeError::storage(format!("{}: {}", path.display(), e)))?;
        let array = Array::open(Arc::new(store), "/")
            .map_err(|e| CubeError::storage(format!("{}: {}", path.display(), e)))?;

        let attrs = array.attributes();
        let attr = |name: &str| {
            attrs
                .get(name)
                .cloned()
                .ok_or_else(|| CubeError::storage(format!("missing attribute '{}'", name)))
        };
        let st_reference: StReference = serde_json::from_value(attr(ATTR_ST_REFERENCE)?)?;
        let bands: BandCollection = serde_json::from_value(attr(ATTR_BANDS)?)?;
        let stored_chunk_size: ChunkShape = serde_json::from_value(attr(ATTR_CHUNK_SIZE)?)?;
        st_reference.validate()?;

        let expected = [
            bands.len() as u64,
            u64::from(st_reference.nt()),
            u64::from(st_reference.ny),
            u64::from(st_reference.nx),
        ];
        if array.shape() != expected {
            return Err(CubeError::storage(format!(
                "array shape {:?} does not match attributes {:?}",
                array.shape(),
                expected
            )));
        }

        let chunk_size = chunk_size.unwrap_or(stored_chunk_size);
        chunk_size.validate()?;

        info!(
            path = %path.display(),
            bands = bands.len(),
            shape = ?expected,
            "Opened Zarr cube"
        );

        Ok(attach(Self {
            path: path.display().to_string(),
            array,
            st_reference,
            chunk_size,
            stored_chunk_size,
            bands,
            chunk_cache: Mutex::new(ChunkCache::new(cache_bytes)),
            links: CubeLinks::new(),
        }))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ChunkCache> {
        self.chunk_cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_chunk_uncached(&self, id: ChunkId) -> Result<ChunkData> {
        let limits = self.chunk_limits(id);
        let size = self.chunk_buffer_size(id);
        let top_row = self.size_y() - 1 - limits.high[1];

        let subset = ArraySubset::new_with_start_shape(
            vec![
                0,
                u64::from(limits.low[0]),
                u64::from(top_row),
                u64::from(limits.low[2]),
            ],
            size.iter().map(|&s| s as u64).collect(),
        )
        .map_err(|e| CubeError::chunk_read(id, e.to_string()))?;

        let data: Vec<f64> = self
            .array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| CubeError::chunk_read(id, e.to_string()))?;

        if data.iter().all(|v| v.is_nan()) {
            return Ok(ChunkData::empty(size));
        }
        ChunkData::from_vec(size, data)
    }
}

impl Cube for ZarrCube {
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

        if let Some(chunk) = self.lock_cache().get(id) {
            return Ok(chunk);
        }

        let chunk = Arc::new(self.read_chunk_uncached(id)?);
        debug!(chunk_id = id, path = %self.path, empty = chunk.is_empty(), "Read Zarr chunk");
        self.lock_cache().insert(id, Arc::clone(&chunk));
        Ok(chunk)
    }

    fn to_record(&self) -> CubeRecord {
        CubeRecord::Zarr {
            path: self.path.clone(),
            chunk_size: (self.chunk_size != self.stored_chunk_size).then_some(self.chunk_size),
        }
    }

    fn links(&self) -> &CubeLinks {
        &self.links
    }
}

/// Summary of a materialized cube.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZarrWriteResult {
    /// `[bands, t, y, x]`
    pub shape: [u64; 4],
    pub chunks_written: u32,
    pub chunks_empty: u32,
}

/// Evaluate every chunk of `cube` and store the result as a Zarr array at
/// `path`. Empty chunks are left at the NaN fill value.
pub fn write_cube_zarr(cube: &dyn Cube, path: impl AsRef<Path>) -> Result<ZarrWriteResult> {
    let path = path.as_ref();
    std::fs::create_dir_all(path)?;

    let store = Arc::new(
        FilesystemStore::new(path)
            .map_err(|e| CubeError::storage(format!("{}: {}", path.display(), e)))?,
    );

    let [nb, nt, ny, nx] = cube.size().map(u64::from);
    let cs = cube.chunk_size();

    let mut attrs = serde_json::Map::new();
    attrs.insert(
        ATTR_ST_REFERENCE.to_string(),
        serde_json::to_value(cube.st_reference())?,
    );
    attrs.insert(ATTR_BANDS.to_string(), serde_json::to_value(cube.bands())?);
    attrs.insert(ATTR_CHUNK_SIZE.to_string(), serde_json::to_value(cs)?);

    let chunk_grid: zarrs::array::ChunkGrid =
        vec![nb, u64::from(cs.t), u64::from(cs.y), u64::from(cs.x)]
            .try_into()
            .map_err(|e| CubeError::storage(format!("{:?}", e)))?;

    let mut binding = ArrayBuilder::new(
        vec![nb, nt, ny, nx],
        DataType::Float64,
        chunk_grid,
        FillValue::from(f64::NAN),
    );
    let array = binding
        .attributes(attrs)
        .build(store, "/")
        .map_err(|e| CubeError::storage(e.to_string()))?;

    array
        .store_metadata()
        .map_err(|e| CubeError::storage(e.to_string()))?;

    let mut result = ZarrWriteResult {
        shape: [nb, nt, ny, nx],
        chunks_written: 0,
        chunks_empty: 0,
    };

    for id in 0..cube.count_chunks() {
        let chunk = cube.read_chunk(id)?;
        if chunk.is_empty() {
            result.chunks_empty += 1;
            continue;
        }

        let limits = cube.chunk_limits(id);
        let top_row = u64::from(cube.size_y() - 1 - limits.high[1]);
        let subset = ArraySubset::new_with_start_shape(
            vec![0, u64::from(limits.low[0]), top_row, u64::from(limits.low[2])],
            chunk.size().iter().map(|&s| s as u64).collect(),
        )
        .map_err(|e| CubeError::storage(e.to_string()))?;

        array
            .store_array_subset_elements(&subset, chunk.values())
            .map_err(|e| CubeError::storage(e.to_string()))?;
        result.chunks_written += 1;
    }

    info!(
        path = %path.display(),
        chunks_written = result.chunks_written,
        chunks_empty = result.chunks_empty,
        "Wrote Zarr cube"
    );

    Ok(result)
}
