//! Cubes that fail on purpose.

use std::sync::Arc;

use datacube::{
    BandCollection, ChunkData, ChunkId, ChunkShape, Cube, CubeError, CubeLinks, CubeRecord,
    Result, StReference,
};

/// Wraps a cube and fails `read_chunk` for one chunk id.
///
/// Every other chunk, and all geometry, comes from the wrapped cube.
pub struct FailingCube {
    inner: Arc<dyn Cube>,
    failing: ChunkId,
    links: CubeLinks,
}

impl FailingCube {
    pub fn wrap(inner: Arc<dyn Cube>, failing: ChunkId) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing,
            links: CubeLinks::new(),
        })
    }
}

impl Cube for FailingCube {
    fn st_reference(&self) -> &StReference {
        self.inner.st_reference()
    }

    fn chunk_size(&self) -> ChunkShape {
        self.inner.chunk_size()
    }

    fn bands(&self) -> &BandCollection {
        self.inner.bands()
    }

    fn read_chunk(&self, id: ChunkId) -> Result<Arc<ChunkData>> {
        if id == self.failing {
            return Err(CubeError::chunk_read(id, "injected failure"));
        }
        self.inner.read_chunk(id)
    }

    fn to_record(&self) -> CubeRecord {
        self.inner.to_record()
    }

    fn links(&self) -> &CubeLinks {
        &self.links
    }
}
