//! Constant-valued source cube.

use std::sync::Arc;

use crate::band::BandCollection;
use crate::chunk::{ChunkData, ChunkId, ChunkShape};
use crate::error::{CubeError, Result};
use crate::record::CubeRecord;
use crate::st_reference::StReference;

use super::{attach, Cube, CubeLinks};

/// A source cube where every cell of every band holds `fill`.
#[derive(Debug)]
pub struct DummyCube {
    st_reference: StReference,
    chunk_size: ChunkShape,
    bands: BandCollection,
    fill: f64,
    links: CubeLinks,
}

impl DummyCube {
    pub fn create(
        st_reference: StReference,
        chunk_size: ChunkShape,
        bands: BandCollection,
        fill: f64,
    ) -> Result<Arc<Self>> {
        st_reference.validate()?;
        chunk_size.validate()?;
        if bands.is_empty() {
            return Err(CubeError::invalid_argument("a cube needs at least one band"));
        }
        Ok(attach(Self {
            st_reference,
            chunk_size,
            bands,
            fill,
            links: CubeLinks::new(),
        }))
    }

    pub fn fill(&self) -> f64 {
        self.fill
    }
}

impl Cube for DummyCube {
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
        Ok(Arc::new(ChunkData::filled(
            self.chunk_buffer_size(id),
            self.fill,
        )))
    }

    fn to_record(&self) -> CubeRecord {
        CubeRecord::Dummy {
            st_reference: self.st_reference.clone(),
            chunk_size: self.chunk_size,
            bands: self.bands.clone(),
            fill: self.fill,
        }
    }

    fn links(&self) -> &CubeLinks {
        &self.links
    }
}
