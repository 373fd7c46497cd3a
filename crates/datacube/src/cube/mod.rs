//! The cube node abstraction and its concrete implementations.
//!
//! A cube is a lazily evaluated 4-D array `[band, t, y, x]` split into
//! chunks. Nodes form a graph: derived cubes hold strong references to
//! their inputs, inputs hold weak references back to the cubes built on
//! them.

mod dummy;
mod memory;
mod reduce_space;
mod zarr;

pub use dummy::DummyCube;
pub use memory::MemoryCube;
pub use reduce_space::ReduceSpaceCube;
pub use zarr::{write_cube_zarr, ZarrCube, ZarrWriteResult};

use std::sync::{Arc, RwLock, Weak};

use cube_common::{BoundingBox, DateTime};

use crate::band::BandCollection;
use crate::chunk::{ChunkCoords, ChunkData, ChunkId, ChunkLimits, ChunkShape};
use crate::error::{CubeError, Result};
use crate::record::CubeRecord;
use crate::st_reference::{ArrayCoords, StReference};

/// World-space extent of a chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBounds {
    pub window: BoundingBox,
    /// First time step covered by the chunk.
    pub t_start: DateTime,
    /// Last time step covered by the chunk (inclusive).
    pub t_end: DateTime,
}

/// A node of the cube graph.
///
/// Implementors supply the reference, chunking, bands and chunk reads; the
/// chunk geometry is derived from those.
pub trait Cube: Send + Sync {
    fn st_reference(&self) -> &StReference;

    /// Nominal chunk shape.
    fn chunk_size(&self) -> ChunkShape;

    fn bands(&self) -> &BandCollection;

    /// Read (or compute) one chunk. Repeated calls for the same id return
    /// equal data.
    fn read_chunk(&self, id: ChunkId) -> Result<Arc<ChunkData>>;

    /// Self-describing construction record of this node and its inputs.
    fn to_record(&self) -> CubeRecord;

    fn links(&self) -> &CubeLinks;

    fn size_x(&self) -> u32 {
        self.st_reference().nx
    }

    fn size_y(&self) -> u32 {
        self.st_reference().ny
    }

    fn size_t(&self) -> u32 {
        self.st_reference().nt()
    }

    /// `[bands, t, y, x]`
    fn size(&self) -> [u32; 4] {
        [
            self.bands().len() as u32,
            self.size_t(),
            self.size_y(),
            self.size_x(),
        ]
    }

    fn count_chunks_x(&self) -> u32 {
        self.size_x().div_ceil(self.chunk_size().x)
    }

    fn count_chunks_y(&self) -> u32 {
        self.size_y().div_ceil(self.chunk_size().y)
    }

    fn count_chunks_t(&self) -> u32 {
        self.size_t().div_ceil(self.chunk_size().t)
    }

    fn count_chunks(&self) -> u32 {
        self.count_chunks_t() * self.count_chunks_y() * self.count_chunks_x()
    }

    fn chunk_id_from_coords(&self, c: ChunkCoords) -> ChunkId {
        let ny = self.count_chunks_y();
        let nx = self.count_chunks_x();
        c.t * (ny * nx) + c.y * nx + c.x
    }

    fn chunk_coords_from_id(&self, id: ChunkId) -> ChunkCoords {
        let ny = self.count_chunks_y();
        let nx = self.count_chunks_x();
        ChunkCoords {
            t: id / (ny * nx),
            y: (id % (ny * nx)) / nx,
            x: id % nx,
        }
    }

    /// Inclusive array index range of a chunk, cropped at the cube edges.
    fn chunk_limits(&self, id: ChunkId) -> ChunkLimits {
        let c = self.chunk_coords_from_id(id);
        let cs = self.chunk_size();
        let low = [c.t * cs.t, c.y * cs.y, c.x * cs.x];
        let high = [
            (low[0] + cs.t).min(self.size_t()) - 1,
            (low[1] + cs.y).min(self.size_y()) - 1,
            (low[2] + cs.x).min(self.size_x()) - 1,
        ];
        ChunkLimits { low, high }
    }

    /// Actual (possibly cropped) shape of a chunk.
    fn chunk_shape_of(&self, id: ChunkId) -> ChunkShape {
        let l = self.chunk_limits(id);
        ChunkShape {
            t: l.high[0] - l.low[0] + 1,
            y: l.high[1] - l.low[1] + 1,
            x: l.high[2] - l.low[2] + 1,
        }
    }

    /// Size `[bands, t, y, x]` of the buffer `read_chunk(id)` returns.
    fn chunk_buffer_size(&self, id: ChunkId) -> [usize; 4] {
        let s = self.chunk_shape_of(id);
        [
            self.bands().len(),
            s.t as usize,
            s.y as usize,
            s.x as usize,
        ]
    }

    /// Spatial window and time range covered by a chunk.
    fn bounds_from_chunk(&self, id: ChunkId) -> Result<ChunkBounds> {
        if id >= self.count_chunks() {
            return Err(CubeError::invalid_argument(format!(
                "chunk id {} out of range (count {})",
                id,
                self.count_chunks()
            )));
        }
        let st = self.st_reference();
        let l = self.chunk_limits(id);
        let window = BoundingBox::new(
            st.left + f64::from(l.low[2]) * st.dx(),
            st.bottom + f64::from(l.low[1]) * st.dy(),
            (st.left + f64::from(l.high[2] + 1) * st.dx()).min(st.right),
            (st.bottom + f64::from(l.high[1] + 1) * st.dy()).min(st.top),
        );
        Ok(ChunkBounds {
            window,
            t_start: st.datetime_at(l.low[0])?,
            t_end: st.datetime_at(l.high[0])?,
        })
    }

    /// Chunk owning fractional array coordinates, or `None` outside the cube.
    ///
    /// A coordinate on a chunk edge belongs to the chunk whose low edge it
    /// is (floor division).
    fn find_chunk_that_contains(&self, c: &ArrayCoords) -> Option<ChunkId> {
        if self.st_reference().is_out_of_extent(c) {
            return None;
        }
        let cs = self.chunk_size();
        let coords = ChunkCoords {
            t: c.it.floor() as u32 / cs.t,
            y: c.iy.floor() as u32 / cs.y,
            x: c.ix.floor() as u32 / cs.x,
        };
        Some(self.chunk_id_from_coords(coords))
    }
}

/// Graph links of a node.
///
/// Parents are owned; children are tracked weakly and never keep a
/// derived cube alive.
#[derive(Default)]
pub struct CubeLinks {
    parents: Vec<Arc<dyn Cube>>,
    children: RwLock<Vec<Weak<dyn Cube>>>,
}

impl CubeLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parents(parents: Vec<Arc<dyn Cube>>) -> Self {
        Self {
            parents,
            children: RwLock::new(Vec::new()),
        }
    }

    pub fn parents(&self) -> &[Arc<dyn Cube>] {
        &self.parents
    }

    /// Live children; dead references are pruned.
    pub fn children(&self) -> Vec<Arc<dyn Cube>> {
        let mut children = self.children.write().unwrap_or_else(|e| e.into_inner());
        children.retain(|c| c.strong_count() > 0);
        children.iter().filter_map(Weak::upgrade).collect()
    }

    fn add_child(&self, child: Weak<dyn Cube>) {
        self.children
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(child);
    }
}

impl std::fmt::Debug for CubeLinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubeLinks")
            .field("parents", &self.parents.len())
            .finish_non_exhaustive()
    }
}

/// Wrap a freshly constructed node and register it with its parents.
///
/// Every node constructor goes through here so both link directions exist
/// before the node is handed out.
pub(crate) fn attach<C: Cube + 'static>(cube: C) -> Arc<C> {
    let cube = Arc::new(cube);
    let as_dyn: Arc<dyn Cube> = cube.clone();
    for parent in cube.links().parents() {
        parent.links().add_child(Arc::downgrade(&as_dyn));
    }
    cube
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::BandCollection;
    use cube_common::Duration;

    fn cube(nx: u32, ny: u32, t1: &str, chunk: ChunkShape) -> Arc<DummyCube> {
        let st = StReference::new(
            BoundingBox::new(0.0, 0.0, f64::from(nx), f64::from(ny)),
            nx,
            ny,
            "EPSG:4326",
            DateTime::parse("2020-01-01").unwrap(),
            DateTime::parse(t1).unwrap(),
            Duration::parse("P1D").unwrap(),
        )
        .unwrap();
        DummyCube::create(st, chunk, BandCollection::from_names(["a"]).unwrap(), 1.0).unwrap()
    }

    #[test]
    fn test_chunk_counts_with_cropped_edges() {
        let c = cube(5, 3, "2020-01-03", ChunkShape::new(2, 2, 2));
        assert_eq!(c.count_chunks_x(), 3);
        assert_eq!(c.count_chunks_y(), 2);
        assert_eq!(c.count_chunks_t(), 2);
        assert_eq!(c.count_chunks(), 12);

        let last = c.count_chunks() - 1;
        assert_eq!(c.chunk_shape_of(last), ChunkShape::new(1, 1, 1));
        assert_eq!(c.chunk_shape_of(0), ChunkShape::new(2, 2, 2));
        assert_eq!(c.chunk_buffer_size(last), [1, 1, 1, 1]);
    }

    #[test]
    fn test_chunk_id_bijection() {
        let c = cube(7, 5, "2020-01-04", ChunkShape::new(3, 2, 2));
        for id in 0..c.count_chunks() {
            let coords = c.chunk_coords_from_id(id);
            assert!(coords.t < c.count_chunks_t());
            assert!(coords.y < c.count_chunks_y());
            assert!(coords.x < c.count_chunks_x());
            assert_eq!(c.chunk_id_from_coords(coords), id);
        }
    }

    #[test]
    fn test_find_chunk_within_bounds() {
        let c = cube(5, 3, "2020-01-03", ChunkShape::new(2, 2, 2));
        let st = c.st_reference().clone();
        for id in 0..c.count_chunks() {
            let b = c.bounds_from_chunk(id).unwrap();
            let (x, y) = b.window.center();
            let it = f64::from(c.chunk_limits(id).low[0]);
            let coords = st.array_coords(x, y, it);
            assert_eq!(c.find_chunk_that_contains(&coords), Some(id));

            // The low edges belong to the chunk itself
            let edge = st.array_coords(b.window.left(), b.window.bottom(), it);
            assert_eq!(c.find_chunk_that_contains(&edge), Some(id));
        }
    }

    #[test]
    fn test_shared_edge_resolves_to_upper_chunk() {
        let c = cube(4, 4, "2020-01-01", ChunkShape::new(1, 2, 2));
        let st = c.st_reference().clone();
        // x = 2 is the right edge of chunk x=0 and the left edge of chunk x=1
        let id = c.find_chunk_that_contains(&st.array_coords(2.0, 1.0, 0.0));
        assert_eq!(id, Some(c.chunk_id_from_coords(ChunkCoords::new(0, 0, 1))));
        // y = 2 belongs to the upper row of chunks
        let id = c.find_chunk_that_contains(&st.array_coords(1.0, 2.0, 0.0));
        assert_eq!(id, Some(c.chunk_id_from_coords(ChunkCoords::new(0, 1, 0))));
        assert_eq!(c.find_chunk_that_contains(&st.array_coords(4.0, 1.0, 0.0)), None);
    }

    #[test]
    fn test_bounds_from_chunk() {
        let c = cube(5, 3, "2020-01-03", ChunkShape::new(2, 2, 2));
        let b = c.bounds_from_chunk(0).unwrap();
        assert_eq!(b.window, BoundingBox::new(0.0, 0.0, 2.0, 2.0));
        assert_eq!(b.t_start.to_string(), "2020-01-01");
        assert_eq!(b.t_end.to_string(), "2020-01-02");

        let last = c.bounds_from_chunk(c.count_chunks() - 1).unwrap();
        assert_eq!(last.window, BoundingBox::new(4.0, 2.0, 5.0, 3.0));
        assert_eq!(last.t_start, last.t_end);
        assert!(c.bounds_from_chunk(c.count_chunks()).is_err());
    }

    #[test]
    fn test_children_are_weak() {
        let source = cube(4, 4, "2020-01-01", ChunkShape::new(1, 2, 2));
        {
            let reduced = ReduceSpaceCube::create(
                source.clone(),
                vec![("mean".to_string(), "a".to_string())],
            )
            .unwrap();
            assert_eq!(source.links().children().len(), 1);
            assert_eq!(reduced.links().parents().len(), 1);
        }
        assert!(source.links().children().is_empty());
    }
}
