//! Chunked spatiotemporal raster cubes.
//!
//! A cube is a lazily evaluated 4-D array `[band, t, y, x]` described by a
//! [`StReference`] (window, resolution, CRS and time axis) and a chunk
//! shape. Nodes are composed into a graph; reading a chunk of a derived
//! node pulls the chunks it needs from its inputs.
//!
//! # Architecture
//!
//! ```text
//! query engine
//!      │
//!      ▼
//! Cube::find_chunk_that_contains(coords)   (O(1) arithmetic)
//!      │
//!      ▼
//! Cube::read_chunk(id)
//!      │
//!      ├─► ReduceSpaceCube ──► input chunks ──► reduce
//!      │
//!      └─► ZarrCube ──► ChunkCache hit? ──► Zarr subset read
//! ```
//!
//! # Example
//!
//! ```ignore
//! use datacube::{CubeFactory, Cube};
//!
//! let cube = CubeFactory::default().from_file("cube.json")?;
//! let chunk = cube.read_chunk(0)?;
//! println!("{:?}", chunk.size());
//! ```

pub mod band;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod context;
pub mod cube;
pub mod error;
pub mod record;
pub mod st_reference;
pub mod statistic;

// Re-export commonly used types at crate root
pub use band::{Band, BandCollection};
pub use cache::{CacheStats, ChunkCache};
pub use chunk::{ChunkCoords, ChunkData, ChunkId, ChunkLimits, ChunkShape};
pub use config::CubeConfig;
pub use context::{
    AtomicProgress, CollectingSink, Diagnostic, DiagnosticSink, ExecutionContext, NoProgress,
    Progress, Severity, TracingSink,
};
pub use cube::{
    write_cube_zarr, ChunkBounds, Cube, CubeLinks, DummyCube, MemoryCube, ReduceSpaceCube,
    ZarrCube, ZarrWriteResult,
};
pub use error::{CubeError, Result};
pub use record::{CubeFactory, CubeRecord};
pub use st_reference::{ArrayCoords, StReference, TimeIndex};
pub use statistic::Statistic;
