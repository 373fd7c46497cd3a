//! Vector queries over data cubes.
//!
//! Two engines read values out of any [`datacube::Cube`]:
//!
//! - [`query_points`] samples every band at scattered `(x, y, t)` points
//! - [`zonal_statistics`] aggregates pixels inside polygon zones and writes
//!   one vector dataset per time step
//!
//! Both take an [`ExecutionContext`](datacube::ExecutionContext) for
//! threads, progress and diagnostics, and a [`Capabilities`] bundle for
//! coordinate transformation, geometry predicates, rasterization and
//! vector I/O.
//!
//! # Example
//!
//! ```ignore
//! use datacube::{CubeFactory, ExecutionContext};
//! use vector_queries::{query_points, Capabilities};
//!
//! let cube = CubeFactory::default().from_file("cube.json")?;
//! let ctx = ExecutionContext::new(4)?;
//! let values = query_points(
//!     cube.as_ref(),
//!     &[7.61],
//!     &[51.96],
//!     &["2018-06-01".to_string()],
//!     "EPSG:4326",
//!     &ctx,
//!     &Capabilities::default(),
//! )?;
//! ```

pub mod aggregator;
pub mod capabilities;
pub mod geometry;
pub mod points;
pub mod rasterize;
pub mod vector;
pub mod zonal;

pub use aggregator::Aggregator;
pub use capabilities::{
    BuiltinTransforms, Capabilities, CoordinateTransform, GeometryOps, PlanarGeometryOps,
    TransformFactory,
};
pub use geometry::{Geometry, GeometryType};
pub use points::query_points;
pub use rasterize::{CentroidRasterizer, RasterGrid, Rasterizer};
pub use vector::{
    Feature, GeoJsonDriver, MemoryDataset, MemoryLayer, VectorDataset, VectorDriver, VectorLayer,
    VectorWriter,
};
pub use zonal::{zonal_statistics, zonal_statistics_dataset, ZonalQuery};
