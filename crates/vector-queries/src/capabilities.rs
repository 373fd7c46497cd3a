//! Collaborators the query engines call into.
//!
//! Coordinate transformation, geometry intersection, rasterization and
//! vector I/O are reached through the traits bundled in [`Capabilities`],
//! so callers can swap implementations per query.

use std::sync::Arc;

use cube_common::{BoundingBox, Crs, Transformation};
use datacube::Result;

use crate::geometry::Geometry;
use crate::rasterize::{CentroidRasterizer, Rasterizer};
use crate::vector::{GeoJsonDriver, VectorDriver};

/// In-place transformation of coordinate arrays.
pub trait CoordinateTransform {
    fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()>;
}

impl CoordinateTransform for Transformation {
    fn transform(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
        Ok(Transformation::transform(self, xs, ys)?)
    }
}

/// Creates transformations between CRS identifiers.
pub trait TransformFactory: Send + Sync {
    fn create(&self, from: &str, to: &str) -> Result<Box<dyn CoordinateTransform>>;
}

/// Transformations known to [`cube_common::Transformation`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTransforms;

impl TransformFactory for BuiltinTransforms {
    fn create(&self, from: &str, to: &str) -> Result<Box<dyn CoordinateTransform>> {
        let source = Crs::parse(from)?;
        let target = Crs::parse(to)?;
        Ok(Box::new(Transformation::new(&source, &target)?))
    }
}

/// Geometry predicates needed for spatial binning.
pub trait GeometryOps: Send + Sync {
    fn intersects_rect(&self, geometry: &Geometry, rect: &BoundingBox) -> bool;

    fn envelope(&self, geometry: &Geometry) -> Option<BoundingBox>;
}

/// Planar predicates on [`Geometry`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanarGeometryOps;

impl GeometryOps for PlanarGeometryOps {
    fn intersects_rect(&self, geometry: &Geometry, rect: &BoundingBox) -> bool {
        geometry.intersects_rect(rect)
    }

    fn envelope(&self, geometry: &Geometry) -> Option<BoundingBox> {
        geometry.envelope()
    }
}

/// Per-query set of collaborators.
#[derive(Clone)]
pub struct Capabilities {
    pub transforms: Arc<dyn TransformFactory>,
    pub rasterizer: Arc<dyn Rasterizer>,
    /// Zonal statistics refuses to run without it.
    pub geometry_ops: Option<Arc<dyn GeometryOps>>,
    pub vector_driver: Arc<dyn VectorDriver>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            transforms: Arc::new(BuiltinTransforms),
            rasterizer: Arc::new(CentroidRasterizer),
            geometry_ops: Some(Arc::new(PlanarGeometryOps)),
            vector_driver: Arc::new(GeoJsonDriver),
        }
    }
}

impl Capabilities {
    pub fn with_transforms(mut self, transforms: Arc<dyn TransformFactory>) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_geometry_ops(mut self, geometry_ops: Option<Arc<dyn GeometryOps>>) -> Self {
        self.geometry_ops = geometry_ops;
        self
    }

    pub fn with_vector_driver(mut self, driver: Arc<dyn VectorDriver>) -> Self {
        self.vector_driver = driver;
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("geometry_ops", &self.geometry_ops.is_some())
            .field("vector_driver", &self.vector_driver.extension())
            .finish_non_exhaustive()
    }
}
