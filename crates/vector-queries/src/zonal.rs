//! Zonal statistics: aggregate cube values over polygon zones.
//!
//! For every time step of the cube one vector dataset is written, holding
//! each input zone with one field per `(statistic, band)` pair.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cube_common::{BoundingBox, Crs};
use datacube::{
    ChunkCoords, ChunkData, ChunkId, Cube, CubeError, ExecutionContext, Result, Statistic,
};
use tracing::{debug, info};

use crate::aggregator::Aggregator;
use crate::capabilities::{Capabilities, GeometryOps};
use crate::rasterize::RasterGrid;
use crate::vector::{VectorDataset, VectorLayer};

/// Parameters of a zonal statistics run.
#[derive(Debug, Clone)]
pub struct ZonalQuery {
    /// `(statistic, band)` pairs.
    pub stats: Vec<(String, String)>,
    pub out_dir: PathBuf,
    pub out_prefix: String,
    /// Layer to use; the first layer if `None`.
    pub layer: Option<String>,
}

impl ZonalQuery {
    pub fn new(
        stats: Vec<(String, String)>,
        out_dir: impl Into<PathBuf>,
        out_prefix: impl Into<String>,
    ) -> Self {
        Self {
            stats,
            out_dir: out_dir.into(),
            out_prefix: out_prefix.into(),
            layer: None,
        }
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }
}

/// A validated `(statistic, band)` pair.
#[derive(Debug, Clone)]
struct StatBand {
    stat: Statistic,
    band: usize,
    field: String,
}

/// Run zonal statistics over the zones stored at `dataset_path`.
///
/// Returns the written files in time order.
pub fn zonal_statistics(
    cube: &dyn Cube,
    dataset_path: &Path,
    query: &ZonalQuery,
    ctx: &ExecutionContext,
    caps: &Capabilities,
) -> Result<Vec<PathBuf>> {
    require_geometry_ops(caps)?;
    let dataset = caps.vector_driver.open(dataset_path).map_err(|e| {
        CubeError::precondition(format!(
            "failed to open vector dataset '{}': {}",
            dataset_path.display(),
            e
        ))
    })?;
    zonal_statistics_dataset(cube, dataset.as_ref(), query, ctx, caps)
}

/// Run zonal statistics over the zones of an opened dataset.
pub fn zonal_statistics_dataset(
    cube: &dyn Cube,
    dataset: &dyn VectorDataset,
    query: &ZonalQuery,
    ctx: &ExecutionContext,
    caps: &Capabilities,
) -> Result<Vec<PathBuf>> {
    let geometry_ops = require_geometry_ops(caps)?;
    let st = cube.st_reference();
    st.validate()?;

    let pairs = validate_pairs(cube, &query.stats, ctx);
    let layer = resolve_layer(dataset, query.layer.as_deref(), ctx)?;

    if layer.fid_column().is_none() {
        return Err(CubeError::precondition(format!(
            "layer '{}' has no feature id column",
            layer.name()
        )));
    }
    if !layer.geometry_type().is_areal() {
        return Err(CubeError::precondition(format!(
            "layer '{}' has geometry type {}, expected Polygon or MultiPolygon",
            layer.name(),
            layer.geometry_type()
        )));
    }
    if !Crs::equivalent(layer.srs(), &st.srs) {
        return Err(CubeError::precondition(format!(
            "layer CRS '{}' does not match cube CRS '{}'",
            layer.srs(),
            st.srs
        )));
    }
    if !layer.supports_random_read() {
        ctx.warn(&format!(
            "Layer '{}' does not support efficient random access by feature id",
            layer.name()
        ));
    }

    ctx.progress().set(0.0);

    let zones = bin_features(cube, layer, geometry_ops)?;

    let fids: Vec<i64> = layer.features().map(|f| f.fid).collect();
    let dense: HashMap<i64, usize> = fids.iter().enumerate().map(|(i, &fid)| (fid, i)).collect();
    debug!(
        layer = layer.name(),
        features = fids.len(),
        chunks_with_zones = zones.iter().filter(|z| !z.is_empty()).count(),
        "Binned zones into spatial chunks"
    );

    let nspatial = cube.count_chunks_x() * cube.count_chunks_y();
    let step = 1.0 / f64::from(cube.size_t());
    let mut written = Vec::new();

    for ct in 0..cube.count_chunks_t() {
        let first_id = ct * nspatial;
        let nt = cube.chunk_shape_of(first_id).t as usize;
        let low_t = cube.chunk_limits(first_id).low[0];

        let mut aggregators = pairs
            .iter()
            .map(|p| Aggregator::new(p.stat, fids.len(), nt))
            .collect::<Result<Vec<_>>>()?;

        for (spatial, candidates) in zones.iter().enumerate() {
            if candidates.is_empty() {
                continue;
            }
            let id = first_id + spatial as ChunkId;
            let chunk = match cube.read_chunk(id) {
                Ok(chunk) => chunk,
                Err(e) => {
                    let e = e.in_chunk(id);
                    debug!(chunk_id = id, error = %e, "Skipping chunk");
                    ctx.error(&e.to_string());
                    continue;
                }
            };
            if chunk.is_empty() {
                continue;
            }

            let area = ChunkArea::new(cube, id);
            for &fid in candidates {
                let Some(&feature_index) = dense.get(&fid) else {
                    continue;
                };
                if let Err(e) = accumulate_feature(
                    layer,
                    fid,
                    feature_index,
                    &chunk,
                    &area,
                    &pairs,
                    &mut aggregators,
                    geometry_ops,
                    caps,
                ) {
                    ctx.error(&format!(
                        "Failed to process feature {} in chunk {}: {}",
                        fid, id, e
                    ));
                }
            }
        }

        let results: Vec<Vec<f64>> = aggregators.into_iter().map(Aggregator::finalize).collect();

        for lt in 0..nt {
            let path = write_time_step(
                layer,
                &fids,
                &pairs,
                &results,
                nt,
                lt,
                low_t + lt as u32,
                query,
                cube,
                caps,
            )?;
            written.push(path);
            ctx.progress().increment(step);
        }
    }

    ctx.progress().finalize();
    info!(
        files = written.len(),
        features = fids.len(),
        fields = pairs.len(),
        "Zonal statistics finished"
    );
    Ok(written)
}

fn require_geometry_ops(caps: &Capabilities) -> Result<&dyn GeometryOps> {
    caps.geometry_ops
        .as_deref()
        .ok_or_else(|| CubeError::precondition("no geometry intersection capability available"))
}

/// Drop pairs with unknown bands or unsupported statistics, with a warning.
fn validate_pairs(
    cube: &dyn Cube,
    stats: &[(String, String)],
    ctx: &ExecutionContext,
) -> Vec<StatBand> {
    let mut pairs = Vec::with_capacity(stats.len());
    for (stat_name, band_name) in stats {
        let Some(band) = cube.bands().index_of(band_name) else {
            ctx.warn(&format!(
                "Data cube has no band '{}', ignoring statistic '{}'",
                band_name, stat_name
            ));
            continue;
        };
        let stat = match stat_name.parse::<Statistic>() {
            Ok(stat) if Aggregator::supports(stat) => stat,
            _ => {
                ctx.warn(&format!(
                    "There is no aggregation function '{}', ignoring band '{}'",
                    stat_name, band_name
                ));
                continue;
            }
        };
        pairs.push(StatBand {
            stat,
            band,
            field: format!("{}_{}", band_name, stat),
        });
    }
    pairs
}

fn resolve_layer<'a>(
    dataset: &'a dyn VectorDataset,
    name: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<&'a dyn VectorLayer> {
    match name {
        Some(name) => dataset.layer_by_name(name).ok_or_else(|| {
            CubeError::precondition(format!("vector dataset has no layer '{}'", name))
        }),
        None => {
            if dataset.layer_count() > 1 {
                ctx.warn(
                    "Vector dataset has multiple layers and none was named, using the first one",
                );
            }
            dataset
                .layer(0)
                .ok_or_else(|| CubeError::precondition("vector dataset has no layers"))
        }
    }
}

/// FIDs of the features intersecting each spatial chunk, indexed by
/// `cy * count_chunks_x + cx`.
fn bin_features(
    cube: &dyn Cube,
    layer: &dyn VectorLayer,
    geometry_ops: &dyn GeometryOps,
) -> Result<Vec<Vec<i64>>> {
    let mut zones = Vec::with_capacity((cube.count_chunks_y() * cube.count_chunks_x()) as usize);
    for cy in 0..cube.count_chunks_y() {
        for cx in 0..cube.count_chunks_x() {
            let id = cube.chunk_id_from_coords(ChunkCoords::new(0, cy, cx));
            let window = cube.bounds_from_chunk(id)?.window;
            let hits = layer
                .features()
                .filter(|f| {
                    f.geometry
                        .as_ref()
                        .is_some_and(|g| geometry_ops.intersects_rect(g, &window))
                })
                .map(|f| f.fid)
                .collect();
            zones.push(hits);
        }
    }
    Ok(zones)
}

/// Pixel grid of one chunk.
struct ChunkArea {
    left: f64,
    top: f64,
    dx: f64,
    dy: f64,
}

impl ChunkArea {
    fn new(cube: &dyn Cube, id: ChunkId) -> Self {
        let st = cube.st_reference();
        let limits = cube.chunk_limits(id);
        Self {
            left: st.left + f64::from(limits.low[2]) * st.dx(),
            top: st.bottom + f64::from(limits.high[1] + 1) * st.dy(),
            dx: st.dx(),
            dy: st.dy(),
        }
    }

    /// Inclusive pixel range `(x0, y0, x1, y1)` covered by `env`, clamped to
    /// a `nx` × `ny` chunk, or `None` if they do not overlap.
    fn pixel_bounds(&self, env: &BoundingBox, nx: usize, ny: usize) -> Option<[usize; 4]> {
        let x0 = ((env.min_x - self.left) / self.dx).floor();
        let x1 = ((env.max_x - self.left) / self.dx).floor();
        let y0 = ((self.top - env.max_y) / self.dy).floor();
        let y1 = ((self.top - env.min_y) / self.dy).floor();

        let (max_x, max_y) = ((nx - 1) as f64, (ny - 1) as f64);
        if x1 < 0.0 || y1 < 0.0 || x0 > max_x || y0 > max_y {
            return None;
        }
        Some([
            x0.clamp(0.0, max_x) as usize,
            y0.clamp(0.0, max_y) as usize,
            x1.clamp(0.0, max_x) as usize,
            y1.clamp(0.0, max_y) as usize,
        ])
    }
}

#[allow(clippy::too_many_arguments)]
fn accumulate_feature(
    layer: &dyn VectorLayer,
    fid: i64,
    feature_index: usize,
    chunk: &ChunkData,
    area: &ChunkArea,
    pairs: &[StatBand],
    aggregators: &mut [Aggregator],
    geometry_ops: &dyn GeometryOps,
    caps: &Capabilities,
) -> Result<()> {
    let feature = layer
        .feature(fid)
        .ok_or_else(|| CubeError::precondition(format!("feature {} not found", fid)))?;
    let Some(geometry) = feature.geometry.as_ref() else {
        return Ok(());
    };
    let Some(env) = geometry_ops.envelope(geometry) else {
        return Ok(());
    };

    let [_, nt, ny, nx] = chunk.size();
    let Some([x0, y0, x1, y1]) = area.pixel_bounds(&env, nx, ny) else {
        return Ok(());
    };

    let grid = RasterGrid {
        left: area.left + x0 as f64 * area.dx,
        top: area.top - y0 as f64 * area.dy,
        dx: area.dx,
        dy: area.dy,
        width: x1 - x0 + 1,
        height: y1 - y0 + 1,
    };
    let mask = caps.rasterizer.rasterize(geometry, &grid)?;
    if mask.len() != grid.width * grid.height {
        return Err(CubeError::precondition(format!(
            "rasterizer returned {} cells for a {}x{} grid",
            mask.len(),
            grid.width,
            grid.height
        )));
    }

    for (cell, _) in mask.iter().enumerate().filter(|(_, &m)| m == 1) {
        let y = y0 + cell / grid.width;
        let x = x0 + cell % grid.width;
        for t in 0..nt {
            for (pair, aggregator) in pairs.iter().zip(aggregators.iter_mut()) {
                aggregator.update(chunk.value(pair.band, t, y, x), feature_index, t);
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_time_step(
    layer: &dyn VectorLayer,
    fids: &[i64],
    pairs: &[StatBand],
    results: &[Vec<f64>],
    nt: usize,
    lt: usize,
    it: u32,
    query: &ZonalQuery,
    cube: &dyn Cube,
    caps: &Capabilities,
) -> Result<PathBuf> {
    let timestamp = cube.st_reference().datetime_at(it)?;
    let path = query.out_dir.join(format!(
        "{}{}.{}",
        query.out_prefix,
        timestamp,
        caps.vector_driver.extension()
    ));

    let mut writer = caps
        .vector_driver
        .create(&path, layer.name(), layer.srs(), layer.geometry_type())
        .map_err(|e| {
            CubeError::precondition(format!(
                "failed to create output dataset '{}': {}",
                path.display(),
                e
            ))
        })?;
    for pair in pairs {
        writer.create_field(&pair.field)?;
    }

    for (index, &fid) in fids.iter().enumerate() {
        let values: Vec<f64> = results.iter().map(|r| r[index * nt + lt]).collect();
        let geometry = layer.feature(fid).and_then(|f| f.geometry.as_ref());
        writer.create_feature(fid, &values, geometry)?;
    }

    let path = writer.close()?;
    debug!(path = %path.display(), time_index = it, "Wrote zonal statistics");
    Ok(path)
}
