//! Point sampling.
//!
//! Runs in three phases, each a full barrier on the context's pool:
//!
//! 1. transform query coordinates to the cube CRS (contiguous blocks)
//! 2. derive array coordinates and group points by owning chunk
//!    (strided; every worker fills its own map, merged afterwards)
//! 3. read each touched chunk once and copy out the pixel values (strided)

use std::collections::BTreeMap;

use cube_common::{Crs, DateTime};
use datacube::{ArrayCoords, ChunkData, ChunkId, Cube, CubeError, ExecutionContext, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::capabilities::Capabilities;

type PointIndex = BTreeMap<ChunkId, Vec<(usize, ArrayCoords)>>;

/// Sample every band of `cube` at the given points.
///
/// `xs`/`ys` are in `srs`, `timestamps` are date/time strings. Returns one
/// vector per band, each as long as `xs`; points outside the cube are NaN.
pub fn query_points(
    cube: &dyn Cube,
    xs: &[f64],
    ys: &[f64],
    timestamps: &[String],
    srs: &str,
    ctx: &ExecutionContext,
    caps: &Capabilities,
) -> Result<Vec<Vec<f64>>> {
    let n = xs.len();
    if ys.len() != n || timestamps.len() != n {
        return Err(CubeError::invalid_argument(format!(
            "coordinate arrays differ in length (x: {}, y: {}, t: {})",
            n,
            ys.len(),
            timestamps.len()
        )));
    }
    if n == 0 {
        return Err(CubeError::invalid_argument("no query points"));
    }
    cube.st_reference().validate()?;

    ctx.progress().set(0.0);

    let mut xs = xs.to_vec();
    let mut ys = ys.to_vec();
    transform_points(cube, &mut xs, &mut ys, srs, ctx, caps)?;

    let index = index_points(cube, &xs, &ys, timestamps, ctx)?;

    let nbands = cube.bands().len();
    let mut out = vec![vec![f64::NAN; n]; nbands];
    for (i, values) in extract_values(cube, &index, ctx) {
        for (band, v) in values.into_iter().enumerate() {
            out[band][i] = v;
        }
    }

    ctx.progress().finalize();
    info!(
        points = n,
        chunks = index.len(),
        bands = nbands,
        "Point query finished"
    );
    Ok(out)
}

fn transform_points(
    cube: &dyn Cube,
    xs: &mut [f64],
    ys: &mut [f64],
    srs: &str,
    ctx: &ExecutionContext,
    caps: &Capabilities,
) -> Result<()> {
    let cube_srs = cube.st_reference().srs.as_str();
    if Crs::equivalent(srs, cube_srs) {
        debug!(srs, "Query CRS matches cube CRS, skipping transformation");
        return Ok(());
    }

    let block = xs.len().div_ceil(ctx.max_threads());
    ctx.pool()
        .install(|| {
            xs.par_chunks_mut(block)
                .zip(ys.par_chunks_mut(block))
                .try_for_each(|(bx, by)| {
                    let transform = caps.transforms.create(srs, cube_srs)?;
                    transform.transform(bx, by)
                })
        })
        .map_err(|e| {
            CubeError::transform(format!(
                "coordinate transformation failed (from {} to {}): {}",
                srs, cube_srs, e
            ))
        })
}

fn index_points(
    cube: &dyn Cube,
    xs: &[f64],
    ys: &[f64],
    timestamps: &[String],
    ctx: &ExecutionContext,
) -> Result<PointIndex> {
    let n = xs.len();
    let workers = ctx.max_threads().min(n);
    let st = cube.st_reference();

    let shards = ctx.pool().install(|| {
        (0..workers)
            .into_par_iter()
            .map(|w| {
                let mut shard = PointIndex::new();
                let mut coarse = 0usize;
                for i in (w..n).step_by(workers) {
                    let t = DateTime::parse(&timestamps[i]).map_err(|e| {
                        CubeError::invalid_argument(format!(
                            "invalid timestamp '{}' at point {}: {}",
                            timestamps[i], i, e
                        ))
                    })?;
                    let time = st.time_index(&t);
                    if time.precision_loss {
                        coarse += 1;
                    }
                    let coords = st.array_coords(xs[i], ys[i], time.it);
                    if let Some(id) = cube.find_chunk_that_contains(&coords) {
                        shard.entry(id).or_default().push((i, coords));
                    }
                }
                Ok((shard, coarse))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut index = PointIndex::new();
    let mut coarse = 0;
    for (shard, c) in shards {
        coarse += c;
        for (id, points) in shard {
            index.entry(id).or_default().extend(points);
        }
    }

    if coarse > 0 {
        ctx.warn(&format!(
            "{} query timestamp(s) are coarser than the cube's time unit '{}'; \
             they were snapped to the start of their period",
            coarse,
            st.time_unit()
        ));
    }
    debug!(points = n, chunks = index.len(), "Indexed query points");
    Ok(index)
}

fn extract_values(
    cube: &dyn Cube,
    index: &PointIndex,
    ctx: &ExecutionContext,
) -> Vec<(usize, Vec<f64>)> {
    let chunk_ids: Vec<ChunkId> = index.keys().copied().collect();
    if chunk_ids.is_empty() {
        return Vec::new();
    }
    let workers = ctx.max_threads().min(chunk_ids.len());
    let step = 1.0 / chunk_ids.len() as f64;
    let total = cube.count_chunks();

    ctx.pool().install(|| {
        (0..workers)
            .into_par_iter()
            .flat_map_iter(|w| {
                let mut found = Vec::new();
                for &id in chunk_ids.iter().skip(w).step_by(workers) {
                    if id < total {
                        match read_points(cube, id, &index[&id]) {
                            Ok(values) => found.extend(values),
                            Err(e) => {
                                let e = e.in_chunk(id);
                                debug!(chunk_id = id, error = %e, "Skipping chunk");
                                ctx.error(&e.to_string());
                            }
                        }
                    }
                    ctx.progress().increment(step);
                }
                found
            })
            .collect()
    })
}

/// Values of all bands at the given points of one chunk.
fn read_points(
    cube: &dyn Cube,
    id: ChunkId,
    points: &[(usize, ArrayCoords)],
) -> Result<Vec<(usize, Vec<f64>)>> {
    let chunk = cube.read_chunk(id)?;
    if chunk.is_empty() {
        return Ok(Vec::new());
    }
    let low = cube.chunk_limits(id).low;

    Ok(points
        .iter()
        .filter_map(|(i, c)| local_offset(&chunk, low, c).map(|o| (*i, o)))
        .map(|(i, (t, y, x))| {
            let values = (0..chunk.count_bands())
                .map(|b| chunk.value(b, t, y, x))
                .collect();
            (i, values)
        })
        .collect())
}

/// Local `(t, y, x)` of fractional coordinates inside a chunk whose lowest
/// array indices are `low`. Row 0 of the chunk is its top row.
fn local_offset(
    chunk: &ChunkData,
    low: [u32; 3],
    c: &ArrayCoords,
) -> Option<(usize, usize, usize)> {
    let t = (c.it.floor() as u32).checked_sub(low[0])? as usize;
    let y_up = (c.iy.floor() as u32).checked_sub(low[1])? as usize;
    let x = (c.ix.floor() as u32).checked_sub(low[2])? as usize;
    let y = chunk.size_y().checked_sub(1)?.checked_sub(y_up)?;
    (t < chunk.size_t() && y < chunk.size_y() && x < chunk.size_x()).then_some((t, y, x))
}
