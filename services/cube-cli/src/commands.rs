//! Subcommand implementations.

use std::path::Path;

use anyhow::{bail, Context, Result};
use datacube::{write_cube_zarr, Cube, ExecutionContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use vector_queries::{query_points, zonal_statistics, Capabilities, ZonalQuery};

/// One query point as read from the input file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointInput {
    pub x: f64,
    pub y: f64,
    pub t: String,
}

/// Band values at one query point; missing values are `null`.
#[derive(Debug, Serialize)]
pub struct PointOutput {
    pub x: f64,
    pub y: f64,
    pub t: String,
    pub values: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct Description {
    size: [u32; 4],
    chunk_size: datacube::ChunkShape,
    count_chunks: u32,
    bands: Vec<String>,
    srs: String,
    t0: String,
    t1: String,
    dt: String,
    record: datacube::CubeRecord,
}

pub fn describe(cube: &dyn Cube) -> Result<String> {
    let st = cube.st_reference();
    let description = Description {
        size: cube.size(),
        chunk_size: cube.chunk_size(),
        count_chunks: cube.count_chunks(),
        bands: cube.bands().names(),
        srs: st.srs.clone(),
        t0: st.t0.to_string(),
        t1: st.t1.to_string(),
        dt: st.dt.to_string(),
        record: cube.to_record(),
    };
    Ok(serde_json::to_string_pretty(&description)?)
}

/// Parse a JSON array of `{x, y, t}` objects.
pub fn parse_points(json: &str) -> Result<Vec<PointInput>> {
    let points: Vec<PointInput> =
        serde_json::from_str(json).context("points must be a JSON array of {x, y, t}")?;
    if points.is_empty() {
        bail!("no query points given");
    }
    Ok(points)
}

pub fn points(
    cube: &dyn Cube,
    points: Vec<PointInput>,
    srs: &str,
    ctx: &ExecutionContext,
) -> Result<Vec<PointOutput>> {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let ts: Vec<String> = points.iter().map(|p| p.t.clone()).collect();

    let values = query_points(cube, &xs, &ys, &ts, srs, ctx, &Capabilities::default())
        .context("point query failed")?;
    let bands = cube.bands().names();

    Ok(points
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let values = bands
                .iter()
                .zip(&values)
                .map(|(name, band)| {
                    let v = serde_json::Number::from_f64(band[i])
                        .map(Value::Number)
                        .unwrap_or(Value::Null);
                    (name.clone(), v)
                })
                .collect();
            PointOutput {
                x: p.x,
                y: p.y,
                t: p.t,
                values,
            }
        })
        .collect())
}

/// Parse `statistic:band` arguments.
pub fn parse_stats(args: &[String]) -> Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| {
            arg.split_once(':')
                .filter(|(s, b)| !s.is_empty() && !b.is_empty())
                .map(|(s, b)| (s.to_string(), b.to_string()))
                .with_context(|| format!("invalid statistic '{}', expected <stat>:<band>", arg))
        })
        .collect()
}

pub fn zonal(
    cube: &dyn Cube,
    zones: &Path,
    query: &ZonalQuery,
    ctx: &ExecutionContext,
) -> Result<Vec<String>> {
    std::fs::create_dir_all(&query.out_dir)
        .with_context(|| format!("failed to create {}", query.out_dir.display()))?;
    let files = zonal_statistics(cube, zones, query, ctx, &Capabilities::default())
        .context("zonal statistics failed")?;
    Ok(files.iter().map(|p| p.display().to_string()).collect())
}

pub fn export(cube: &dyn Cube, out: &Path) -> Result<String> {
    let result = write_cube_zarr(cube, out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!(
        path = %out.display(),
        chunks_written = result.chunks_written,
        chunks_empty = result.chunks_empty,
        "Exported cube"
    );
    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "path": out.display().to_string(),
        "shape": result.shape,
        "chunks_written": result.chunks_written,
        "chunks_empty": result.chunks_empty,
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacube::{BandCollection, ChunkShape, MemoryCube, StReference};

    fn cube() -> std::sync::Arc<MemoryCube> {
        let st: StReference = serde_json::from_str(
            r#"{"left":0,"right":2,"bottom":0,"top":2,"nx":2,"ny":2,"srs":"EPSG:3857",
                "t0":"2022-03-01","t1":"2022-03-01","dt":"P1D"}"#,
        )
        .unwrap();
        MemoryCube::create(
            st,
            ChunkShape::new(1, 2, 2),
            BandCollection::from_names(["b"]).unwrap(),
            vec![1.0, 2.0, 3.0, f64::NAN],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_stats() {
        let stats = parse_stats(&["mean:NDVI".to_string(), "count:B04".to_string()]).unwrap();
        assert_eq!(
            stats,
            vec![
                ("mean".to_string(), "NDVI".to_string()),
                ("count".to_string(), "B04".to_string())
            ]
        );
        assert!(parse_stats(&["mean".to_string()]).is_err());
        assert!(parse_stats(&[":b".to_string()]).is_err());
    }

    #[test]
    fn test_points_output() {
        let input = parse_points(
            r#"[{"x":0.5,"y":1.5,"t":"2022-03-01"},{"x":1.5,"y":0.5,"t":"2022-03-01"},
                {"x":9,"y":9,"t":"2022-03-01"}]"#,
        )
        .unwrap();
        let ctx = ExecutionContext::new(2).unwrap();
        let out = points(&*cube(), input, "EPSG:3857", &ctx).unwrap();
        assert_eq!(out[0].values["b"], 1.0);
        assert!(out[1].values["b"].is_null());
        assert!(out[2].values["b"].is_null());
        assert!(parse_points("[]").is_err());
    }

    #[test]
    fn test_describe_and_export() {
        let cube = cube();
        let text = describe(&*cube).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["size"], serde_json::json!([1, 1, 2, 2]));
        assert_eq!(doc["record"]["cube_type"], "memory");

        let dir = tempfile::tempdir().unwrap();
        let summary = export(&*cube, &dir.path().join("c.zarr")).unwrap();
        assert!(summary.contains("\"chunks_written\": 1"));
    }
}
