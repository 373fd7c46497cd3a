//! GeoJSON zone fixtures.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// GeoJSON feature with an axis-aligned square polygon.
pub fn square_zone(fid: i64, left: f64, bottom: f64, size: f64) -> Value {
    rect_zone(fid, left, bottom, left + size, bottom + size)
}

/// GeoJSON feature with an axis-aligned rectangle polygon.
pub fn rect_zone(fid: i64, left: f64, bottom: f64, right: f64, top: f64) -> Value {
    json!({
        "type": "Feature",
        "id": fid,
        "properties": { "name": format!("zone-{}", fid) },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [left, bottom],
                [right, bottom],
                [right, top],
                [left, top],
                [left, bottom]
            ]]
        }
    })
}

/// FeatureCollection document named `name` in `srs`.
pub fn zones_geojson(name: &str, srs: &str, features: Vec<Value>) -> String {
    json!({
        "type": "FeatureCollection",
        "name": name,
        "crs": { "type": "name", "properties": { "name": srs } },
        "features": features
    })
    .to_string()
}

/// Write `content` to `dir/file_name` and return the path.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_fixture(dir: &Path, file_name: &str, content: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Parse a JSON file written by a test.
///
/// # Panics
///
/// Panics if the file is missing or not JSON.
pub fn read_json(path: &Path) -> Value {
    let text = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}
