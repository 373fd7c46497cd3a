//! Vector datasets: feature layers read by the zonal engine and written as
//! its results.
//!
//! The engines only see the [`VectorDriver`], [`VectorDataset`],
//! [`VectorLayer`] and [`VectorWriter`] traits. [`MemoryDataset`] holds
//! layers in memory; [`GeoJsonDriver`] loads FeatureCollections into it and
//! writes result collections.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use datacube::{CubeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::geometry::{Geometry, GeometryType};

/// Default CRS of GeoJSON files without a `crs` member.
pub const GEOJSON_DEFAULT_SRS: &str = "EPSG:4326";

/// A feature with its stable identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub fid: i64,
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(fid: i64, geometry: Geometry) -> Self {
        Self {
            fid,
            geometry: Some(geometry),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// A named collection of features sharing a CRS.
pub trait VectorLayer: Send + Sync {
    fn name(&self) -> &str;

    fn srs(&self) -> &str;

    /// Common geometry type of all features.
    fn geometry_type(&self) -> GeometryType;

    /// Name of the field carrying feature ids, if the layer has one.
    fn fid_column(&self) -> Option<&str>;

    /// Whether [`VectorLayer::feature`] is cheaper than a scan.
    fn supports_random_read(&self) -> bool;

    fn features(&self) -> Box<dyn Iterator<Item = &Feature> + '_>;

    fn feature(&self, fid: i64) -> Option<&Feature>;

    fn feature_count(&self) -> usize;
}

/// An opened vector source with one or more layers.
pub trait VectorDataset: Send + Sync {
    fn layer_count(&self) -> usize;

    fn layer(&self, index: usize) -> Option<&dyn VectorLayer>;

    fn layer_by_name(&self, name: &str) -> Option<&dyn VectorLayer>;
}

/// Sink for one output layer. Fields are declared before features.
pub trait VectorWriter {
    fn create_field(&mut self, name: &str) -> Result<()>;

    /// Add a feature with one value per declared field.
    fn create_feature(&mut self, fid: i64, values: &[f64], geometry: Option<&Geometry>)
        -> Result<()>;

    /// Flush to disk and return the written path.
    fn close(self: Box<Self>) -> Result<PathBuf>;
}

/// Opens and creates vector datasets of one format.
pub trait VectorDriver: Send + Sync {
    /// File extension of created datasets, without the dot.
    fn extension(&self) -> &str;

    fn open(&self, path: &Path) -> Result<Box<dyn VectorDataset>>;

    fn create(
        &self,
        path: &Path,
        layer_name: &str,
        srs: &str,
        geometry_type: GeometryType,
    ) -> Result<Box<dyn VectorWriter>>;
}

/// In-memory layer.
#[derive(Debug, Clone)]
pub struct MemoryLayer {
    name: String,
    srs: String,
    fid_column: Option<String>,
    random_read: bool,
    features: Vec<Feature>,
    index: HashMap<i64, usize>,
}

impl MemoryLayer {
    /// Create an empty layer with an `id` FID column and random access.
    pub fn new(name: impl Into<String>, srs: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            srs: srs.into(),
            fid_column: Some("id".to_string()),
            random_read: true,
            features: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a feature. A feature with an existing FID replaces the old one.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.push(feature);
        self
    }

    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        for feature in features {
            self.push(feature);
        }
        self
    }

    pub fn with_fid_column(mut self, column: Option<&str>) -> Self {
        self.fid_column = column.map(str::to_string);
        self
    }

    pub fn with_random_read(mut self, random_read: bool) -> Self {
        self.random_read = random_read;
        self
    }

    pub fn push(&mut self, feature: Feature) {
        match self.index.get(&feature.fid) {
            Some(&i) => self.features[i] = feature,
            None => {
                self.index.insert(feature.fid, self.features.len());
                self.features.push(feature);
            }
        }
    }
}

impl VectorLayer for MemoryLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn srs(&self) -> &str {
        &self.srs
    }

    fn geometry_type(&self) -> GeometryType {
        let mut types = self
            .features
            .iter()
            .filter_map(|f| f.geometry.as_ref().map(Geometry::geometry_type));
        match types.next() {
            Some(first) => types.fold(first, GeometryType::merge),
            None => GeometryType::Unknown,
        }
    }

    fn fid_column(&self) -> Option<&str> {
        self.fid_column.as_deref()
    }

    fn supports_random_read(&self) -> bool {
        self.random_read
    }

    fn features(&self) -> Box<dyn Iterator<Item = &Feature> + '_> {
        Box::new(self.features.iter())
    }

    fn feature(&self, fid: i64) -> Option<&Feature> {
        self.index.get(&fid).map(|&i| &self.features[i])
    }

    fn feature_count(&self) -> usize {
        self.features.len()
    }
}

/// In-memory dataset.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    layers: Vec<MemoryLayer>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: MemoryLayer) -> Self {
        self.layers.push(layer);
        self
    }
}

impl VectorDataset for MemoryDataset {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer(&self, index: usize) -> Option<&dyn VectorLayer> {
        self.layers.get(index).map(|l| l as &dyn VectorLayer)
    }

    fn layer_by_name(&self, name: &str) -> Option<&dyn VectorLayer> {
        self.layers
            .iter()
            .find(|l| l.name == name)
            .map(|l| l as &dyn VectorLayer)
    }
}

// GeoJSON document layout

#[derive(Debug, Serialize, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<NamedCrs>,
    features: Vec<GeoJsonFeature>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NamedCrs {
    #[serde(rename = "type")]
    type_: String,
    properties: NamedCrsProperties,
}

#[derive(Debug, Serialize, Deserialize)]
struct NamedCrsProperties {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeoJsonFeature {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    geometry: Option<Geometry>,
}

/// Reads and writes GeoJSON FeatureCollections.
///
/// A collection is one layer named after its `name` member (or the file
/// stem). Integer feature `id`s become FIDs; if any feature lacks one the
/// layer has no FID column.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoJsonDriver;

impl GeoJsonDriver {
    /// Parse a FeatureCollection document.
    pub fn parse(json: &str, default_name: &str) -> Result<MemoryDataset> {
        let collection: FeatureCollection = serde_json::from_str(json)?;
        if collection.type_ != "FeatureCollection" {
            return Err(CubeError::invalid_argument(format!(
                "expected a GeoJSON FeatureCollection, found '{}'",
                collection.type_
            )));
        }

        let ids: Vec<Option<i64>> = collection
            .features
            .iter()
            .map(|f| f.id.as_ref().and_then(Value::as_i64))
            .collect();
        let has_fids = ids.iter().all(Option::is_some);

        let name = collection
            .name
            .unwrap_or_else(|| default_name.to_string());
        let srs = collection
            .crs
            .map(|c| c.properties.name)
            .unwrap_or_else(|| GEOJSON_DEFAULT_SRS.to_string());

        let mut layer = MemoryLayer::new(name, srs);
        if !has_fids {
            layer = layer.with_fid_column(None);
        }
        for (i, (feature, id)) in collection.features.into_iter().zip(ids).enumerate() {
            layer.push(Feature {
                fid: id.unwrap_or(i as i64),
                geometry: feature.geometry,
                properties: feature.properties.unwrap_or_default(),
            });
        }

        debug!(
            layer = layer.name(),
            features = layer.feature_count(),
            fid_column = has_fids,
            "Parsed GeoJSON layer"
        );
        Ok(MemoryDataset::new().with_layer(layer))
    }
}

impl VectorDriver for GeoJsonDriver {
    fn extension(&self) -> &str {
        "geojson"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VectorDataset>> {
        let json = std::fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Box::new(Self::parse(&json, &stem)?))
    }

    fn create(
        &self,
        path: &Path,
        layer_name: &str,
        srs: &str,
        _geometry_type: GeometryType,
    ) -> Result<Box<dyn VectorWriter>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(CubeError::precondition(format!(
                    "output directory '{}' does not exist",
                    parent.display()
                )));
            }
        }
        Ok(Box::new(GeoJsonWriter {
            path: path.to_path_buf(),
            name: layer_name.to_string(),
            srs: srs.to_string(),
            fields: Vec::new(),
            features: Vec::new(),
        }))
    }
}

struct GeoJsonWriter {
    path: PathBuf,
    name: String,
    srs: String,
    fields: Vec<String>,
    features: Vec<GeoJsonFeature>,
}

impl VectorWriter for GeoJsonWriter {
    fn create_field(&mut self, name: &str) -> Result<()> {
        if !self.features.is_empty() {
            return Err(CubeError::precondition(format!(
                "cannot add field '{}' after features were written",
                name
            )));
        }
        if self.fields.iter().any(|f| f == name) {
            return Err(CubeError::invalid_argument(format!(
                "duplicate field '{}'",
                name
            )));
        }
        self.fields.push(name.to_string());
        Ok(())
    }

    fn create_feature(
        &mut self,
        fid: i64,
        values: &[f64],
        geometry: Option<&Geometry>,
    ) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(CubeError::invalid_argument(format!(
                "feature {} has {} values for {} fields",
                fid,
                values.len(),
                self.fields.len()
            )));
        }

        let properties = self
            .fields
            .iter()
            .zip(values)
            .map(|(name, v)| {
                let value = serde_json::Number::from_f64(*v)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();

        self.features.push(GeoJsonFeature {
            type_: "Feature".to_string(),
            id: Some(Value::from(fid)),
            properties: Some(properties),
            geometry: geometry.cloned(),
        });
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<PathBuf> {
        let count = self.features.len();
        let collection = FeatureCollection {
            type_: "FeatureCollection".to_string(),
            name: Some(self.name),
            crs: Some(NamedCrs {
                type_: "name".to_string(),
                properties: NamedCrsProperties { name: self.srs },
            }),
            features: self.features,
        };
        let json = serde_json::to_string_pretty(&collection)?;
        std::fs::write(&self.path, json)?;
        debug!(
            path = %self.path.display(),
            features = count,
            "Wrote GeoJSON layer"
        );
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube_common::BoundingBox;

    const ZONES: &str = r#"{
        "type": "FeatureCollection",
        "name": "zones",
        "crs": { "type": "name", "properties": { "name": "EPSG:3857" } },
        "features": [
            { "type": "Feature", "id": 7, "properties": { "label": "a" },
              "geometry": { "type": "Polygon",
                            "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]] } },
            { "type": "Feature", "id": 3, "properties": null,
              "geometry": { "type": "MultiPolygon",
                            "coordinates": [[[[2,2],[4,2],[4,4],[2,4],[2,2]]]] } }
        ]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let dataset = GeoJsonDriver::parse(ZONES, "fallback").unwrap();
        assert_eq!(dataset.layer_count(), 1);
        let layer = dataset.layer_by_name("zones").unwrap();
        assert_eq!(layer.srs(), "EPSG:3857");
        assert_eq!(layer.fid_column(), Some("id"));
        assert_eq!(layer.geometry_type(), GeometryType::MultiPolygon);
        assert_eq!(layer.feature_count(), 2);

        let fids: Vec<i64> = layer.features().map(|f| f.fid).collect();
        assert_eq!(fids, vec![7, 3]);
        assert_eq!(layer.feature(7).unwrap().properties["label"], "a");
        assert!(layer.feature(4).is_none());
    }

    #[test]
    fn test_missing_ids_and_crs() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1,2]}}]}"#;
        let dataset = GeoJsonDriver::parse(json, "points").unwrap();
        let layer = dataset.layer(0).unwrap();
        assert_eq!(layer.name(), "points");
        assert_eq!(layer.srs(), GEOJSON_DEFAULT_SRS);
        assert_eq!(layer.fid_column(), None);
        assert_eq!(layer.geometry_type(), GeometryType::Point);
    }

    #[test]
    fn test_rejects_non_collection() {
        let json = r#"{"type":"Feature","features":[]}"#;
        assert!(matches!(
            GeoJsonDriver::parse(json, "x"),
            Err(CubeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_write_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        let zone = Geometry::rect(&BoundingBox::new(0.0, 0.0, 1.0, 1.0));

        let mut writer = GeoJsonDriver
            .create(&path, "zones", "EPSG:4326", GeometryType::Polygon)
            .unwrap();
        writer.create_field("ndvi_mean").unwrap();
        writer.create_field("ndvi_count").unwrap();
        writer
            .create_feature(12, &[0.5, 3.0], Some(&zone))
            .unwrap();
        writer
            .create_feature(13, &[f64::NAN, 0.0], Some(&zone))
            .unwrap();
        assert!(writer.create_feature(14, &[1.0], None).is_err());
        let written = writer.close().unwrap();
        assert_eq!(written, path);

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["name"], "zones");
        assert_eq!(doc["crs"]["properties"]["name"], "EPSG:4326");
        assert_eq!(doc["features"][0]["id"], 12);
        assert_eq!(doc["features"][0]["properties"]["ndvi_mean"], 0.5);
        assert!(doc["features"][1]["properties"]["ndvi_mean"].is_null());
        assert_eq!(doc["features"][1]["geometry"]["type"], "Polygon");

        // Reads back as a layer with the same FIDs
        let reread = GeoJsonDriver.open(&path).unwrap();
        let layer = reread.layer(0).unwrap();
        assert_eq!(layer.features().map(|f| f.fid).collect::<Vec<_>>(), vec![12, 13]);
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.geojson");
        assert!(matches!(
            GeoJsonDriver.create(&path, "x", "EPSG:4326", GeometryType::Polygon),
            Err(CubeError::Precondition(_))
        ));
    }

    #[test]
    fn test_memory_layer_options() {
        let layer = MemoryLayer::new("l", "EPSG:4326")
            .with_feature(Feature::new(
                1,
                Geometry::rect(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            ))
            .with_random_read(false);
        assert!(!layer.supports_random_read());
        assert_eq!(layer.geometry_type(), GeometryType::Polygon);
        assert_eq!(MemoryLayer::new("e", "EPSG:4326").geometry_type(), GeometryType::Unknown);
    }
}
