//! Construction records: serializable descriptions of cube graphs.
//!
//! Every node can describe itself (and, recursively, its inputs) as a
//! [`CubeRecord`]. [`CubeFactory`] turns a record back into a live graph.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::band::BandCollection;
use crate::chunk::ChunkShape;
use crate::config::CubeConfig;
use crate::cube::{Cube, DummyCube, MemoryCube, ReduceSpaceCube, ZarrCube};
use crate::error::Result;
use crate::st_reference::StReference;

/// Type tag + constructor parameters of a node, with nested input records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cube_type", rename_all = "snake_case")]
pub enum CubeRecord {
    Dummy {
        st_reference: StReference,
        chunk_size: ChunkShape,
        bands: BandCollection,
        #[serde(with = "json_f64")]
        fill: f64,
    },
    Memory {
        st_reference: StReference,
        chunk_size: ChunkShape,
        bands: BandCollection,
        #[serde(with = "json_f64_vec")]
        data: Vec<f64>,
    },
    Zarr {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_size: Option<ChunkShape>,
    },
    ReduceSpace {
        reducer_bands: Vec<(String, String)>,
        in_cube: Box<CubeRecord>,
    },
}

impl CubeRecord {
    /// The `cube_type` tag.
    pub fn cube_type(&self) -> &'static str {
        match self {
            CubeRecord::Dummy { .. } => "dummy",
            CubeRecord::Memory { .. } => "memory",
            CubeRecord::Zarr { .. } => "zarr",
            CubeRecord::ReduceSpace { .. } => "reduce_space",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Rebuilds cube graphs from construction records.
#[derive(Debug, Clone)]
pub struct CubeFactory {
    chunk_cache_bytes: usize,
}

impl Default for CubeFactory {
    fn default() -> Self {
        Self::from_config(&CubeConfig::default())
    }
}

impl CubeFactory {
    pub fn new(chunk_cache_bytes: usize) -> Self {
        Self { chunk_cache_bytes }
    }

    pub fn from_config(config: &CubeConfig) -> Self {
        Self::new(config.chunk_cache_size_bytes())
    }

    /// Build the graph described by `record`, inputs first.
    pub fn build(&self, record: &CubeRecord) -> Result<Arc<dyn Cube>> {
        debug!(cube_type = record.cube_type(), "Building cube from record");
        let cube: Arc<dyn Cube> = match record {
            CubeRecord::Dummy {
                st_reference,
                chunk_size,
                bands,
                fill,
            } => DummyCube::create(st_reference.clone(), *chunk_size, bands.clone(), *fill)?,
            CubeRecord::Memory {
                st_reference,
                chunk_size,
                bands,
                data,
            } => {
                MemoryCube::create(st_reference.clone(), *chunk_size, bands.clone(), data.clone())?
            }
            CubeRecord::Zarr { path, chunk_size } => {
                ZarrCube::open(path, *chunk_size, self.chunk_cache_bytes)?
            }
            CubeRecord::ReduceSpace {
                reducer_bands,
                in_cube,
            } => ReduceSpaceCube::create(self.build(in_cube)?, reducer_bands.clone())?,
        };
        Ok(cube)
    }

    pub fn from_json(&self, json: &str) -> Result<Arc<dyn Cube>> {
        self.build(&CubeRecord::from_json(json)?)
    }

    pub fn from_file(&self, path: impl AsRef<Path>) -> Result<Arc<dyn Cube>> {
        let json = std::fs::read_to_string(path)?;
        self.from_json(&json)
    }
}

/// JSON has no non-finite numbers: NaN is written as `null`, infinities as
/// the strings `"inf"` and `"-inf"`.
mod json_f64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    pub(super) enum Encoded {
        Number(f64),
        Text(String),
        Missing(Option<()>),
    }

    pub(super) fn encode(value: f64) -> Encoded {
        if value.is_nan() {
            Encoded::Missing(None)
        } else if value == f64::INFINITY {
            Encoded::Text("inf".to_string())
        } else if value == f64::NEG_INFINITY {
            Encoded::Text("-inf".to_string())
        } else {
            Encoded::Number(value)
        }
    }

    pub(super) fn decode<E: Error>(encoded: Encoded) -> Result<f64, E> {
        match encoded {
            Encoded::Number(v) => Ok(v),
            Encoded::Missing(_) => Ok(f64::NAN),
            Encoded::Text(text) => match text.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(E::custom(format!("invalid number '{}'", other))),
            },
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        encode(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        decode(Encoded::deserialize(deserializer)?)
    }
}

mod json_f64_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::json_f64::{decode, encode, Encoded};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| encode(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Encoded>::deserialize(deserializer)?
            .into_iter()
            .map(decode)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube_common::{BoundingBox, DateTime, Duration};

    fn st() -> StReference {
        StReference::new(
            BoundingBox::new(0.0, 0.0, 2.0, 2.0),
            2,
            2,
            "EPSG:3857",
            DateTime::parse("2021-01").unwrap(),
            DateTime::parse("2021-03").unwrap(),
            Duration::parse("P1M").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = CubeRecord::ReduceSpace {
            reducer_bands: vec![("median".into(), "x".into())],
            in_cube: Box::new(CubeRecord::Memory {
                st_reference: st(),
                chunk_size: ChunkShape::new(1, 1, 2),
                bands: BandCollection::from_names(["x"]).unwrap(),
                data: (0..12).map(f64::from).collect(),
            }),
        };
        let json = record.to_json().unwrap();
        assert!(json.contains("\"cube_type\": \"reduce_space\""));
        assert!(json.contains("\"cube_type\": \"memory\""));
        assert_eq!(CubeRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn test_nan_written_as_null() {
        let record = CubeRecord::Dummy {
            st_reference: st(),
            chunk_size: ChunkShape::new(1, 1, 1),
            bands: BandCollection::from_names(["x"]).unwrap(),
            fill: f64::NAN,
        };
        let json = record.to_json().unwrap();
        assert!(json.contains("\"fill\": null"));
        match CubeRecord::from_json(&json).unwrap() {
            CubeRecord::Dummy { fill, .. } => assert!(fill.is_nan()),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_infinities_survive_roundtrip() {
        let dummy = DummyCube::create(
            st(),
            ChunkShape::new(1, 1, 1),
            BandCollection::from_names(["x"]).unwrap(),
            f64::INFINITY,
        )
        .unwrap();
        let json = dummy.to_record().to_json().unwrap();
        assert!(json.contains("\"fill\": \"inf\""));
        assert_eq!(CubeRecord::from_json(&json).unwrap(), dummy.to_record());

        let original = MemoryCube::create(
            st(),
            ChunkShape::new(3, 2, 2),
            BandCollection::from_names(["x"]).unwrap(),
            [f64::NEG_INFINITY, 1.5, f64::NAN, f64::INFINITY].repeat(3),
        )
        .unwrap();
        let rebuilt = CubeFactory::default()
            .from_json(&original.to_record().to_json().unwrap())
            .unwrap();
        let chunk = rebuilt.read_chunk(0).unwrap();
        assert_eq!(chunk.values()[0], f64::NEG_INFINITY);
        assert_eq!(chunk.values()[3], f64::INFINITY);
        assert!(chunk.bit_eq(&original.read_chunk(0).unwrap()));
    }

    #[test]
    fn test_invalid_number_text_rejected() {
        let json = r#"{"cube_type":"dummy","chunk_size":{"t":1,"y":1,"x":1},"bands":[{"name":"x"}],
            "fill":"lots","st_reference":{"left":0,"right":1,"bottom":0,"top":1,"nx":1,"ny":1,
            "srs":"EPSG:4326","t0":"2020","t1":"2020","dt":"P1Y"}}"#;
        assert!(CubeRecord::from_json(json).is_err());
    }

    #[test]
    fn test_factory_rebuilds_graph() {
        let source = DummyCube::create(
            st(),
            ChunkShape::new(2, 1, 1),
            BandCollection::from_names(["x"]).unwrap(),
            2.0,
        )
        .unwrap();
        let reduced =
            ReduceSpaceCube::create(source, vec![("sum".into(), "x".into())]).unwrap();

        let record = reduced.to_record();
        let rebuilt = CubeFactory::default().build(&record).unwrap();
        assert_eq!(rebuilt.to_record(), record);
        assert_eq!(rebuilt.bands().names(), vec!["x_sum"]);
        assert_eq!(rebuilt.read_chunk(0).unwrap().values(), &[8.0, 8.0]);
        assert_eq!(rebuilt.links().parents()[0].links().children().len(), 1);
    }

    #[test]
    fn test_factory_rejects_invalid_record() {
        let json = r#"{"cube_type":"reduce_space","reducer_bands":[["mode","x"]],
            "in_cube":{"cube_type":"dummy","chunk_size":{"t":1,"y":1,"x":1},
            "bands":[{"name":"x"}],"fill":1.0,
            "st_reference":{"left":0,"right":1,"bottom":0,"top":1,"nx":1,"ny":1,"srs":"EPSG:4326",
            "t0":"2020","t1":"2020","dt":"P1Y"}}}"#;
        assert!(matches!(
            CubeFactory::default().from_json(json),
            Err(crate::error::CubeError::InvalidArgument(_))
        ));
        assert!(CubeFactory::default().from_json(r#"{"cube_type":"nope"}"#).is_err());
    }
}
