//! Named output channels of a cube.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CubeError, Result};

/// A single band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

impl Band {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Ordered, name-unique collection of bands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Band>", into = "Vec<Band>")]
pub struct BandCollection {
    bands: Vec<Band>,
    index: HashMap<String, usize>,
}

impl BandCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from band names, rejecting duplicates.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bands = Self::new();
        for name in names {
            bands.add(Band::new(name))?;
        }
        Ok(bands)
    }

    /// Append a band. Names must be unique.
    pub fn add(&mut self, band: Band) -> Result<()> {
        if self.index.contains_key(&band.name) {
            return Err(CubeError::invalid_argument(format!(
                "duplicate band name '{}'",
                band.name
            )));
        }
        self.index.insert(band.name.clone(), self.bands.len());
        self.bands.push(band);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Band> {
        self.index.get(name).map(|&i| &self.bands[i])
    }

    /// Dense index of a band by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get_index(&self, i: usize) -> Option<&Band> {
        self.bands.get(i)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> {
        self.bands.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }
}

impl TryFrom<Vec<Band>> for BandCollection {
    type Error = CubeError;

    fn try_from(value: Vec<Band>) -> Result<Self> {
        let mut bands = Self::new();
        for band in value {
            bands.add(band)?;
        }
        Ok(bands)
    }
}

impl From<BandCollection> for Vec<Band> {
    fn from(value: BandCollection) -> Self {
        value.bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_index() {
        let bands = BandCollection::from_names(["B04", "B08", "NDVI"]).unwrap();
        assert_eq!(bands.len(), 3);
        assert_eq!(bands.index_of("B08"), Some(1));
        assert_eq!(bands.get_index(2).unwrap().name, "NDVI");
        assert!(bands.has("NDVI"));
        assert!(!bands.has("ndvi"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        assert!(BandCollection::from_names(["a", "b", "a"]).is_err());
        assert!(serde_json::from_str::<BandCollection>(r#"[{"name":"a"},{"name":"a"}]"#).is_err());
    }

    #[test]
    fn test_serializes_as_list() {
        let mut bands = BandCollection::new();
        bands.add(Band::new("t2m").with_unit("K")).unwrap();
        bands.add(Band::new("mask")).unwrap();
        let json = serde_json::to_string(&bands).unwrap();
        assert_eq!(json, r#"[{"name":"t2m","unit":"K"},{"name":"mask"}]"#);
        let back: BandCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bands);
    }
}
