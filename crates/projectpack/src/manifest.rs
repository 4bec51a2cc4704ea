//! Defines `project.json`, the manifest stored next to the shader inside a
//! project archive.
//!
//! Types:
//!
//! - `ProjectManifest` carries output/view dimensions and the texture table in
//!   the camelCase layout the browser sandbox has always written.
//! - `TextureTable` maps texture names to source labels and keeps document
//!   order, which decides texture-unit assignment after a reload.
//!
//! Functions:
//!
//! - `ProjectManifest::validate` returns human-readable dimension issues so
//!   importers can report them without failing the whole load.
use std::fmt;

use serde::de::{self, MapAccess};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub output_width: u32,
    #[serde(default)]
    pub output_height: u32,
    #[serde(default)]
    pub view_width: u32,
    #[serde(default)]
    pub view_height: u32,
    #[serde(default)]
    pub textures: TextureTable,
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

impl ProjectManifest {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.output_width == 0 || self.output_height == 0 {
            issues.push(format!(
                "output size {}x{} must be positive",
                self.output_width, self.output_height
            ));
        }
        if self.view_width == 0 || self.view_height == 0 {
            issues.push(format!(
                "view size {}x{} must be positive",
                self.view_width, self.view_height
            ));
        }
        issues
    }
}

/// Ordered `name -> source label` table.
///
/// Serialized as a plain JSON object. Inserting an existing name replaces its
/// label in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureTable(Vec<(String, String)>);

impl TextureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, label: impl Into<String>) -> Option<String> {
        let name = name.into();
        let label = label.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, label)),
            None => {
                self.0.push((name, label));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, label)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, label)| (name.as_str(), label.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>, L: Into<String>> FromIterator<(N, L)> for TextureTable {
    fn from_iter<I: IntoIterator<Item = (N, L)>>(iter: I) -> Self {
        let mut table = TextureTable::new();
        for (name, label) in iter {
            table.insert(name, label);
        }
        table
    }
}

impl Serialize for TextureTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, label) in &self.0 {
            map.serialize_entry(name, label)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TextureTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl<'de> de::Visitor<'de> for Visitor {
            type Value = TextureTable;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of texture names to source labels")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut table = TextureTable::new();
                while let Some((name, label)) = access.next_entry::<String, String>()? {
                    table.insert(name, label);
                }
                Ok(table)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(TextureTable::new())
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}
