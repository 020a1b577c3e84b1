use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One non-null cell delivered by the host. Missing cells are `None` at the column level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Finite numeric reading of the cell. Numeric text counts, blank text does not.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            CellValue::Integer(value) => *value as f64,
            CellValue::Number(value) => *value,
            CellValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok()?
            }
        };
        value.is_finite().then_some(value)
    }

    /// Integral reading, used for region-number lookups.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(value) => Some(*value),
            CellValue::Number(value) if value.is_finite() && value.fract() == 0.0 => {
                Some(*value as i64)
            }
            CellValue::Number(_) => None,
            CellValue::Text(text) => text.trim().parse::<i64>().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(value) => write!(f, "{value}"),
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

pub type Column = Vec<Option<CellValue>>;

/// Columnar dataset keyed by column id.
///
/// Column order is the order in which keys were first seen. The metric
/// fallback depends on it, so (de)serialization keeps it as-is instead of
/// going through a sorted map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    columns: Vec<(String, Column)>,
}

impl RawDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`RawDataset::insert`].
    pub fn with_column<K, I>(mut self, key: K, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = Option<CellValue>>,
    {
        self.insert(key, values);
        self
    }

    /// Replaces an existing column in place, or appends a new one.
    pub fn insert<K, I>(&mut self, key: K, values: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = Option<CellValue>>,
    {
        let key = key.into();
        let values: Column = values.into_iter().collect();
        match self.columns.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, column)) => *column = values,
            None => self.columns.push((key, values)),
        }
    }

    pub fn column(&self, key: &str) -> Option<&[Option<CellValue>]> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, column)| column.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(key, _)| key.as_str())
    }

    pub fn last_key(&self) -> Option<&str> {
        self.columns.last().map(|(key, _)| key.as_str())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Length of the longest column. Hosts send equal-length columns.
    pub fn row_count(&self) -> usize {
        self.columns
            .iter()
            .map(|(_, column)| column.len())
            .max()
            .unwrap_or(0)
    }
}

impl Serialize for RawDataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (key, column) in &self.columns {
            map.serialize_entry(key, column)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RawDataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DatasetVisitor;

        impl<'de> Visitor<'de> for DatasetVisitor {
            type Value = RawDataset;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column keys to value arrays")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawDataset, A::Error> {
                let mut dataset = RawDataset::new();
                while let Some((key, column)) = access.next_entry::<String, Column>()? {
                    dataset.insert(key, column);
                }
                Ok(dataset)
            }
        }

        deserializer.deserialize_map(DatasetVisitor)
    }
}

/// Column bindings chosen in the host's editor panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub dma_id: Option<String>,
    #[serde(default)]
    pub dma_name: Option<String>,
    #[serde(default)]
    pub kpi: Option<String>,
}

impl Configuration {
    pub fn dma_id_column(&self) -> Option<&str> {
        binding(&self.dma_id)
    }

    pub fn dma_name_column(&self) -> Option<&str> {
        binding(&self.dma_name)
    }

    pub fn kpi_column(&self) -> Option<&str> {
        binding(&self.kpi)
    }

    pub fn has_identifier_binding(&self) -> bool {
        self.dma_id_column().is_some() || self.dma_name_column().is_some()
    }
}

fn binding(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|key| !key.trim().is_empty())
}

/// Everything the host delivers for one render cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostBinding {
    #[serde(default)]
    pub config: Configuration,
    #[serde(default)]
    pub data: Option<RawDataset>,
}

impl HostBinding {
    pub fn new(config: Configuration, data: Option<RawDataset>) -> Self {
        Self { config, data }
    }

    /// CRC32 of the JSON encoding. Identical deliveries share a fingerprint.
    pub fn fingerprint(&self) -> u32 {
        match serde_json::to_vec(self) {
            Ok(bytes) => crc32fast::hash(&bytes),
            Err(_) => 0,
        }
    }
}
