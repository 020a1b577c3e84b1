use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dataset::CellValue;

/// DMA number ↔ name pair as found in boundary-layer metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub dma_id: i64,
    pub dma_name: String,
}

/// Lookup table between DMA numbers and human-readable names.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    names: HashMap<i64, String>,
    ids: HashMap<String, i64>,
}

impl RegionCatalog {
    /// Later entries win on duplicate ids. Blank names are skipped.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let mut catalog = Self::default();
        for entry in entries {
            let name = entry.dma_name.trim();
            if name.is_empty() {
                continue;
            }
            catalog.ids.insert(normalize_name(name), entry.dma_id);
            catalog.names.insert(entry.dma_id, name.to_owned());
        }
        catalog
    }

    /// Parses a JSON array of `{ "dma_id": .., "dma_name": .. }`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let entries: Vec<CatalogEntry> = serde_json::from_slice(bytes)?;
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name_for_id(&self, dma_id: i64) -> Option<&str> {
        self.names.get(&dma_id).map(String::as_str)
    }

    /// Case-insensitive, whitespace-trimmed name lookup.
    pub fn id_for_name(&self, name: &str) -> Option<i64> {
        self.ids.get(&normalize_name(name)).copied()
    }

    /// Canonical name for a region key, whether the key is a number or a name.
    pub fn region_name(&self, key: &CellValue) -> Option<&str> {
        if let Some(dma_id) = key.as_integer() {
            return self.name_for_id(dma_id);
        }
        key.as_text()
            .and_then(|name| self.id_for_name(name))
            .and_then(|dma_id| self.name_for_id(dma_id))
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
