//! Collection registry (C15): a static `collection_name -> {vector_index_id,
//! lexical_index_id}` map loaded once at startup from a JSON file. Never
//! mutated at runtime by the core.

use crate::domain::CollectionEntry;
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CollectionRegistry {
    entries: HashMap<String, CollectionEntry>,
}

impl CollectionRegistry {
    pub fn from_entries(entries: HashMap<String, CollectionEntry>) -> Self {
        Self { entries }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read collection registry {}: {e}",
                path.display()
            ))
        })?;
        let entries: HashMap<String, CollectionEntry> = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid collection registry JSON: {e}")))?;
        tracing::info!(collections = entries.len(), "loaded collection registry");
        Ok(Self { entries })
    }

    pub fn resolve(&self, collection_name: &str) -> Result<&CollectionEntry> {
        self.entries
            .get(collection_name)
            .ok_or_else(|| Error::UnknownCollection(collection_name.to_string()))
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> CollectionRegistry {
        let mut entries = HashMap::new();
        entries.insert(
            "btp".to_string(),
            CollectionEntry {
                vector_index_id: "btp_v".to_string(),
                lexical_index_id: "btp_l".to_string(),
            },
        );
        CollectionRegistry::from_entries(entries)
    }

    #[test]
    fn resolves_known_collection() {
        let registry = sample_registry();
        let entry = registry.resolve("btp").unwrap();
        assert_eq!(entry.vector_index_id, "btp_v");
    }

    #[test]
    fn unknown_collection_errors() {
        let registry = sample_registry();
        assert!(matches!(
            registry.resolve("missing"),
            Err(Error::UnknownCollection(_))
        ));
    }
}
