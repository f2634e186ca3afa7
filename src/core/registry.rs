//! Dataset registry.
//!
//! Maps the public dataset identifier used in the URL path to the backend
//! index, the export path and the field metadata the translator needs. Built
//! once at startup and shared read-only afterwards.
use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::{
    config::models::DatasetConfig,
    core::error::{ProxyError, ProxyResult},
};

/// Query parameters with a fixed meaning; never usable as dataset fields.
pub const RESERVED_PARAMS: [&str; 3] = ["sort", "page", "export"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate dataset id '{0}'")]
    DuplicateId(String),

    #[error("dataset '{dataset}' declares reserved parameter '{field}' as a field")]
    ReservedField { dataset: String, field: String },

    #[error("dataset '{dataset}' has an empty {field}")]
    EmptyValue { dataset: String, field: &'static str },
}

/// Immutable description of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub id: String,
    pub index_name: String,
    pub export_path: String,
    /// Facet fields in declaration order, without duplicates
    pub facets: Vec<String>,
    pub boolean_fields: BTreeSet<String>,
    pub required_scopes: BTreeSet<String>,
}

impl DatasetDescriptor {
    pub fn is_boolean_field(&self, field: &str) -> bool {
        self.boolean_fields.contains(field)
    }

    fn from_config(config: &DatasetConfig) -> Result<Self, RegistryError> {
        for (value, field) in [
            (&config.id, "id"),
            (&config.index_name, "index_name"),
            (&config.export_path, "export_path"),
        ] {
            if value.trim().is_empty() {
                return Err(RegistryError::EmptyValue {
                    dataset: config.id.clone(),
                    field,
                });
            }
        }

        if let Some(field) = config
            .facets
            .iter()
            .chain(config.boolean_fields.iter())
            .find(|field| RESERVED_PARAMS.contains(&field.as_str()))
        {
            return Err(RegistryError::ReservedField {
                dataset: config.id.clone(),
                field: field.clone(),
            });
        }

        let mut facets: Vec<String> = Vec::with_capacity(config.facets.len());
        for facet in &config.facets {
            if !facets.contains(facet) {
                facets.push(facet.clone());
            }
        }

        Ok(Self {
            id: config.id.clone(),
            index_name: config.index_name.clone(),
            export_path: config.export_path.trim_matches('/').to_string(),
            facets,
            boolean_fields: config.boolean_fields.iter().cloned().collect(),
            required_scopes: config.required_scopes.iter().cloned().collect(),
        })
    }
}

/// Read-only lookup table of datasets keyed by public id.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    datasets: HashMap<String, DatasetDescriptor>,
}

impl DatasetRegistry {
    /// Build the registry, enforcing unique ids and reserved-name rules.
    pub fn from_configs(configs: &[DatasetConfig]) -> Result<Self, RegistryError> {
        let mut datasets = HashMap::with_capacity(configs.len());
        for config in configs {
            let descriptor = DatasetDescriptor::from_config(config)?;
            if datasets.contains_key(&descriptor.id) {
                return Err(RegistryError::DuplicateId(descriptor.id));
            }
            datasets.insert(descriptor.id.clone(), descriptor);
        }
        Ok(Self { datasets })
    }

    pub fn lookup(&self, dataset_id: &str) -> ProxyResult<&DatasetDescriptor> {
        self.datasets
            .get(dataset_id)
            .ok_or_else(|| ProxyError::NotFound(dataset_id.to_string()))
    }

    /// Dataset ids in sorted order (startup logging, status output).
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.datasets.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::default_datasets;

    fn dataset(id: &str) -> DatasetConfig {
        DatasetConfig {
            id: id.to_string(),
            index_name: format!("{id}_index"),
            export_path: format!("{id}/export"),
            facets: vec![],
            boolean_fields: vec![],
            required_scopes: vec![],
        }
    }

    #[test]
    fn test_builtin_lookup() {
        let registry = DatasetRegistry::from_configs(&default_datasets()).unwrap();
        assert_eq!(registry.ids(), vec!["bag", "brk", "hr"]);

        let bag = registry.lookup("bag").unwrap();
        assert_eq!(bag.index_name, "benkagg_adresseerbareobjecten");
        assert_eq!(bag.export_path, "benkagg/adresseerbareobjecten");
        assert!(bag.required_scopes.is_empty());

        let brk = registry.lookup("brk").unwrap();
        assert!(brk.is_boolean_field("pandeigenaar"));
        assert!(brk.required_scopes.contains("BRK/RSN"));
    }

    #[test]
    fn test_lookup_miss_is_not_found() {
        let registry = DatasetRegistry::from_configs(&default_datasets()).unwrap();
        let err = registry.lookup("non-existent").unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(ref id) if id == "non-existent"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = DatasetRegistry::from_configs(&[dataset("bag"), dataset("bag")]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("bag".to_string()));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let mut config = dataset("bag");
        config.boolean_fields = vec!["export".to_string()];
        let err = DatasetRegistry::from_configs(&[config]).unwrap_err();
        assert!(matches!(err, RegistryError::ReservedField { ref field, .. } if field == "export"));
    }

    #[test]
    fn test_facets_deduplicated_in_order() {
        let mut config = dataset("bag");
        config.facets = vec!["b".into(), "a".into(), "b".into()];
        let registry = DatasetRegistry::from_configs(&[config]).unwrap();
        assert_eq!(registry.lookup("bag").unwrap().facets, vec!["b", "a"]);
    }
}
