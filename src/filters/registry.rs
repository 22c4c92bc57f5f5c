//! Filter registry for creating filters by id.

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::node::{Category, FilterNode, NodeMetadata};
use crate::core::types::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// Factory function for creating filter instances.
pub type FilterFactory<const D: usize> = Arc<dyn Fn() -> Box<dyn FilterNode<D>> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry<const D: usize> {
    pub factory: FilterFactory<D>,
    /// Metadata of a default instance, so listing needs no instance.
    pub metadata: NodeMetadata,
}

/// Registry for all available filter types of one dimension.
///
/// Filters are listed in registration order.
pub struct FilterRegistry<const D: usize> {
    filters: IndexMap<String, RegistryEntry<D>>,
    categories: IndexMap<Category, Vec<String>>,
}

impl<const D: usize> FilterRegistry<D> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            filters: IndexMap::new(),
            categories: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with built-in filters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::filters::builtin::register_all(&mut registry);
        registry
    }

    /// Register a filter type. A later registration with the same id
    /// replaces the earlier one.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn FilterNode<D>> + Send + Sync + 'static,
    {
        let metadata = factory().metadata();
        let id = metadata.id.clone();
        let category = metadata.category;

        if let Some(previous) = self.filters.shift_remove(&id) {
            if let Some(ids) = self.categories.get_mut(&previous.metadata.category) {
                ids.retain(|i| i != &id);
            }
        }
        self.filters.insert(
            id.clone(),
            RegistryEntry {
                factory: Arc::new(factory),
                metadata,
            },
        );
        self.categories.entry(category).or_default().push(id);
    }

    /// Create a new instance of a filter by ID.
    pub fn create(&self, id: &str) -> Option<Box<dyn FilterNode<D>>> {
        self.filters.get(id).map(|e| (e.factory)())
    }

    /// Create a filter and apply `parameters` to it in order.
    pub fn create_with(
        &self,
        id: &str,
        parameters: &[(&str, Value)],
    ) -> PipelineResult<Box<dyn FilterNode<D>>> {
        let mut filter = self
            .create(id)
            .ok_or_else(|| PipelineError::configuration("filter", format!("unknown filter '{}'", id)))?;
        for (name, value) in parameters {
            filter.set_parameter(name, value)?;
        }
        Ok(filter)
    }

    /// Get metadata for a filter without creating an instance.
    pub fn get_metadata(&self, id: &str) -> Option<&NodeMetadata> {
        self.filters.get(id).map(|e| &e.metadata)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    pub fn filter_ids(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(|s| s.as_str())
    }

    pub fn filters_by_category(&self, category: &Category) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Categories that have at least one filter, in registration order.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(category, _)| category)
    }

    /// Search filters by id, name or description.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.filters
            .iter()
            .filter(|(_, entry)| {
                entry.metadata.id.to_lowercase().contains(&query)
                    || entry.metadata.name.to_lowercase().contains(&query)
                    || entry.metadata.description.to_lowercase().contains(&query)
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl<const D: usize> Default for FilterRegistry<D> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::PassthroughNode;

    #[test]
    fn test_register_and_create() {
        let mut registry = FilterRegistry::<2>::new();
        registry.register(|| Box::new(PassthroughNode));

        assert!(registry.contains("passthrough"));
        assert!(registry.create("passthrough").is_some());
        assert!(registry.create("missing").is_none());
        assert_eq!(registry.get_metadata("passthrough").unwrap().name, "Passthrough");
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = FilterRegistry::<2>::new();
        registry.register(|| Box::new(PassthroughNode));
        registry.register(|| Box::new(PassthroughNode));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.filters_by_category(&Category::Utility), vec!["passthrough"]);
    }

    #[test]
    fn test_builtins() {
        let registry = FilterRegistry::<2>::with_builtins();
        for id in [
            "constant",
            "mean",
            "alpha_blend",
            "clamp",
            "shift_scale",
            "shift",
            "extract_region",
            "band_split",
            "concatenate",
            "statistics",
        ] {
            assert!(registry.contains(id), "missing {}", id);
        }
        assert!(registry.filters_by_category(&Category::Geometry).contains(&"shift"));
        assert!(registry.categories().any(|c| *c == Category::Analyze));
        assert_eq!(registry.search("blend"), vec!["alpha_blend"]);
    }

    #[test]
    fn test_create_with_parameters() {
        let registry = FilterRegistry::<3>::with_builtins();
        let filter = registry
            .create_with("mean", &[("radius", Value::Integer(2))])
            .unwrap();
        assert_eq!(filter.metadata().id, "mean");

        assert!(matches!(
            registry.create_with("mean", &[("radius", Value::from("wide"))]),
            Err(PipelineError::Configuration { .. })
        ));
        assert!(registry.create_with("sharpen", &[]).is_err());
    }
}
