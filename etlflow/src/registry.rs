//! Component registry mapping `(category, key)` pairs to constructors.
//!
//! The registry is populated once at process start (see
//! [`ComponentRegistry::with_builtins`]) and then shared read-only behind an
//! `Arc`. It stores constructors, never instances: the engine builds a
//! fresh component from its per-pipeline config on every run.

use crate::components::{ComponentConfig, Extractor, Loader, Transformer};
use crate::errors::{EtlflowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Component category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Sources.
    Extractor,
    /// Dataset-to-dataset functions.
    Transformer,
    /// Destinations.
    Loader,
}

impl Category {
    /// All categories in listing order.
    pub const ALL: [Self; 3] = [Self::Extractor, Self::Transformer, Self::Loader];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extractor => write!(f, "extractor"),
            Self::Transformer => write!(f, "transformer"),
            Self::Loader => write!(f, "loader"),
        }
    }
}

/// Constructor for extractors.
pub type ExtractorFactory =
    Arc<dyn Fn(ComponentConfig) -> Result<Box<dyn Extractor>> + Send + Sync>;

/// Constructor for transformers.
pub type TransformerFactory =
    Arc<dyn Fn(ComponentConfig) -> Result<Box<dyn Transformer>> + Send + Sync>;

/// Constructor for loaders.
pub type LoaderFactory = Arc<dyn Fn(ComponentConfig) -> Result<Box<dyn Loader>> + Send + Sync>;

/// A constructor tagged with its category.
#[derive(Clone)]
pub enum ComponentFactory {
    /// Builds an extractor.
    Extractor(ExtractorFactory),
    /// Builds a transformer.
    Transformer(TransformerFactory),
    /// Builds a loader.
    Loader(LoaderFactory),
}

/// A registered component type: a display name plus its constructor.
#[derive(Clone)]
pub struct ComponentType {
    type_name: String,
    factory: ComponentFactory,
}

impl ComponentType {
    /// Wraps an extractor constructor.
    pub fn extractor<F>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ComponentConfig) -> Result<Box<dyn Extractor>> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            factory: ComponentFactory::Extractor(Arc::new(factory)),
        }
    }

    /// Wraps a transformer constructor.
    pub fn transformer<F>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ComponentConfig) -> Result<Box<dyn Transformer>> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            factory: ComponentFactory::Transformer(Arc::new(factory)),
        }
    }

    /// Wraps a loader constructor.
    pub fn loader<F>(type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(ComponentConfig) -> Result<Box<dyn Loader>> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            factory: ComponentFactory::Loader(Arc::new(factory)),
        }
    }

    /// Returns the display name of the concrete type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the category this constructor builds.
    #[must_use]
    pub const fn category(&self) -> Category {
        match self.factory {
            ComponentFactory::Extractor(_) => Category::Extractor,
            ComponentFactory::Transformer(_) => Category::Transformer,
            ComponentFactory::Loader(_) => Category::Loader,
        }
    }

    /// Instantiates an extractor.
    ///
    /// # Errors
    ///
    /// Propagates the constructor's config error, or returns
    /// [`EtlflowError::ConfigValidation`] if this is not an extractor.
    pub fn build_extractor(&self, config: ComponentConfig) -> Result<Box<dyn Extractor>> {
        match &self.factory {
            ComponentFactory::Extractor(f) => f(config),
            _ => Err(self.wrong_category(Category::Extractor)),
        }
    }

    /// Instantiates a transformer.
    ///
    /// # Errors
    ///
    /// Propagates the constructor's config error, or returns
    /// [`EtlflowError::ConfigValidation`] if this is not a transformer.
    pub fn build_transformer(&self, config: ComponentConfig) -> Result<Box<dyn Transformer>> {
        match &self.factory {
            ComponentFactory::Transformer(f) => f(config),
            _ => Err(self.wrong_category(Category::Transformer)),
        }
    }

    /// Instantiates a loader.
    ///
    /// # Errors
    ///
    /// Propagates the constructor's config error, or returns
    /// [`EtlflowError::ConfigValidation`] if this is not a loader.
    pub fn build_loader(&self, config: ComponentConfig) -> Result<Box<dyn Loader>> {
        match &self.factory {
            ComponentFactory::Loader(f) => f(config),
            _ => Err(self.wrong_category(Category::Loader)),
        }
    }

    fn wrong_category(&self, wanted: Category) -> EtlflowError {
        EtlflowError::config_validation(
            &self.type_name,
            format!("is a {}, not a {wanted}", self.category()),
        )
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("type_name", &self.type_name)
            .field("category", &self.category())
            .finish()
    }
}

/// Registry of component constructors.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    entries: BTreeMap<Category, BTreeMap<String, ComponentType>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in connector.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::DuplicateKey`] if two built-ins collide.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        crate::connectors::register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Registers a component type under `(category, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::DuplicateKey`] if the pair is taken, or
    /// [`EtlflowError::ConfigValidation`] if `component` builds a different
    /// category.
    pub fn register(
        &mut self,
        category: Category,
        key: impl Into<String>,
        component: ComponentType,
    ) -> Result<()> {
        let key = key.into();
        if component.category() != category {
            return Err(EtlflowError::config_validation(
                &key,
                format!(
                    "cannot register {} '{}' as a {category}",
                    component.category(),
                    component.type_name()
                ),
            ));
        }

        let slot = self.entries.entry(category).or_default();
        if let Some(existing) = slot.get(&key) {
            return Err(EtlflowError::DuplicateKey {
                category,
                key,
                existing: existing.type_name().to_string(),
            });
        }

        slot.insert(key, component);
        Ok(())
    }

    /// Resolves `(category, key)` to its component type.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::UnknownComponent`] listing the available
    /// keys if nothing is registered under the pair.
    pub fn resolve(&self, category: Category, key: &str) -> Result<&ComponentType> {
        self.entries
            .get(&category)
            .and_then(|slot| slot.get(key))
            .ok_or_else(|| EtlflowError::UnknownComponent {
                category,
                key: key.to_string(),
                available: self.keys(category),
            })
    }

    /// Returns true if `(category, key)` is registered.
    #[must_use]
    pub fn contains(&self, category: Category, key: &str) -> bool {
        self.entries
            .get(&category)
            .is_some_and(|slot| slot.contains_key(key))
    }

    /// Returns the sorted keys of one category.
    #[must_use]
    pub fn keys(&self, category: Category) -> Vec<String> {
        self.entries
            .get(&category)
            .map(|slot| slot.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Lists every registration grouped by category, keys sorted.
    ///
    /// Every category is present, even when empty.
    #[must_use]
    pub fn list_all(&self) -> BTreeMap<Category, Vec<(&str, &ComponentType)>> {
        Category::ALL
            .into_iter()
            .map(|category| {
                let items = self
                    .entries
                    .get(&category)
                    .map(|slot| slot.iter().map(|(k, v)| (k.as_str(), v)).collect())
                    .unwrap_or_default();
                (category, items)
            })
            .collect()
    }

    /// Returns the total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::{MockExtractor, MockLoader};
    use crate::connectors::PassThroughTransformer;

    fn pass_through() -> ComponentType {
        ComponentType::transformer("PassThroughTransformer", |_cfg| {
            Ok(Box::new(PassThroughTransformer::new()) as Box<dyn Transformer>)
        })
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Category::Transformer, "pass_through", pass_through())
            .unwrap();

        let ty = registry.resolve(Category::Transformer, "pass_through").unwrap();
        assert_eq!(ty.type_name(), "PassThroughTransformer");
        assert_eq!(ty.category(), Category::Transformer);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Category::Transformer, "pass_through", pass_through())
            .unwrap();
        let err = registry
            .register(Category::Transformer, "pass_through", pass_through())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert!(err.to_string().contains("PassThroughTransformer"));
    }

    #[test]
    fn test_same_key_different_categories() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(
                Category::Extractor,
                "mock",
                MockExtractor::component_type(MockExtractor::new()),
            )
            .unwrap();
        registry
            .register(Category::Loader, "mock", MockLoader::component_type(MockLoader::new()))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_component() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Category::Transformer, "pass_through", pass_through())
            .unwrap();

        let err = registry.resolve(Category::Transformer, "nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownComponent);
        assert!(err.to_string().contains("pass_through"));

        let err = registry.resolve(Category::Loader, "pass_through").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownComponent);
    }

    #[test]
    fn test_category_mismatch_rejected() {
        let mut registry = ComponentRegistry::new();
        let err = registry
            .register(Category::Loader, "pass_through", pass_through())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigValidation);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_build_wrong_category() {
        let ty = pass_through();
        assert!(ty.build_loader(ComponentConfig::new()).is_err());
        assert!(ty.build_transformer(ComponentConfig::new()).is_ok());
    }

    #[test]
    fn test_registration_order_irrelevant() {
        let mut a = ComponentRegistry::new();
        a.register(Category::Transformer, "b", pass_through()).unwrap();
        a.register(Category::Transformer, "a", pass_through()).unwrap();

        let mut b = ComponentRegistry::new();
        b.register(Category::Transformer, "a", pass_through()).unwrap();
        b.register(Category::Transformer, "b", pass_through()).unwrap();

        assert_eq!(a.keys(Category::Transformer), b.keys(Category::Transformer));
        assert_eq!(a.keys(Category::Transformer), vec!["a", "b"]);
    }

    #[test]
    fn test_list_all_includes_empty_categories() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Category::Transformer, "pass_through", pass_through())
            .unwrap();

        let listing = registry.list_all();
        assert_eq!(listing.len(), 3);
        assert!(listing[&Category::Extractor].is_empty());
        assert_eq!(listing[&Category::Transformer][0].0, "pass_through");
    }

    #[test]
    fn test_builtins() {
        let registry = ComponentRegistry::with_builtins().unwrap();
        assert!(registry.contains(Category::Extractor, "json_file"));
        assert!(registry.contains(Category::Transformer, "data_cleaning"));
        assert!(registry.contains(Category::Transformer, "row_validation"));
        assert!(registry.contains(Category::Loader, "json_local"));
        assert!(registry.contains(Category::Loader, "sql_database"));
    }
}
