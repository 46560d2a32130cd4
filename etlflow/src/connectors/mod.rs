//! Built-in extractors, transformers and loaders.
//!
//! [`register_builtins`] is the only place these reach the registry.

mod data_cleaning;
mod json_file;
mod json_local;
mod pass_through;
mod row_validation;
mod sql_database;

#[cfg(feature = "http")]
mod rest_api;

pub use data_cleaning::{
    CleaningConfig, CleaningRule, ColumnSelection, DataCleaningTransformer, DateFormats,
};
pub use json_file::{JsonFileConfig, JsonFileExtractor, Orient};
pub use json_local::{JsonLocalConfig, JsonLocalLoader};
pub use pass_through::PassThroughTransformer;
pub use row_validation::{FieldRule, RowValidationConfig, RowValidationTransformer};
pub use sql_database::{SqlDatabaseConfig, SqlDatabaseLoader, SqliteTarget};

#[cfg(feature = "http")]
pub use rest_api::{next_link, records_from_body, Pagination, RestApiConfig, RestApiExtractor};

use crate::components::{Extractor, Loader, Transformer};
use crate::errors::Result;
use crate::registry::{Category, ComponentRegistry, ComponentType};

/// Registers every built-in connector.
///
/// # Errors
///
/// Returns [`EtlflowError::DuplicateKey`](crate::errors::EtlflowError::DuplicateKey)
/// if a key is already taken in `registry`.
pub fn register_builtins(registry: &mut ComponentRegistry) -> Result<()> {
    registry.register(
        Category::Extractor,
        JsonFileExtractor::KEY,
        ComponentType::extractor("JsonFileExtractor", |cfg| {
            Ok(Box::new(JsonFileExtractor::from_config(&cfg)?) as Box<dyn Extractor>)
        }),
    )?;

    #[cfg(feature = "http")]
    registry.register(
        Category::Extractor,
        RestApiExtractor::KEY,
        ComponentType::extractor("RestApiExtractor", |cfg| {
            Ok(Box::new(RestApiExtractor::from_config(&cfg)?) as Box<dyn Extractor>)
        }),
    )?;

    registry.register(
        Category::Transformer,
        PassThroughTransformer::KEY,
        ComponentType::transformer("PassThroughTransformer", |_cfg| {
            Ok(Box::new(PassThroughTransformer::new()) as Box<dyn Transformer>)
        }),
    )?;
    registry.register(
        Category::Transformer,
        DataCleaningTransformer::KEY,
        ComponentType::transformer("DataCleaningTransformer", |cfg| {
            Ok(Box::new(DataCleaningTransformer::from_config(&cfg)?) as Box<dyn Transformer>)
        }),
    )?;
    registry.register(
        Category::Transformer,
        RowValidationTransformer::KEY,
        ComponentType::transformer("RowValidationTransformer", |cfg| {
            Ok(Box::new(RowValidationTransformer::from_config(&cfg)?) as Box<dyn Transformer>)
        }),
    )?;

    registry.register(
        Category::Loader,
        JsonLocalLoader::KEY,
        ComponentType::loader("JsonLocalLoader", |cfg| {
            Ok(Box::new(JsonLocalLoader::from_config(&cfg)?) as Box<dyn Loader>)
        }),
    )?;
    registry.register(
        Category::Loader,
        SqlDatabaseLoader::KEY,
        ComponentType::loader("SqlDatabaseLoader", |cfg| {
            Ok(Box::new(SqlDatabaseLoader::from_config(&cfg)?) as Box<dyn Loader>)
        }),
    )?;

    tracing::debug!(components = registry.len(), "Registered built-in connectors");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_is_duplicate() {
        let mut registry = ComponentRegistry::new();
        register_builtins(&mut registry).unwrap();
        let err = register_builtins(&mut registry).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::DuplicateKey);
    }

    #[test]
    fn test_listing_is_sorted() {
        let registry = ComponentRegistry::with_builtins().unwrap();
        let keys = registry.keys(Category::Transformer);
        assert_eq!(keys, vec!["data_cleaning", "pass_through", "row_validation"]);
    }

    #[cfg(feature = "http")]
    #[test]
    fn test_rest_api_registered_with_http() {
        let registry = ComponentRegistry::with_builtins().unwrap();
        assert!(registry.contains(Category::Extractor, "rest_api"));
    }
}
