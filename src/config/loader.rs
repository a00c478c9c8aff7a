//! Load declarations and schema from a config directory of JSON files.

use crate::config::types::{CapabilityDeclaration, FullConfig, SchemaConfig};
use crate::config::validator::{validate_declarations, validate_schema};
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

pub const DECLARATIONS_FILE: &str = "declarations.json";
pub const SCHEMA_FILE: &str = "schema.json";

/// Read `declarations.json` and `schema.json` from `dir`. A missing declarations file
/// yields no declarations (every store type may still be auto-generated).
pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let schema: SchemaConfig = read_json(&dir.join(SCHEMA_FILE))?;
    let declarations_path = dir.join(DECLARATIONS_FILE);
    let declarations: Vec<CapabilityDeclaration> = if declarations_path.exists() {
        read_json(&declarations_path)?
    } else {
        tracing::info!(path = %declarations_path.display(), "no declarations file; relying on auto-generated endpoints");
        Vec::new()
    };
    let config = FullConfig {
        declarations,
        schema,
    };
    validate(&config)?;
    tracing::info!(
        declarations = config.declarations.len(),
        types = config.schema.types.len(),
        "config loaded"
    );
    Ok(config)
}

/// Parse a single JSON document holding `{ "declarations": [...], "schema": {...} }`.
pub fn load_from_str(json: &str) -> Result<FullConfig, ConfigError> {
    let config: FullConfig = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    validate_schema(&config.schema)?;
    validate_declarations(&config.declarations)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeclarationKind;

    #[test]
    fn single_document_round_trip() {
        let json = r#"{
            "declarations": [
                { "kind": "entity", "routing_name": "categories", "target_type": "Category",
                  "methods": ["query", "get_by_key", "create", "patch"],
                  "allowed_query_options": ["$filter", "$top"] }
            ],
            "schema": { "types": [
                { "name": "Category", "key": ["id"], "properties": [
                    { "name": "id", "type": "guid", "nullable": false },
                    { "name": "name", "type": "string" }
                ] }
            ] }
        }"#;
        let config = load_from_str(json).unwrap();
        assert_eq!(config.declarations.len(), 1);
        assert_eq!(config.declarations[0].kind, DeclarationKind::Entity);
        assert_eq!(config.declarations[0].methods.len(), 4);
        assert!(config.declarations[0].allowed_query_options.is_some());
    }

    #[test]
    fn missing_directory_is_load_error() {
        let err = load_from_dir("/nonexistent/entity-api-config").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
