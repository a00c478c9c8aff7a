//! Shape checks on declarations and schema config before resolution.

use crate::config::types::*;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

const ROUTE_SEGMENT: &str = r"^[A-Za-z0-9][A-Za-z0-9_.~-]*$";
const ROUTE_PREFIX: &str = r"^[A-Za-z0-9_.~-]+(/[A-Za-z0-9_.~-]+)*$";
const IDENTIFIER: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::Validation(format!("pattern {}: {}", pattern, e)))
}

/// Validate every declaration's per-kind required fields and route names.
pub fn validate_declarations(declarations: &[CapabilityDeclaration]) -> Result<(), ConfigError> {
    let segment_re = compile(ROUTE_SEGMENT)?;
    let prefix_re = compile(ROUTE_PREFIX)?;
    for d in declarations {
        if !segment_re.is_match(&d.routing_name) {
            return Err(ConfigError::Validation(format!(
                "routing name '{}' is not a valid path segment",
                d.routing_name
            )));
        }
        if let Some(prefix) = d.route_prefix.as_deref() {
            if !prefix.is_empty() && !prefix_re.is_match(prefix.trim_matches('/')) {
                return Err(ConfigError::Validation(format!("route prefix '{}' is invalid", prefix)));
            }
        }
        if d.target_type.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "declaration '{}' has no target type",
                d.routing_name
            )));
        }
        match d.kind {
            DeclarationKind::Entity => {
                if d.methods.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "entity '{}' declares no methods",
                        d.routing_name
                    )));
                }
            }
            DeclarationKind::BoundOperation => {
                if d.bound_entity_type.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::Validation(format!(
                        "bound operation '{}' has no bound entity type",
                        d.routing_name
                    )));
                }
                require_verb(d)?;
            }
            DeclarationKind::UnboundOperation => require_verb(d)?,
        }
    }
    Ok(())
}

fn require_verb(d: &CapabilityDeclaration) -> Result<(), ConfigError> {
    if d.http_verb.is_none() {
        return Err(ConfigError::Validation(format!(
            "operation '{}' has no http verb",
            d.routing_name
        )));
    }
    Ok(())
}

/// Validate schema config: unique names, keys and foreign keys referencing real members.
pub fn validate_schema(schema: &SchemaConfig) -> Result<(), ConfigError> {
    let identifier_re = compile(IDENTIFIER)?;
    let mut type_names = HashSet::new();
    for t in &schema.types {
        if !type_names.insert(t.name.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate entity type: {}", t.name)));
        }
    }
    for t in &schema.types {
        let mut members = HashSet::new();
        let names = t
            .properties
            .iter()
            .map(|p| p.name.as_str())
            .chain(t.complex_properties.iter().map(|c| c.name.as_str()))
            .chain(t.navigations.iter().map(|n| n.name.as_str()));
        for name in names {
            if !identifier_re.is_match(name) {
                return Err(ConfigError::Validation(format!(
                    "{}.{} is not a valid member name",
                    t.name, name
                )));
            }
            if !members.insert(name.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate member {}.{}",
                    t.name, name
                )));
            }
        }
        for k in &t.key {
            if !t.properties.iter().any(|p| &p.name == k) {
                return Err(ConfigError::MissingReference {
                    kind: "key property",
                    id: format!("{}.{}", t.name, k),
                });
            }
        }
        for c in &t.complex_properties {
            let mut nested = HashSet::new();
            for p in &c.properties {
                if !nested.insert(p.name.to_lowercase()) {
                    return Err(ConfigError::Validation(format!(
                        "duplicate member {}.{}.{}",
                        t.name, c.name, p.name
                    )));
                }
            }
        }
        for n in &t.navigations {
            let target = schema
                .types
                .iter()
                .find(|x| x.name == n.target_type)
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "navigation target",
                    id: format!("{}.{} -> {}", t.name, n.name, n.target_type),
                })?;
            let fk_owner = match n.kind {
                NavigationKind::Reference => t,
                NavigationKind::Collection => target,
            };
            if !fk_owner.properties.iter().any(|p| p.name == n.foreign_key) {
                return Err(ConfigError::MissingReference {
                    kind: "foreign key",
                    id: format!("{}.{}", fk_owner.name, n.foreign_key),
                });
            }
        }
    }
    Ok(())
}
