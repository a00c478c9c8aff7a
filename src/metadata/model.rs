//! Resolved metadata: containers, entities and operations. Immutable after resolution
//! apart from each entity's lazily built key property and query feature.

use crate::case::NamingPolicy;
use crate::config::{ApiMethod, HttpVerb};
use crate::error::ConfigError;
use crate::query::QueryOptions;
use crate::schema::{Property, ScalarType, SchemaModel};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug)]
pub struct OperationMetadata {
    pub action_name: String,
    pub http_verb: HttpVerb,
    /// Registered handler name.
    pub handler: String,
    pub route_prefix: String,
    pub request_type: Option<String>,
    pub response_type: Option<String>,
    pub key_type: Option<ScalarType>,
    /// Routing name of the entity this operation is bound to.
    pub bound_entity: Option<String>,
}

impl OperationMetadata {
    pub fn has_key(&self) -> bool {
        self.key_type.is_some()
    }

    pub fn has_response_body(&self) -> bool {
        self.response_type.is_some()
    }

    /// Path below the entity set (bound) or the prefix (unbound): `{key}/{action}` vs `{action}/{key}`.
    pub fn route_pattern(&self) -> String {
        let key = self.key_type.map(key_segment);
        match (&self.bound_entity, key) {
            (Some(_), Some(key)) => format!("{}/{}", key, self.action_name),
            (None, Some(key)) => format!("{}/{}", self.action_name, key),
            (_, None) => self.action_name.clone(),
        }
    }
}

/// `{key:int}`, or `{key}` for unconstrained strings.
pub fn key_segment(key_type: ScalarType) -> String {
    match key_type.route_constraint() {
        Some(c) => format!("{{key:{}}}", c),
        None => "{key}".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCapability {
    /// Allowed options the entity declared, if any.
    pub declared: Option<QueryOptions>,
    pub denied: QueryOptions,
    pub max_top: Option<u32>,
}

/// Per-entity view used to validate query options: wire names to properties,
/// expandable navigation paths up to the entity's nesting level.
#[derive(Debug)]
pub struct QueryFeature {
    pub denied: QueryOptions,
    pub max_top: Option<u32>,
    pub key: Property,
    properties: HashMap<String, Property>,
    expandable: HashMap<String, Vec<String>>,
}

impl QueryFeature {
    pub fn property(&self, wire_name: &str) -> Option<&Property> {
        self.properties.get(&wire_name.trim().to_lowercase())
    }

    /// Schema navigation names for a `/`-separated wire path.
    pub fn expand_path(&self, wire_path: &str) -> Option<&[String]> {
        self.expandable
            .get(&wire_path.trim().to_lowercase())
            .map(Vec::as_slice)
    }

    pub fn expandable_paths(&self) -> impl Iterator<Item = &str> {
        self.expandable.keys().map(String::as_str)
    }
}

#[derive(Debug)]
pub struct EntityMetadata {
    pub name: String,
    pub source_type: String,
    pub route_prefix: String,
    pub methods: Vec<ApiMethod>,
    pub declared_key_type: Option<ScalarType>,
    pub nested_level: usize,
    pub bound_operations: Vec<Arc<OperationMetadata>>,
    pub query_capability: QueryCapability,
    init_lock: Mutex<()>,
    key_property: OnceLock<Property>,
    query_feature: OnceLock<Arc<QueryFeature>>,
}

impl EntityMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        source_type: String,
        route_prefix: String,
        methods: Vec<ApiMethod>,
        declared_key_type: Option<ScalarType>,
        nested_level: usize,
        bound_operations: Vec<Arc<OperationMetadata>>,
        query_capability: QueryCapability,
    ) -> Self {
        EntityMetadata {
            name,
            source_type,
            route_prefix,
            methods,
            declared_key_type,
            nested_level,
            bound_operations,
            query_capability,
            init_lock: Mutex::new(()),
            key_property: OnceLock::new(),
            query_feature: OnceLock::new(),
        }
    }

    pub fn allows(&self, method: ApiMethod) -> bool {
        self.methods.contains(&method)
    }

    /// The single key property, resolved from the schema on first use.
    pub fn key_property(&self, schema: &SchemaModel) -> Result<&Property, ConfigError> {
        if let Some(key) = self.key_property.get() {
            return Ok(key);
        }
        let _guard = self.init_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(key) = self.key_property.get() {
            return Ok(key);
        }
        let key = schema.find_primary_key(&self.source_type)?;
        if let Some(declared) = self.declared_key_type {
            if declared != key.scalar_type {
                return Err(ConfigError::InvalidPrimaryKey {
                    type_name: self.source_type.clone(),
                    reason: format!(
                        "entity '{}' declares key type {:?} but the store key is {:?}",
                        self.name, declared, key.scalar_type
                    ),
                });
            }
        }
        tracing::debug!(entity = %self.name, key = %key.name, "resolved key property");
        Ok(self.key_property.get_or_init(|| key.clone()))
    }

    /// Built at most once per entity; concurrent callers share the same `Arc`.
    pub fn query_feature(
        &self,
        schema: &SchemaModel,
        naming: NamingPolicy,
    ) -> Result<Arc<QueryFeature>, ConfigError> {
        if let Some(f) = self.query_feature.get() {
            return Ok(f.clone());
        }
        let key = self.key_property(schema)?.clone();
        let _guard = self.init_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(f) = self.query_feature.get() {
            return Ok(f.clone());
        }
        let ty = schema.entity_type(&self.source_type)?;
        let properties = ty
            .properties
            .iter()
            .map(|p| (naming.wire_name(&p.name).to_lowercase(), p.clone()))
            .collect();
        let mut expandable = HashMap::new();
        collect_expandable(
            schema,
            naming,
            &self.source_type,
            self.nested_level,
            &mut Vec::new(),
            &mut Vec::new(),
            &mut expandable,
        );
        let feature = Arc::new(QueryFeature {
            denied: self.query_capability.denied,
            max_top: self.query_capability.max_top,
            key,
            properties,
            expandable,
        });
        tracing::debug!(entity = %self.name, denied = ?feature.denied, "built query feature");
        Ok(self.query_feature.get_or_init(|| feature).clone())
    }
}

fn collect_expandable(
    schema: &SchemaModel,
    naming: NamingPolicy,
    type_name: &str,
    remaining: usize,
    wire_path: &mut Vec<String>,
    schema_path: &mut Vec<String>,
    out: &mut HashMap<String, Vec<String>>,
) {
    if remaining == 0 {
        return;
    }
    for nav in schema.navigations(type_name) {
        wire_path.push(naming.wire_name(&nav.name).to_lowercase());
        schema_path.push(nav.name.clone());
        out.insert(wire_path.join("/"), schema_path.clone());
        collect_expandable(
            schema,
            naming,
            &nav.target_type,
            remaining - 1,
            wire_path,
            schema_path,
            out,
        );
        wire_path.pop();
        schema_path.pop();
    }
}

#[derive(Debug)]
pub struct MetadataContainer {
    pub route_prefix: String,
    pub entities: Vec<Arc<EntityMetadata>>,
    pub unbound_operations: Vec<Arc<OperationMetadata>>,
}

impl MetadataContainer {
    pub fn entity(&self, name: &str) -> Option<&Arc<EntityMetadata>> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// All containers, one per route prefix.
#[derive(Debug, Default)]
pub struct ResolvedModel {
    pub containers: Vec<MetadataContainer>,
}

impl ResolvedModel {
    pub fn container(&self, prefix: &str) -> Option<&MetadataContainer> {
        self.containers.iter().find(|c| c.route_prefix == prefix)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityMetadata>> {
        self.containers.iter().flat_map(|c| c.entities.iter())
    }

    /// Resolve every entity's key now, so a bad key fails at startup rather than per request.
    pub fn verify_keys(&self, schema: &SchemaModel) -> Result<(), ConfigError> {
        for e in self.entities() {
            e.key_property(schema)?;
        }
        Ok(())
    }
}
