//! Turn capability declarations into metadata containers, one per route prefix.

use super::model::{EntityMetadata, MetadataContainer, OperationMetadata, QueryCapability, ResolvedModel};
use crate::case::route_name_for_type;
use crate::config::{
    validate_declarations, ApiMethod, CapabilityDeclaration, DeclarationKind, HttpVerb,
    DEFAULT_ROUTE_PREFIX,
};
use crate::error::ConfigError;
use crate::query::{resolve_denied, QueryDefaults, QueryOptions};
use crate::schema::SchemaModel;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Expose store types that no declaration covers.
#[derive(Clone, Debug, Default)]
pub struct AutoGenerate {
    /// Prefix for generated endpoints; the resolver default when unset.
    pub route_prefix: Option<String>,
    pub allowed_query_options: Option<QueryOptions>,
}

#[derive(Clone, Debug)]
pub struct MetadataResolver {
    default_prefix: String,
    query_defaults: QueryDefaults,
    container_query_options: HashMap<String, QueryOptions>,
    nested_level: usize,
    auto_generate: Option<AutoGenerate>,
}

impl Default for MetadataResolver {
    fn default() -> Self {
        MetadataResolver {
            default_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            query_defaults: QueryDefaults::default(),
            container_query_options: HashMap::new(),
            nested_level: 1,
            auto_generate: None,
        }
    }
}

/// Entity declarations merged under one (prefix, routing name).
struct EntityGroup {
    source_type: String,
    methods: Vec<ApiMethod>,
    allowed: Option<QueryOptions>,
    key_type: Option<crate::schema::ScalarType>,
    bound: Vec<Arc<OperationMetadata>>,
}

fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}

impl MetadataResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix, query defaults, nesting level and auto-generation taken from process settings.
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        let resolver = Self::new()
            .with_default_prefix(&settings.route_prefix)
            .with_query_defaults(settings.query_defaults.clone())
            .with_nested_level(settings.nested_level);
        if settings.auto_generate {
            resolver.with_auto_generate(AutoGenerate::default())
        } else {
            resolver
        }
    }

    pub fn with_default_prefix(mut self, prefix: &str) -> Self {
        self.default_prefix = normalize_prefix(prefix);
        self
    }

    pub fn with_query_defaults(mut self, defaults: QueryDefaults) -> Self {
        self.query_defaults = defaults;
        self
    }

    /// Allowed query options for every entity under `prefix` without its own override.
    pub fn with_container_query_options(mut self, prefix: &str, allowed: QueryOptions) -> Self {
        self.container_query_options.insert(normalize_prefix(prefix), allowed);
        self
    }

    pub fn with_nested_level(mut self, level: usize) -> Self {
        self.nested_level = level;
        self
    }

    pub fn with_auto_generate(mut self, auto: AutoGenerate) -> Self {
        self.auto_generate = Some(auto);
        self
    }

    fn prefix_of(&self, d: &CapabilityDeclaration) -> String {
        d.route_prefix
            .as_deref()
            .map(normalize_prefix)
            .unwrap_or_else(|| self.default_prefix.clone())
    }

    /// Resolve declarations only.
    pub fn resolve(&self, declarations: &[CapabilityDeclaration]) -> Result<ResolvedModel, ConfigError> {
        self.resolve_inner(declarations, None)
    }

    /// Resolve declarations, adding generated endpoints for undeclared store types when enabled,
    /// and verify every entity's key against the schema.
    pub fn resolve_with_schema(
        &self,
        declarations: &[CapabilityDeclaration],
        schema: &SchemaModel,
    ) -> Result<ResolvedModel, ConfigError> {
        let model = self.resolve_inner(declarations, Some(schema))?;
        model.verify_keys(schema)?;
        Ok(model)
    }

    fn resolve_inner(
        &self,
        declarations: &[CapabilityDeclaration],
        schema: Option<&SchemaModel>,
    ) -> Result<ResolvedModel, ConfigError> {
        validate_declarations(declarations)?;

        let mut declarations: Vec<CapabilityDeclaration> = declarations.to_vec();
        if let (Some(auto), Some(schema)) = (&self.auto_generate, schema) {
            let generated = self.generated_declarations(auto, &declarations, schema);
            declarations.extend(generated);
        }

        // prefix -> routing name -> group; BTreeMap keeps route registration order stable
        let mut groups: BTreeMap<String, BTreeMap<String, EntityGroup>> = BTreeMap::new();
        for d in declarations.iter().filter(|d| d.kind == DeclarationKind::Entity) {
            let prefix = self.prefix_of(d);
            let by_name = groups.entry(prefix.clone()).or_default();
            let group = by_name.entry(d.routing_name.clone()).or_insert_with(|| EntityGroup {
                source_type: d.target_type.clone(),
                methods: Vec::new(),
                allowed: None,
                key_type: None,
                bound: Vec::new(),
            });
            if group.source_type != d.target_type {
                return Err(ConfigError::DuplicateRoutingName {
                    prefix,
                    name: d.routing_name.clone(),
                    first: group.source_type.clone(),
                    second: d.target_type.clone(),
                });
            }
            for &method in &d.methods {
                if group.methods.contains(&method) {
                    return Err(ConfigError::DuplicateMethod {
                        entity: d.routing_name.clone(),
                        method,
                    });
                }
                group.methods.push(method);
            }
            group.allowed = merge_option(group.allowed, d.allowed_query_options)
                .ok_or_else(|| ConfigError::ConflictingQueryOptions(d.routing_name.clone()))?;
            group.key_type = merge_option(group.key_type, d.key_type).ok_or_else(|| {
                ConfigError::Validation(format!("entity '{}' declares conflicting key types", d.routing_name))
            })?;
        }

        let mut bound_seen: HashSet<(String, String, String, HttpVerb)> = HashSet::new();
        for d in declarations.iter().filter(|d| d.kind == DeclarationKind::BoundOperation) {
            let prefix = self.prefix_of(d);
            let bound_type = d.bound_entity_type.clone().unwrap_or_default();
            let unbound_target = || ConfigError::UnboundTarget {
                action: d.routing_name.clone(),
                bound_type: bound_type.clone(),
            };
            let by_name = groups.get_mut(&prefix).ok_or_else(unbound_target)?;
            let candidates: Vec<String> = by_name
                .iter()
                .filter(|(_, g)| g.source_type == bound_type)
                .map(|(name, _)| name.clone())
                .collect();
            let entity_name = match (&d.entity_name, candidates.as_slice()) {
                (Some(wanted), _) => candidates
                    .iter()
                    .find(|c| *c == wanted)
                    .cloned()
                    .ok_or_else(unbound_target)?,
                (None, [only]) => only.clone(),
                (None, []) => return Err(unbound_target()),
                (None, _) => {
                    return Err(ConfigError::AmbiguousBinding {
                        action: d.routing_name.clone(),
                        bound_type: bound_type.clone(),
                    })
                }
            };
            let verb = d.http_verb.unwrap_or(HttpVerb::Post);
            if !bound_seen.insert((prefix.clone(), entity_name.clone(), d.routing_name.clone(), verb)) {
                return Err(ConfigError::DuplicateOperation {
                    action: d.routing_name.clone(),
                    target: format!("{}/{}", prefix, entity_name),
                });
            }
            let op = Arc::new(operation(d, prefix.clone(), Some(entity_name.clone())));
            if let Some(group) = by_name.get_mut(&entity_name) {
                group.bound.push(op);
            }
        }

        let mut unbound: BTreeMap<String, Vec<Arc<OperationMetadata>>> = BTreeMap::new();
        let mut unbound_seen: HashSet<(String, String)> = HashSet::new();
        for d in declarations.iter().filter(|d| d.kind == DeclarationKind::UnboundOperation) {
            if !unbound_seen.insert((d.target_type.clone(), d.routing_name.clone())) {
                return Err(ConfigError::DuplicateOperation {
                    action: d.routing_name.clone(),
                    target: d.target_type.clone(),
                });
            }
            let prefix = self.prefix_of(d);
            unbound
                .entry(prefix.clone())
                .or_default()
                .push(Arc::new(operation(d, prefix, None)));
        }

        let prefixes: BTreeMap<String, ()> = groups
            .keys()
            .chain(unbound.keys())
            .map(|p| (p.clone(), ()))
            .collect();
        let mut containers = Vec::with_capacity(prefixes.len());
        for prefix in prefixes.into_keys() {
            let container_default = self.container_query_options.get(&prefix).copied();
            let entities: Vec<Arc<EntityMetadata>> = groups
                .remove(&prefix)
                .unwrap_or_default()
                .into_iter()
                .map(|(name, g)| {
                    let capability = QueryCapability {
                        declared: g.allowed,
                        denied: resolve_denied(g.allowed, container_default, &self.query_defaults),
                        max_top: self.query_defaults.max_top,
                    };
                    Arc::new(EntityMetadata::new(
                        name,
                        g.source_type,
                        prefix.clone(),
                        g.methods,
                        g.key_type,
                        self.nested_level,
                        g.bound,
                        capability,
                    ))
                })
                .collect();
            let unbound_operations = unbound.remove(&prefix).unwrap_or_default();
            tracing::info!(
                prefix = %prefix,
                entities = entities.len(),
                operations = unbound_operations.len(),
                "resolved metadata container"
            );
            containers.push(MetadataContainer {
                route_prefix: prefix,
                entities,
                unbound_operations,
            });
        }
        Ok(ResolvedModel { containers })
    }

    fn generated_declarations(
        &self,
        auto: &AutoGenerate,
        declared: &[CapabilityDeclaration],
        schema: &SchemaModel,
    ) -> Vec<CapabilityDeclaration> {
        let covered: HashSet<&str> = declared
            .iter()
            .filter(|d| d.kind == DeclarationKind::Entity)
            .map(|d| d.target_type.as_str())
            .collect();
        schema
            .types()
            .iter()
            .filter(|t| !covered.contains(t.name.as_str()) && t.key.len() == 1)
            .map(|t| {
                let mut d = CapabilityDeclaration::entity(&route_name_for_type(&t.name), &t.name)
                    .with_methods(ApiMethod::ALL);
                d.route_prefix = auto.route_prefix.clone();
                d.allowed_query_options = auto.allowed_query_options;
                tracing::debug!(entity = %t.name, route = %d.routing_name, "generating endpoint");
                d
            })
            .collect()
    }
}

/// Equal or one-sided values merge; two different values conflict (`None`).
fn merge_option<T: PartialEq + Copy>(current: Option<T>, incoming: Option<T>) -> Option<Option<T>> {
    match (current, incoming) {
        (Some(a), Some(b)) if a != b => None,
        (a, b) => Some(a.or(b)),
    }
}

fn operation(d: &CapabilityDeclaration, prefix: String, bound_entity: Option<String>) -> OperationMetadata {
    OperationMetadata {
        action_name: d.routing_name.clone(),
        http_verb: d.http_verb.unwrap_or(HttpVerb::Post),
        handler: d.target_type.clone(),
        route_prefix: prefix,
        request_type: d.request_type.clone(),
        response_type: d.response_type.clone(),
        key_type: d.key_type,
        bound_entity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::ScalarType;
    use serde_json::json;

    fn category() -> CapabilityDeclaration {
        CapabilityDeclaration::entity("categories", "Category").with_methods([ApiMethod::Query, ApiMethod::Create])
    }

    #[test]
    fn declarations_group_by_prefix() {
        let model = MetadataResolver::new()
            .resolve(&[
                category(),
                CapabilityDeclaration::entity("products", "Product")
                    .with_methods([ApiMethod::Query])
                    .with_prefix("/admin/"),
                CapabilityDeclaration::unbound_operation("ping", "Ping").with_verb(HttpVerb::Get),
            ])
            .unwrap();
        assert_eq!(model.containers.len(), 2);
        let admin = model.container("admin").unwrap();
        assert_eq!(admin.entities[0].name, "products");
        let odata = model.container("odata").unwrap();
        assert_eq!(odata.entities[0].methods, vec![ApiMethod::Query, ApiMethod::Create]);
        assert_eq!(odata.unbound_operations[0].action_name, "ping");
    }

    #[test]
    fn methods_merge_across_declarations_but_not_twice() {
        let more = CapabilityDeclaration::entity("categories", "Category").with_methods([ApiMethod::Delete]);
        let model = MetadataResolver::new().resolve(&[category(), more]).unwrap();
        assert_eq!(model.container("odata").unwrap().entities[0].methods.len(), 3);

        let dup = CapabilityDeclaration::entity("categories", "Category").with_methods([ApiMethod::Create]);
        assert!(matches!(
            MetadataResolver::new().resolve(&[category(), dup]),
            Err(ConfigError::DuplicateMethod { method: ApiMethod::Create, .. })
        ));
    }

    #[test]
    fn routing_name_cannot_target_two_types() {
        let other = CapabilityDeclaration::entity("categories", "Tag").with_methods([ApiMethod::Delete]);
        assert!(matches!(
            MetadataResolver::new().resolve(&[category(), other]),
            Err(ConfigError::DuplicateRoutingName { .. })
        ));
    }

    #[test]
    fn bound_operation_resolution() {
        let archived = CapabilityDeclaration::entity("archived-categories", "Category").with_methods([ApiMethod::Query]);
        let op = CapabilityDeclaration::bound_operation("rename", "Rename", "Category").with_key(ScalarType::Guid);

        let model = MetadataResolver::new().resolve(&[category(), op.clone()]).unwrap();
        let e = model.container("odata").unwrap().entity("categories").unwrap().clone();
        assert_eq!(e.bound_operations[0].bound_entity.as_deref(), Some("categories"));

        assert!(matches!(
            MetadataResolver::new().resolve(&[category(), archived.clone(), op.clone()]),
            Err(ConfigError::AmbiguousBinding { .. })
        ));
        let named = op.clone().with_entity_name("archived-categories");
        let model = MetadataResolver::new().resolve(&[category(), archived, named]).unwrap();
        let e = model.container("odata").unwrap().entity("archived-categories").unwrap().clone();
        assert_eq!(e.bound_operations.len(), 1);

        assert!(matches!(
            MetadataResolver::new().resolve(&[op.clone()]),
            Err(ConfigError::UnboundTarget { .. })
        ));
        let wrong_name = op.with_entity_name("nope");
        assert!(matches!(
            MetadataResolver::new().resolve(&[category(), wrong_name]),
            Err(ConfigError::UnboundTarget { .. })
        ));
    }

    #[test]
    fn duplicate_operations_fail() {
        let a = CapabilityDeclaration::unbound_operation("reset", "Reset");
        assert!(matches!(
            MetadataResolver::new().resolve(&[a.clone(), a.clone()]),
            Err(ConfigError::DuplicateOperation { .. })
        ));
        let b = CapabilityDeclaration::bound_operation("approve", "Approve", "Category");
        assert!(matches!(
            MetadataResolver::new().resolve(&[category(), b.clone(), b]),
            Err(ConfigError::DuplicateOperation { .. })
        ));
    }

    #[test]
    fn query_mask_uses_container_then_global() {
        let defaults = QueryDefaults {
            enable_count: false,
            ..Default::default()
        };
        let filtered = CapabilityDeclaration::entity("tags", "Tag")
            .with_methods([ApiMethod::Query])
            .with_query_options(QueryOptions::FILTER);
        let model = MetadataResolver::new()
            .with_query_defaults(defaults)
            .resolve(&[category(), filtered])
            .unwrap();
        let odata = model.container("odata").unwrap();
        assert_eq!(odata.entity("categories").unwrap().query_capability.denied, QueryOptions::COUNT);
        assert_eq!(odata.entity("tags").unwrap().query_capability.denied, !QueryOptions::FILTER);

        let model = MetadataResolver::new()
            .with_container_query_options("odata", QueryOptions::TOP)
            .resolve(&[category()])
            .unwrap();
        assert_eq!(model.entities().next().unwrap().query_capability.denied, !QueryOptions::TOP);
    }

    #[test]
    fn auto_generated_endpoints_cover_undeclared_single_key_types() {
        let config: SchemaConfig = serde_json::from_value(json!({ "types": [
            { "name": "Category", "key": ["id"], "properties": [{ "name": "id", "type": "guid" }] },
            { "name": "OrderLine", "key": ["id"], "properties": [{ "name": "id", "type": "int" }] },
            { "name": "Pair", "key": ["a", "b"], "properties": [{ "name": "a", "type": "int" }, { "name": "b", "type": "int" }] }
        ] }))
        .unwrap();
        let schema = SchemaModel::from_config(&config).unwrap();
        let model = MetadataResolver::new()
            .with_auto_generate(AutoGenerate::default())
            .resolve_with_schema(&[category()], &schema)
            .unwrap();
        let odata = model.container("odata").unwrap();
        let names: Vec<&str> = odata.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["categories", "order-lines"]);
        assert_eq!(odata.entity("order-lines").unwrap().methods.len(), 5);
        assert_eq!(odata.entity("categories").unwrap().methods.len(), 2);
    }
}
