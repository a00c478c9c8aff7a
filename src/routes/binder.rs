//! Route table from the resolved model: one descriptor per entity method or operation,
//! then one axum router with each route's metadata attached as an extension.

use crate::config::{ApiMethod, HttpVerb, Settings};
use crate::error::ConfigError;
use crate::handlers::{entity, operation, HandlerRegistry};
use crate::metadata::{key_segment, EntityMetadata, OperationMetadata, ResolvedModel};
use crate::routes::common_routes;
use crate::schema::SchemaModel;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, on, patch, post, MethodFilter, MethodRouter},
    Extension, Router,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

#[derive(Clone, Debug)]
pub enum RouteTarget {
    Entity {
        entity: Arc<EntityMetadata>,
        method: ApiMethod,
    },
    Operation(Arc<OperationMetadata>),
}

#[derive(Clone, Debug)]
pub struct RouteDescriptor {
    pub verb: HttpVerb,
    /// Path with typed key segments, e.g. `/odata/categories/{key:int}`.
    pub pattern: String,
    pub target: RouteTarget,
}

impl RouteDescriptor {
    /// Path in axum syntax: `{key:int}` becomes `:key`.
    pub fn axum_path(&self) -> String {
        self.pattern
            .split('/')
            .map(|segment| {
                if segment.starts_with("{key") && segment.ends_with('}') {
                    ":key"
                } else {
                    segment
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn join(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        format!("/{}", rest)
    } else {
        format!("/{}/{}", prefix, rest)
    }
}

/// Every route the model declares. Two routes with the same verb and path, or an operation
/// whose handler is not registered, fail here.
pub fn describe_routes(
    model: &ResolvedModel,
    schema: &SchemaModel,
    handlers: &HandlerRegistry,
) -> Result<Vec<RouteDescriptor>, ConfigError> {
    let mut routes = Vec::new();
    for container in &model.containers {
        for e in &container.entities {
            let key = e.key_property(schema)?;
            let base = join(&container.route_prefix, &e.name);
            for &method in &e.methods {
                let pattern = if method.is_keyed() {
                    format!("{}/{}", base, key_segment(key.scalar_type))
                } else {
                    base.clone()
                };
                routes.push(RouteDescriptor {
                    verb: method.http_verb(),
                    pattern,
                    target: RouteTarget::Entity {
                        entity: e.clone(),
                        method,
                    },
                });
            }
            for op in &e.bound_operations {
                routes.push(RouteDescriptor {
                    verb: op.http_verb,
                    pattern: format!("{}/{}", base, op.route_pattern()),
                    target: RouteTarget::Operation(op.clone()),
                });
            }
        }
        for op in &container.unbound_operations {
            routes.push(RouteDescriptor {
                verb: op.http_verb,
                pattern: join(&container.route_prefix, &op.route_pattern()),
                target: RouteTarget::Operation(op.clone()),
            });
        }
    }

    let mut seen = HashSet::new();
    for r in &routes {
        if let RouteTarget::Operation(op) = &r.target {
            if !handlers.contains(&op.handler) {
                return Err(ConfigError::MissingReference {
                    kind: "handler",
                    id: op.handler.clone(),
                });
            }
        }
        if !seen.insert((r.verb, r.axum_path())) {
            return Err(ConfigError::RouteConflict {
                verb: r.verb,
                path: r.pattern.clone(),
            });
        }
    }
    Ok(routes)
}

fn method_filter(verb: HttpVerb) -> MethodFilter {
    match verb {
        HttpVerb::Get => MethodFilter::GET,
        HttpVerb::Post => MethodFilter::POST,
        HttpVerb::Put => MethodFilter::PUT,
        HttpVerb::Patch => MethodFilter::PATCH,
        HttpVerb::Delete => MethodFilter::DELETE,
    }
}

fn method_router(target: &RouteTarget, verb: HttpVerb) -> MethodRouter<AppState> {
    match target {
        RouteTarget::Entity { entity: e, method } => {
            let mr = match method {
                ApiMethod::Query => get(entity::query),
                ApiMethod::GetByKey => get(entity::get_by_key),
                ApiMethod::Create => post(entity::create),
                ApiMethod::Patch => patch(entity::patch),
                ApiMethod::Delete => delete(entity::delete),
            };
            mr.layer(Extension(e.clone()))
        }
        RouteTarget::Operation(op) => on(method_filter(verb), operation::invoke).layer(Extension(op.clone())),
    }
}

/// Entity and operation routes plus `/health` and `/version`, with the body size limit applied.
pub fn build_router(state: AppState, settings: &Settings) -> Result<Router, ConfigError> {
    let routes = describe_routes(&state.model, state.store.schema(), &state.handlers)?;
    let mut by_path: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();
    for r in &routes {
        tracing::info!(verb = ?r.verb, path = %r.pattern, "route");
        let mr = method_router(&r.target, r.verb);
        let path = r.axum_path();
        let merged = match by_path.remove(&path) {
            Some(existing) => existing.merge(mr),
            None => mr,
        };
        by_path.insert(path, merged);
    }
    let mut router = Router::new();
    for (path, mr) in by_path {
        router = router.route(&path, mr);
    }
    Ok(router
        .with_state(state)
        .merge(common_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(settings.body_limit)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CapabilityDeclaration, SchemaConfig};
    use crate::metadata::MetadataResolver;
    use crate::response::ApiResult;
    use crate::schema::ScalarType;
    use serde_json::json;

    fn schema() -> SchemaModel {
        let config: SchemaConfig = serde_json::from_value(json!({ "types": [
            { "name": "Category", "key": ["id"], "properties": [
                { "name": "id", "type": "int" }, { "name": "name", "type": "string" }
            ] },
            { "name": "Tag", "key": ["code"], "properties": [{ "name": "code", "type": "string" }] }
        ] }))
        .unwrap();
        SchemaModel::from_config(&config).unwrap()
    }

    fn handlers() -> HandlerRegistry {
        HandlerRegistry::new().register_fn("Archive", |_req| async { Ok::<_, crate::error::AppError>(ApiResult::no_content()) })
    }

    fn patterns(routes: &[RouteDescriptor]) -> Vec<String> {
        routes.iter().map(|r| format!("{:?} {}", r.verb, r.pattern)).collect()
    }

    #[test]
    fn one_route_per_method_with_typed_keys() {
        let decls = vec![
            CapabilityDeclaration::entity("categories", "Category").with_methods(ApiMethod::ALL.to_vec()),
            CapabilityDeclaration::entity("tags", "Tag").with_methods(vec![ApiMethod::GetByKey]),
            CapabilityDeclaration::bound_operation("archive", "Archive", "Category").with_key(ScalarType::Int),
            CapabilityDeclaration::unbound_operation("archive-all", "Archive").with_verb(HttpVerb::Delete),
        ];
        let model = MetadataResolver::new().resolve(&decls).unwrap();
        let routes = describe_routes(&model, &schema(), &handlers()).unwrap();
        assert_eq!(
            patterns(&routes),
            vec![
                "Get /odata/categories",
                "Get /odata/categories/{key:int}",
                "Post /odata/categories",
                "Patch /odata/categories/{key:int}",
                "Delete /odata/categories/{key:int}",
                "Post /odata/categories/{key:int}/archive",
                "Get /odata/tags/{key}",
                "Delete /odata/archive-all",
            ]
        );
        assert_eq!(routes[5].axum_path(), "/odata/categories/:key/archive");
    }

    #[test]
    fn unregistered_handler_is_a_missing_reference() {
        let decls = vec![CapabilityDeclaration::unbound_operation("ping", "Ping")];
        let model = MetadataResolver::new().resolve(&decls).unwrap();
        let err = describe_routes(&model, &schema(), &handlers()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingReference { kind: "handler", .. }));
    }

    #[test]
    fn same_verb_and_path_conflicts() {
        let decls = vec![
            CapabilityDeclaration::entity("categories", "Category").with_methods(vec![ApiMethod::Query]),
            CapabilityDeclaration::unbound_operation("categories", "Archive").with_verb(HttpVerb::Get),
        ];
        let model = MetadataResolver::new().resolve(&decls).unwrap();
        let err = describe_routes(&model, &schema(), &handlers()).unwrap_err();
        assert!(matches!(err, ConfigError::RouteConflict { verb: HttpVerb::Get, .. }));
    }
}
