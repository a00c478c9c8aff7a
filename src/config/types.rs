//! Raw config types: capability declarations and the store schema, as loaded from JSON.

use crate::query::QueryOptions;
use crate::schema::ScalarType;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Entity,
    BoundOperation,
    UnboundOperation,
}

/// Entity endpoint methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiMethod {
    Query,
    GetByKey,
    Create,
    Patch,
    Delete,
}

impl ApiMethod {
    pub const ALL: [ApiMethod; 5] = [
        ApiMethod::Query,
        ApiMethod::GetByKey,
        ApiMethod::Create,
        ApiMethod::Patch,
        ApiMethod::Delete,
    ];

    pub fn http_verb(self) -> HttpVerb {
        match self {
            ApiMethod::Query | ApiMethod::GetByKey => HttpVerb::Get,
            ApiMethod::Create => HttpVerb::Post,
            ApiMethod::Patch => HttpVerb::Patch,
            ApiMethod::Delete => HttpVerb::Delete,
        }
    }

    /// Whether the route carries a key segment.
    pub fn is_keyed(self) -> bool {
        matches!(self, ApiMethod::GetByKey | ApiMethod::Patch | ApiMethod::Delete)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// One declarative capability record. Entities use `methods`; operations use `http_verb`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityDeclaration {
    pub kind: DeclarationKind,
    /// Entity set name for entities, action name for operations.
    pub routing_name: String,
    #[serde(default)]
    pub route_prefix: Option<String>,
    #[serde(default)]
    pub allowed_query_options: Option<QueryOptions>,
    #[serde(default)]
    pub methods: Vec<ApiMethod>,
    #[serde(default)]
    pub http_verb: Option<HttpVerb>,
    /// Presence makes an operation keyed. Entities may pin the expected key type.
    #[serde(default)]
    pub key_type: Option<ScalarType>,
    /// Store type for entities, handler name for operations.
    pub target_type: String,
    /// Store type a bound operation attaches to.
    #[serde(default)]
    pub bound_entity_type: Option<String>,
    /// Disambiguates a bound operation when its type has several entity registrations.
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub request_type: Option<String>,
    /// None means the operation answers without a body.
    #[serde(default)]
    pub response_type: Option<String>,
}

impl CapabilityDeclaration {
    fn new(kind: DeclarationKind, routing_name: &str, target_type: &str) -> Self {
        CapabilityDeclaration {
            kind,
            routing_name: routing_name.to_string(),
            route_prefix: None,
            allowed_query_options: None,
            methods: Vec::new(),
            http_verb: None,
            key_type: None,
            target_type: target_type.to_string(),
            bound_entity_type: None,
            entity_name: None,
            request_type: None,
            response_type: None,
        }
    }

    pub fn entity(routing_name: &str, target_type: &str) -> Self {
        Self::new(DeclarationKind::Entity, routing_name, target_type)
    }

    pub fn bound_operation(action: &str, handler: &str, bound_entity_type: &str) -> Self {
        let mut d = Self::new(DeclarationKind::BoundOperation, action, handler);
        d.bound_entity_type = Some(bound_entity_type.to_string());
        d.http_verb = Some(HttpVerb::Post);
        d
    }

    pub fn unbound_operation(action: &str, handler: &str) -> Self {
        let mut d = Self::new(DeclarationKind::UnboundOperation, action, handler);
        d.http_verb = Some(HttpVerb::Post);
        d
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = ApiMethod>) -> Self {
        self.methods.extend(methods);
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.route_prefix = Some(prefix.to_string());
        self
    }

    pub fn with_query_options(mut self, options: QueryOptions) -> Self {
        self.allowed_query_options = Some(options);
        self
    }

    pub fn with_verb(mut self, verb: HttpVerb) -> Self {
        self.http_verb = Some(verb);
        self
    }

    pub fn with_key(mut self, key_type: ScalarType) -> Self {
        self.key_type = Some(key_type);
        self
    }

    pub fn with_entity_name(mut self, name: &str) -> Self {
        self.entity_name = Some(name.to_string());
        self
    }

    pub fn with_request(mut self, request_type: &str) -> Self {
        self.request_type = Some(request_type.to_string());
        self
    }

    pub fn with_response(mut self, response_type: &str) -> Self {
        self.response_type = Some(response_type.to_string());
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ScalarType,
    #[serde(default = "default_true")]
    pub nullable: bool,
}

fn default_true() -> bool {
    true
}

/// Value object embedded in its owner's row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplexPropertyConfig {
    pub name: String,
    pub type_name: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    pub properties: Vec<PropertyConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationKind {
    Reference,
    Collection,
}

/// Reference: `foreign_key` lives on the declaring type. Collection: on the target type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavigationConfig {
    pub name: String,
    pub target_type: String,
    pub kind: NavigationKind,
    pub foreign_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityTypeConfig {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub key: Vec<String>,
    pub properties: Vec<PropertyConfig>,
    #[serde(default)]
    pub complex_properties: Vec<ComplexPropertyConfig>,
    #[serde(default)]
    pub navigations: Vec<NavigationConfig>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub types: Vec<EntityTypeConfig>,
}

/// Everything loaded from a config directory.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub declarations: Vec<CapabilityDeclaration>,
    #[serde(default)]
    pub schema: SchemaConfig,
}
