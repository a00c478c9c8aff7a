//! Entity API SDK: capability declarations in, a queryable REST API with delta-tracking
//! partial updates out.

pub mod case;
pub mod config;
pub mod delta;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod migration;
pub mod query;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use case::NamingPolicy;
pub use config::{load_from_dir, load_from_str, CapabilityDeclaration, FullConfig, Settings};
pub use delta::{DeltaConverter, DeltaNode, DeltaSet, DeltaValue};
pub use error::{AppError, ConfigError, PayloadError, StoreError};
pub use handlers::{HandlerRegistry, OperationHandler, OperationRequest};
pub use metadata::{MetadataResolver, ResolvedModel};
pub use migration::ensure_tables;
pub use response::{success_many, ApiResult};
pub use routes::{build_router, common_routes};
pub use schema::SchemaModel;
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Store};
