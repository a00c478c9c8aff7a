//! Typed errors and HTTP mapping.

use crate::config::{ApiMethod, HttpVerb};
use crate::schema::ScalarType;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Startup failures: declarations, schema and route table.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key on {type_name}: {reason}")]
    InvalidPrimaryKey { type_name: String, reason: String },
    #[error("entity '{entity}' registers method {method:?} more than once")]
    DuplicateMethod { entity: String, method: ApiMethod },
    #[error("routing name '{name}' under prefix '{prefix}' targets both {first} and {second}")]
    DuplicateRoutingName {
        prefix: String,
        name: String,
        first: String,
        second: String,
    },
    #[error("entity '{0}' declares conflicting allowed query options")]
    ConflictingQueryOptions(String),
    #[error("operation '{action}' is bound to {bound_type}, which has several entity registrations; set entity_name")]
    AmbiguousBinding { action: String, bound_type: String },
    #[error("operation '{action}' is bound to {bound_type} but no matching entity registration exists")]
    UnboundTarget { action: String, bound_type: String },
    #[error("operation '{action}' declared more than once for {target}")]
    DuplicateOperation { action: String, target: String },
    #[error("route conflict: {verb:?} {path}")]
    RouteConflict { verb: HttpVerb, path: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Request payload could not be turned into a delta tree.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("malformed payload at {path}: {message}")]
    Malformed { path: String, message: String },
    #[error("type mismatch at {path}: expected {expected:?}, {message}")]
    TypeMismatch {
        path: String,
        expected: ScalarType,
        message: String,
    },
    #[error("unknown entity type '{0}'")]
    UnknownType(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{entity_type} requires a client-supplied key")]
    MissingKey { entity_type: String },
    #[error("unknown entity type '{0}'")]
    UnknownType(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Payload(_) => (StatusCode::BAD_REQUEST, "invalid_payload"),
            AppError::Store(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
            AppError::Store(StoreError::MissingKey { .. }) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Store(StoreError::Db(sqlx::Error::RowNotFound)) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
