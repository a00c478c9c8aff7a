//! Bound and unbound operations: a closed registry of named handlers.

use crate::error::AppError;
use crate::metadata::OperationMetadata;
use crate::response::ApiResult;
use crate::state::AppState;
use crate::store::Store;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// What an operation handler receives for one call.
pub struct OperationRequest {
    pub metadata: Arc<OperationMetadata>,
    /// Typed key for keyed operations.
    pub key: Option<Value>,
    /// JSON body, or the query parameters as an object when there is no body.
    pub body: Value,
    pub store: Arc<dyn Store>,
}

#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, request: OperationRequest) -> Result<ApiResult, AppError>;
}

/// Adapter so plain async closures can be registered.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(OperationRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApiResult, AppError>> + Send + 'static,
{
    async fn handle(&self, request: OperationRequest) -> Result<ApiResult, AppError> {
        (self.0)(request).await
    }
}

/// Handlers by the name operation declarations reference.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, handler: impl OperationHandler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn register_fn<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(OperationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResult, AppError>> + Send + 'static,
    {
        self.register(name, FnHandler(f))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn OperationHandler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

fn request_body(body: &Bytes, params: HashMap<String, String>) -> Result<Option<Value>, AppError> {
    if !body.iter().all(u8::is_ascii_whitespace) {
        let value = serde_json::from_slice(body).map_err(|e| crate::error::PayloadError::Malformed {
            path: "$".into(),
            message: e.to_string(),
        })?;
        return Ok(Some(value));
    }
    if params.is_empty() {
        return Ok(None);
    }
    let map: Map<String, Value> = params.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    Ok(Some(Value::Object(map)))
}

pub async fn invoke(
    State(state): State<AppState>,
    Extension(operation): Extension<Arc<OperationMetadata>>,
    raw_key: Option<Path<String>>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<ApiResult, AppError> {
    let key = match (operation.key_type, raw_key) {
        (Some(key_type), Some(Path(raw))) => Some(
            key_type
                .parse_segment(&raw)
                .ok_or_else(|| AppError::NotFound(format!("{}/{}", operation.action_name, raw)))?,
        ),
        _ => None,
    };
    let body = match request_body(&body, params)? {
        Some(b) => b,
        None if operation.request_type.is_some() => return Ok(ApiResult::failed("Invalid Request")),
        None => Value::Null,
    };
    let handler = state
        .handlers
        .get(&operation.handler)
        .cloned()
        .ok_or_else(|| crate::error::ConfigError::MissingReference {
            kind: "handler",
            id: operation.handler.clone(),
        })?;
    tracing::debug!(action = %operation.action_name, handler = %operation.handler, "invoke operation");
    let mut result = handler
        .handle(OperationRequest {
            metadata: operation.clone(),
            key,
            body,
            store: state.store.clone(),
        })
        .await?;
    if result.success && !operation.has_response_body() {
        result.data = None;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_falls_back_to_query_parameters() {
        let params = HashMap::from([("amount".to_string(), "5".to_string())]);
        assert_eq!(
            request_body(&Bytes::new(), params).unwrap(),
            Some(json!({"amount": "5"}))
        );
        assert_eq!(request_body(&Bytes::from_static(b"  "), HashMap::new()).unwrap(), None);
        assert_eq!(
            request_body(&Bytes::from_static(br#"{"a":1}"#), HashMap::new()).unwrap(),
            Some(json!({"a": 1}))
        );
        assert!(request_body(&Bytes::from_static(b"{"), HashMap::new()).is_err());
    }

    #[test]
    fn registry_lookup_by_name() {
        let registry = HandlerRegistry::new().register_fn("Ping", |_req: OperationRequest| async {
            Ok::<_, AppError>(ApiResult::ok(json!("pong")))
        });
        assert!(registry.contains("Ping"));
        assert!(registry.get("Pong").is_none());
    }
}
