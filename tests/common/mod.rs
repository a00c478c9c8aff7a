//! Shared fixture: a small shop schema over the in-memory store.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use entity_api_sdk::config::{ApiMethod, HttpVerb, SchemaConfig};
use entity_api_sdk::query::{QueryDefaults, QueryOptions};
use entity_api_sdk::{
    build_router, ApiResult, AppError, AppState, CapabilityDeclaration, HandlerRegistry, MemoryStore, MetadataResolver,
    NamingPolicy, SchemaModel, Settings, Store,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub fn schema() -> SchemaModel {
    let config: SchemaConfig = serde_json::from_value(json!({ "types": [
        { "name": "Category", "key": ["id"], "properties": [
            { "name": "id", "type": "int" },
            { "name": "name", "type": "string" }
        ], "navigations": [
            { "name": "products", "target_type": "Product", "kind": "collection", "foreign_key": "category_id" }
        ] },
        { "name": "Product", "key": ["id"], "properties": [
            { "name": "id", "type": "int" },
            { "name": "name", "type": "string" },
            { "name": "unit_price", "type": "decimal" },
            { "name": "category_id", "type": "int" }
        ], "navigations": [
            { "name": "category", "target_type": "Category", "kind": "reference", "foreign_key": "category_id" }
        ] },
        { "name": "Customer", "key": ["id"], "properties": [
            { "name": "id", "type": "int" },
            { "name": "name", "type": "string", "nullable": false }
        ], "navigations": [
            { "name": "orders", "target_type": "Order", "kind": "collection", "foreign_key": "customer_id" }
        ] },
        { "name": "Order", "key": ["id"], "properties": [
            { "name": "id", "type": "int" },
            { "name": "order_no", "type": "string" },
            { "name": "customer_id", "type": "int" }
        ], "navigations": [
            { "name": "customer", "target_type": "Customer", "kind": "reference", "foreign_key": "customer_id" }
        ] },
        { "name": "Supplier", "key": ["id"], "properties": [
            { "name": "id", "type": "guid" },
            { "name": "name", "type": "string" }
        ] },
        { "name": "Payment", "key": ["id"], "properties": [
            { "name": "id", "type": "guid" },
            { "name": "total_amount", "type": "decimal", "nullable": false }
        ], "complex_properties": [
            { "name": "payment_info", "type_name": "PaymentInfo", "properties": [
                { "name": "card_number", "type": "string" },
                { "name": "expires", "type": "int" }
            ] }
        ] }
    ] }))
    .unwrap();
    SchemaModel::from_config(&config).unwrap()
}

pub fn declarations() -> Vec<CapabilityDeclaration> {
    vec![
        CapabilityDeclaration::entity("categories", "Category").with_methods(ApiMethod::ALL),
        CapabilityDeclaration::entity("products", "Product")
            .with_methods(ApiMethod::ALL)
            .with_query_options(QueryOptions::FILTER | QueryOptions::COUNT),
        CapabilityDeclaration::entity("customers", "Customer").with_methods(ApiMethod::ALL),
        CapabilityDeclaration::entity("orders", "Order").with_methods(ApiMethod::ALL),
        CapabilityDeclaration::entity("suppliers", "Supplier").with_methods(ApiMethod::ALL),
        CapabilityDeclaration::entity("payments", "Payment").with_methods(ApiMethod::ALL),
        CapabilityDeclaration::bound_operation("approve", "ApprovePayment", "Payment")
            .with_key(entity_api_sdk::schema::ScalarType::Guid)
            .with_response("ApprovalResult"),
        CapabilityDeclaration::unbound_operation("ping", "Ping")
            .with_verb(HttpVerb::Get)
            .with_response("String"),
        CapabilityDeclaration::unbound_operation("charge", "Charge").with_request("ChargeRequest"),
    ]
}

pub fn handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .register_fn("ApprovePayment", |req| async move {
            Ok::<_, AppError>(ApiResult::ok(json!({ "approved": req.key })))
        })
        .register_fn("Ping", |_req| async { Ok::<_, AppError>(ApiResult::ok(json!("pong"))) })
        .register_fn("Charge", |req| async move { Ok::<_, AppError>(ApiResult::ok(req.body)) })
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

/// Global `$count` disabled; `products` overrides with `$filter` and `$count` only.
pub fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new(Arc::new(schema())));
    let defaults = QueryDefaults {
        enable_count: false,
        ..QueryDefaults::default()
    };
    let model = MetadataResolver::new()
        .with_query_defaults(defaults)
        .with_nested_level(2)
        .resolve_with_schema(&declarations(), store.schema())
        .unwrap();
    let state = AppState::new(store.clone(), model, handlers(), NamingPolicy::Camel);
    let router = build_router(state, &Settings::default()).unwrap();
    TestApp { router, store }
}

impl TestApp {
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub fn seed(&self, entity_type: &str, rows: Vec<Value>) {
        self.store
            .seed(
                entity_type,
                rows.into_iter().map(|r| r.as_object().cloned().unwrap()),
            )
            .unwrap();
    }
}
