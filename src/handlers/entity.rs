//! Entity handlers: query, get by key, create, patch, delete.
//! Each route carries its `EntityMetadata` as an extension.

use crate::error::AppError;
use crate::metadata::EntityMetadata;
use crate::query::QueryRequest;
use crate::response::ApiResult;
use crate::service::{graph, query as read};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Extension,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Typed key from the path segment; a segment that does not parse is a route miss.
fn parse_key(state: &AppState, entity: &EntityMetadata, raw: &str) -> Result<Value, AppError> {
    let key = entity.key_property(state.store.schema())?;
    key.scalar_type
        .parse_segment(raw)
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", entity.name, raw)))
}

fn parse_query(state: &AppState, entity: &EntityMetadata, params: &HashMap<String, String>) -> Result<QueryRequest, AppError> {
    let feature = entity.query_feature(state.store.schema(), state.naming)?;
    QueryRequest::parse(params, &feature).map_err(AppError::BadRequest)
}

pub async fn query(
    State(state): State<AppState>,
    Extension(entity): Extension<Arc<EntityMetadata>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResult, AppError> {
    let request = parse_query(&state, &entity, &params)?;
    read::list(state.store.clone(), &entity, &request, state.naming).await
}

pub async fn get_by_key(
    State(state): State<AppState>,
    Extension(entity): Extension<Arc<EntityMetadata>>,
    Path(raw_key): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<ApiResult, AppError> {
    let key = parse_key(&state, &entity, &raw_key)?;
    let request = parse_query(&state, &entity, &params)?;
    read::get_by_key(state.store.clone(), &entity, &key, &request, state.naming).await
}

pub async fn create(
    State(state): State<AppState>,
    Extension(entity): Extension<Arc<EntityMetadata>>,
    body: Bytes,
) -> Result<ApiResult, AppError> {
    let delta = state.converter.parse_slice(&entity.source_type, &body)?;
    graph::create(state.store.clone(), &entity, &delta, state.naming).await
}

pub async fn patch(
    State(state): State<AppState>,
    Extension(entity): Extension<Arc<EntityMetadata>>,
    Path(raw_key): Path<String>,
    body: Bytes,
) -> Result<ApiResult, AppError> {
    let key = parse_key(&state, &entity, &raw_key)?;
    let delta = state.converter.parse_slice(&entity.source_type, &body)?;
    graph::patch(state.store.clone(), &entity, &key, &delta, state.naming).await
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(entity): Extension<Arc<EntityMetadata>>,
    Path(raw_key): Path<String>,
) -> Result<ApiResult, AppError> {
    let key = parse_key(&state, &entity, &raw_key)?;
    graph::delete(state.store.clone(), &entity, &key).await
}
