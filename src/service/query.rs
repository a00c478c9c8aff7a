//! Read side: `$filter $orderby $top $skip` go to the store; `$select $expand $count` are applied here.

use super::graph::not_found;
use super::session::{EntryId, Session};
use crate::case::NamingPolicy;
use crate::error::AppError;
use crate::metadata::EntityMetadata;
use crate::query::QueryRequest;
use crate::response::{success_many, ApiResult};
use crate::store::{Store, StoreQuery};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Navigation paths merged into a tree: `a/b,a/c` -> a{b,c}.
#[derive(Debug, Default)]
struct ExpandTree(BTreeMap<String, ExpandTree>);

impl ExpandTree {
    fn from_paths(paths: &[Vec<String>]) -> Self {
        let mut root = ExpandTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path {
                node = node.0.entry(segment.clone()).or_default();
            }
        }
        root
    }
}

pub async fn list(
    store: Arc<dyn Store>,
    entity: &EntityMetadata,
    request: &QueryRequest,
    naming: NamingPolicy,
) -> Result<ApiResult, AppError> {
    let query = StoreQuery {
        filter: request.filter.clone(),
        order_by: request.order_by.clone(),
        skip: request.skip,
        top: request.top,
    };
    let rows = store.query(&entity.source_type, &query).await?;
    let count = if request.count {
        Some(store.count(&entity.source_type, request.filter.as_ref()).await?)
    } else {
        None
    };
    let tree = ExpandTree::from_paths(&request.expand);
    let mut session = Session::new(store);
    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let id = session.track(&entity.source_type, row)?;
        data.push(shape(&mut session, id, &tree, request.select.as_deref(), naming).await?);
    }
    tracing::debug!(entity = %entity.name, rows = data.len(), "query");
    Ok(success_many(data, count))
}

pub async fn get_by_key(
    store: Arc<dyn Store>,
    entity: &EntityMetadata,
    key: &Value,
    request: &QueryRequest,
    naming: NamingPolicy,
) -> Result<ApiResult, AppError> {
    let mut session = Session::new(store);
    let Some(id) = session.find(&entity.source_type, key).await? else {
        return Ok(not_found(entity, key));
    };
    let tree = ExpandTree::from_paths(&request.expand);
    let value = shape(&mut session, id, &tree, request.select.as_deref(), naming).await?;
    Ok(ApiResult::ok(value))
}

async fn shape(
    session: &mut Session,
    id: EntryId,
    tree: &ExpandTree,
    select: Option<&[String]>,
    naming: NamingPolicy,
) -> Result<Value, AppError> {
    let mut value = expand(session, id, tree).await?;
    if let (Some(select), Value::Object(map)) = (select, &mut value) {
        map.retain(|k, _| select.contains(k) || tree.0.contains_key(k));
    }
    naming.to_wire(&mut value);
    Ok(value)
}

fn expand<'a>(session: &'a mut Session, id: EntryId, tree: &'a ExpandTree) -> Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send + 'a>> {
    Box::pin(async move {
        let mut map = session.instance(id).clone();
        for (name, subtree) in &tree.0 {
            session.load(id, name).await?;
            let collection = session
                .schema()
                .find_entity_type(session.type_name(id))
                .and_then(|t| t.navigation(name))
                .map_or(false, |n| n.is_collection());
            let v = if collection {
                let children = session.collection(id, name).to_vec();
                let mut items = Vec::with_capacity(children.len());
                for child in children {
                    items.push(expand(session, child, subtree).await?);
                }
                Value::Array(items)
            } else {
                match session.reference(id, name) {
                    Some(target) => expand(session, target, subtree).await?,
                    None => Value::Null,
                }
            };
            map.insert(name.clone(), v);
        }
        Ok(Value::Object(map))
    })
}
