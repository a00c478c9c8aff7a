//! Graph persistence: apply a delta tree to the stored object graph in one session.
//!
//! Navigations named in the delta are loaded (once) before they are walked. Nested nodes
//! whose key already exists are linked and patched; all others are inserted and linked.
//! On patch only members present in the delta are written.

use super::session::{EntryId, Session};
use crate::case::NamingPolicy;
use crate::delta::{DeltaNode, DeltaValue};
use crate::error::AppError;
use crate::metadata::EntityMetadata;
use crate::response::ApiResult;
use crate::schema::Instance;
use crate::store::{key_string, Store};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Entities a walk touched, so the response can show the graph as committed.
struct Touched {
    id: EntryId,
    navigations: Vec<(String, TouchedNav)>,
}

enum TouchedNav {
    One(Option<Touched>),
    Many(Vec<Touched>),
}

pub async fn create(store: Arc<dyn Store>, entity: &EntityMetadata, delta: &DeltaNode, naming: NamingPolicy) -> Result<ApiResult, AppError> {
    create_in(&mut Session::new(store), entity, delta, naming).await
}

pub(crate) async fn create_in(
    session: &mut Session,
    entity: &EntityMetadata,
    delta: &DeltaNode,
    naming: NamingPolicy,
) -> Result<ApiResult, AppError> {
    let root = insert_node(session, delta).await?;
    let affected = session.commit().await?;
    if affected == 0 {
        return Ok(ApiResult::failed("Failed to create entity"));
    }
    tracing::info!(entity = %entity.name, key = %key_string(session.key(root.id)), affected, "created");
    Ok(ApiResult::created(render(session, &root, naming)))
}

pub async fn patch(
    store: Arc<dyn Store>,
    entity: &EntityMetadata,
    key: &Value,
    delta: &DeltaNode,
    naming: NamingPolicy,
) -> Result<ApiResult, AppError> {
    let mut session = Session::new(store);
    let Some(id) = session.find(&entity.source_type, key).await? else {
        return Ok(not_found(entity, key));
    };
    let root = patch_node(&mut session, id, delta).await?;
    let affected = session.commit().await?;
    if affected == 0 {
        return Ok(ApiResult::failed("Failed to update entity"));
    }
    tracing::info!(entity = %entity.name, key = %key_string(key), affected, "patched");
    Ok(ApiResult::ok(render(&session, &root, naming)))
}

pub async fn delete(store: Arc<dyn Store>, entity: &EntityMetadata, key: &Value) -> Result<ApiResult, AppError> {
    let mut session = Session::new(store);
    let Some(id) = session.find(&entity.source_type, key).await? else {
        return Ok(not_found(entity, key));
    };
    session.remove(id);
    if session.commit().await? == 0 {
        return Ok(ApiResult::failed("Failed to delete entity"));
    }
    tracing::info!(entity = %entity.name, key = %key_string(key), "deleted");
    Ok(ApiResult::no_content())
}

pub(crate) fn not_found(entity: &EntityMetadata, key: &Value) -> ApiResult {
    ApiResult::not_found(format!("{} with key {} not found", entity.name, key_string(key)))
}

fn insert_node<'a>(session: &'a mut Session, node: &'a DeltaNode) -> BoxFuture<'a, Result<Touched, AppError>> {
    Box::pin(async move {
        let id = session.add(&node.type_name, node.instance().clone()).await?;
        let navigations = walk_navigations(session, id, node).await?;
        Ok(Touched { id, navigations })
    })
}

fn patch_node<'a>(session: &'a mut Session, id: EntryId, node: &'a DeltaNode) -> BoxFuture<'a, Result<Touched, AppError>> {
    Box::pin(async move {
        let navigations = walk_navigations(session, id, node).await?;
        apply_members(session, id, node)?;
        Ok(Touched { id, navigations })
    })
}

/// Existing row (by supplied key) is patched; anything else is inserted.
fn upsert_node<'a>(session: &'a mut Session, node: &'a DeltaNode) -> BoxFuture<'a, Result<Touched, AppError>> {
    Box::pin(async move {
        let key_name = session.schema().find_primary_key(&node.type_name)?.name.clone();
        if let Some(key) = node.scalar(&key_name).filter(|k| !k.is_null()) {
            if let Some(existing) = session.find(&node.type_name, key).await? {
                return patch_node(session, existing, node).await;
            }
        }
        insert_node(session, node).await
    })
}

async fn walk_navigations(session: &mut Session, id: EntryId, node: &DeltaNode) -> Result<Vec<(String, TouchedNav)>, AppError> {
    let mut touched = Vec::new();
    for (name, value) in node.changed() {
        let is_navigation = session
            .schema()
            .find_entity_type(&node.type_name)
            .and_then(|t| t.navigation(name))
            .is_some();
        if !is_navigation {
            continue;
        }
        session.load(id, name).await?;
        match value {
            DeltaValue::Node(child) => {
                let t = upsert_node(session, child).await?;
                session.set_reference(id, name, Some(t.id))?;
                touched.push((name.to_string(), TouchedNav::One(Some(t))));
            }
            DeltaValue::Set(set) => {
                let mut items = Vec::with_capacity(set.len());
                for item in &set.items {
                    let t = upsert_node(session, item).await?;
                    session.add_to_collection(id, name, t.id)?;
                    items.push(t);
                }
                touched.push((name.to_string(), TouchedNav::Many(items)));
            }
            DeltaValue::Scalar(_) => {
                session.set_reference(id, name, None)?;
                touched.push((name.to_string(), TouchedNav::One(None)));
            }
        }
    }
    Ok(touched)
}

/// Overwrite the scalars present in the delta; complex values merge their present members.
fn apply_members(session: &mut Session, id: EntryId, node: &DeltaNode) -> Result<(), AppError> {
    let ty = session.schema().entity_type(&node.type_name)?.clone();
    for (name, value) in node.changed() {
        if ty.key.iter().any(|k| k == name) {
            continue;
        }
        if ty.property(name).is_some() {
            if let DeltaValue::Scalar(v) = value {
                session.set_value(id, name, v.clone());
            }
        } else if ty.complex_property(name).is_some() {
            let merged = match value {
                DeltaValue::Node(complex) => {
                    let mut current = match session.instance(id).get(name) {
                        Some(Value::Object(m)) => m.clone(),
                        _ => Instance::new(),
                    };
                    for (member, v) in complex.changed() {
                        if let DeltaValue::Scalar(v) = v {
                            current.insert(member.to_string(), v.clone());
                        }
                    }
                    Value::Object(current)
                }
                _ => Value::Null,
            };
            session.set_value(id, name, merged);
        }
    }
    Ok(())
}

fn render(session: &Session, touched: &Touched, naming: NamingPolicy) -> Value {
    let mut value = render_node(session, touched);
    naming.to_wire(&mut value);
    value
}

fn render_node(session: &Session, touched: &Touched) -> Value {
    let mut map = session.instance(touched.id).clone();
    for (name, nav) in &touched.navigations {
        let v = match nav {
            TouchedNav::One(Some(t)) => render_node(session, t),
            TouchedNav::One(None) => Value::Null,
            TouchedNav::Many(items) => Value::Array(items.iter().map(|t| render_node(session, t)).collect()),
        };
        map.insert(name.clone(), v);
    }
    Value::Object(map)
}
