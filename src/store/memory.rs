//! In-process store for tests and demos. Commits copy the tables, apply, then swap.

use super::{key_string, Change, Store, StoreQuery};
use crate::error::StoreError;
use crate::query::filter::compare_values;
use crate::query::FilterExpr;
use crate::schema::{as_decimal, Instance, ScalarType, SchemaModel};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};

type Tables = HashMap<String, HashMap<String, Instance>>;

pub struct MemoryStore {
    schema: Arc<SchemaModel>,
    tables: RwLock<Tables>,
    sequences: Mutex<HashMap<String, i64>>,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new(schema: Arc<SchemaModel>) -> Self {
        MemoryStore {
            schema,
            tables: RwLock::new(HashMap::new()),
            sequences: Mutex::new(HashMap::new()),
            commits: AtomicU64::new(0),
        }
    }

    fn key_property(&self, entity_type: &str) -> Result<(String, ScalarType), StoreError> {
        if self.schema.find_entity_type(entity_type).is_none() {
            return Err(StoreError::UnknownType(entity_type.to_string()));
        }
        self.schema
            .find_primary_key(entity_type)
            .map(|p| (p.name.clone(), p.scalar_type))
            .map_err(|e| StoreError::Unsupported(e.to_string()))
    }

    /// Insert rows directly, bypassing commit accounting.
    pub fn seed(&self, entity_type: &str, rows: impl IntoIterator<Item = Instance>) -> Result<(), StoreError> {
        let (key_name, _) = self.key_property(entity_type)?;
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let table = tables.entry(entity_type.to_string()).or_default();
        for row in rows {
            let key = row
                .get(&key_name)
                .filter(|k| !k.is_null())
                .ok_or_else(|| StoreError::MissingKey {
                    entity_type: entity_type.to_string(),
                })?;
            table.insert(key_string(key), row);
        }
        Ok(())
    }

    /// All rows of a type in key order.
    pub fn rows(&self, entity_type: &str) -> Vec<Instance> {
        let Ok((key_name, key_type)) = self.key_property(entity_type) else {
            return Vec::new();
        };
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<Instance> = tables
            .get(entity_type)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| compare_field(a, b, &key_name, Some(key_type)));
        rows
    }

    /// Number of commits that changed at least one row.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(AtomicOrdering::SeqCst)
    }

    fn matching(&self, entity_type: &str, filter: Option<&FilterExpr>) -> Vec<Instance> {
        self.rows(entity_type)
            .into_iter()
            .filter(|row| filter.map_or(true, |f| f.matches(row)))
            .collect()
    }
}

fn compare_field(a: &Instance, b: &Instance, field: &str, scalar_type: Option<ScalarType>) -> Ordering {
    let (x, y) = (a.get(field).unwrap_or(&Value::Null), b.get(field).unwrap_or(&Value::Null));
    match (x.is_null(), y.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ if scalar_type == Some(ScalarType::Decimal) => as_decimal(x)
            .zip(as_decimal(y))
            .map_or(Ordering::Equal, |(l, r)| l.cmp(&r)),
        _ => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}

fn apply_change(tables: &mut Tables, key_of: &impl Fn(&str) -> Result<String, StoreError>, change: Change) -> Result<u64, StoreError> {
    match change {
        Change::Insert { entity_type, row } => {
            let key_name = key_of(&entity_type)?;
            let key = row
                .get(&key_name)
                .filter(|k| !k.is_null())
                .map(key_string)
                .ok_or_else(|| StoreError::MissingKey {
                    entity_type: entity_type.clone(),
                })?;
            let table = tables.entry(entity_type.clone()).or_default();
            if table.contains_key(&key) {
                return Err(StoreError::Conflict(format!("{} with key {} already exists", entity_type, key)));
            }
            table.insert(key, row);
            Ok(1)
        }
        Change::Update {
            entity_type,
            key,
            values,
        } => {
            if values.is_empty() {
                return Ok(0);
            }
            match tables.get_mut(&entity_type).and_then(|t| t.get_mut(&key_string(&key))) {
                Some(row) => {
                    row.extend(values);
                    Ok(1)
                }
                None => Ok(0),
            }
        }
        Change::Delete { entity_type, key } => Ok(tables
            .get_mut(&entity_type)
            .and_then(|t| t.remove(&key_string(&key)))
            .map_or(0, |_| 1)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn schema(&self) -> &Arc<SchemaModel> {
        &self.schema
    }

    async fn find(&self, entity_type: &str, key: &Value) -> Result<Option<Instance>, StoreError> {
        self.key_property(entity_type)?;
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables
            .get(entity_type)
            .and_then(|t| t.get(&key_string(key)))
            .cloned())
    }

    async fn find_by(&self, entity_type: &str, property: &str, value: &Value) -> Result<Vec<Instance>, StoreError> {
        self.key_property(entity_type)?;
        let filter = FilterExpr::Compare {
            property: property.to_string(),
            scalar_type: ScalarType::String,
            op: crate::query::CompareOp::Eq,
            value: value.clone(),
        };
        Ok(self.matching(entity_type, Some(&filter)))
    }

    async fn query(&self, entity_type: &str, query: &StoreQuery) -> Result<Vec<Instance>, StoreError> {
        self.key_property(entity_type)?;
        let mut rows = self.matching(entity_type, query.filter.as_ref());
        if !query.order_by.is_empty() {
            let ty = self.schema.find_entity_type(entity_type);
            let types: Vec<Option<ScalarType>> = query
                .order_by
                .iter()
                .map(|o| ty.and_then(|t| t.property(&o.property)).map(|p| p.scalar_type))
                .collect();
            rows.sort_by(|a, b| {
                query
                    .order_by
                    .iter()
                    .zip(&types)
                    .map(|(o, &scalar_type)| {
                        let ord = compare_field(a, b, &o.property, scalar_type);
                        if o.descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        let skip = query.skip.unwrap_or(0) as usize;
        let top = query.top.map_or(usize::MAX, |t| t as usize);
        Ok(rows.into_iter().skip(skip).take(top).collect())
    }

    async fn count(&self, entity_type: &str, filter: Option<&FilterExpr>) -> Result<u64, StoreError> {
        self.key_property(entity_type)?;
        Ok(self.matching(entity_type, filter).len() as u64)
    }

    async fn next_key(&self, entity_type: &str) -> Result<Value, StoreError> {
        let (key_name, key_type) = self.key_property(entity_type)?;
        match key_type {
            ScalarType::Guid => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
            ScalarType::Int | ScalarType::Long => {
                let max_existing = self
                    .rows(entity_type)
                    .iter()
                    .filter_map(|r| r.get(&key_name).and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0);
                let mut sequences = self.sequences.lock().unwrap_or_else(|e| e.into_inner());
                let seq = sequences.entry(entity_type.to_string()).or_insert(0);
                *seq = (*seq).max(max_existing) + 1;
                Ok(Value::from(*seq))
            }
            ScalarType::String => Err(StoreError::MissingKey {
                entity_type: entity_type.to_string(),
            }),
            other => Err(StoreError::Unsupported(format!("generated {:?} keys", other))),
        }
    }

    async fn apply(&self, changes: Vec<Change>) -> Result<u64, StoreError> {
        let key_of = |ty: &str| self.key_property(ty).map(|(name, _)| name);
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let mut working = tables.clone();
        let mut affected = 0;
        for change in changes {
            affected += apply_change(&mut working, &key_of, change)?;
        }
        *tables = working;
        if affected > 0 {
            self.commits.fetch_add(1, AtomicOrdering::SeqCst);
        }
        tracing::debug!(affected, "memory store commit");
        Ok(affected)
    }
}
