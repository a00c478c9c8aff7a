//! PostgreSQL store over sqlx. One transaction per commit.

use super::{Change, Store, StoreQuery};
use crate::error::StoreError;
use crate::query::FilterExpr;
use crate::schema::{Instance, ScalarType, SchemaModel, SchemaType};
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;

pub struct PgStore {
    pool: PgPool,
    schema: Arc<SchemaModel>,
    /// Postgres schema for types that name none.
    default_schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: Arc<SchemaModel>, default_schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            schema,
            default_schema: default_schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn entity_type(&self, name: &str) -> Result<&SchemaType, StoreError> {
        self.schema
            .find_entity_type(name)
            .ok_or_else(|| StoreError::UnknownType(name.to_string()))
    }

    fn bind(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(&p.value));
        }
        query
    }

    async fn fetch_rows(&self, ty: &SchemaType, q: &QueryBuf) -> Result<Vec<Instance>, StoreError> {
        let rows = Self::bind(q).fetch_all(&self.pool).await?;
        rows.iter().map(|r| row_to_instance(ty, r)).collect()
    }
}

/// Decode a row by the schema's declared column types.
fn row_to_instance(ty: &SchemaType, row: &PgRow) -> Result<Instance, StoreError> {
    let mut map = Instance::new();
    for p in &ty.properties {
        map.insert(p.name.clone(), cell_to_value(row, &p.name, p.scalar_type)?);
    }
    for c in &ty.complex_properties {
        let v: Option<Value> = row.try_get(c.name.as_str())?;
        map.insert(c.name.clone(), v.unwrap_or(Value::Null));
    }
    Ok(map)
}

fn float(f: Option<f64>) -> Value {
    f.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null)
}

fn cell_to_value(row: &PgRow, name: &str, scalar_type: ScalarType) -> Result<Value, StoreError> {
    Ok(match scalar_type {
        ScalarType::Int => row.try_get::<Option<i32>, _>(name)?.map(Value::from).unwrap_or(Value::Null),
        ScalarType::Long => row.try_get::<Option<i64>, _>(name)?.map(Value::from).unwrap_or(Value::Null),
        ScalarType::Float => float(row.try_get::<Option<f32>, _>(name)?.map(f64::from)),
        ScalarType::Double => float(row.try_get::<Option<f64>, _>(name)?),
        ScalarType::Decimal => {
            let text: Option<String> = row.try_get(name)?;
            match text {
                Some(t) => ScalarType::Decimal
                    .coerce(&Value::String(t))
                    .map_err(StoreError::Unsupported)?,
                None => Value::Null,
            }
        }
        ScalarType::Bool => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool).unwrap_or(Value::Null),
        ScalarType::Guid => row
            .try_get::<Option<uuid::Uuid>, _>(name)?
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        ScalarType::DateTime => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
            .map(|dt| Value::String(dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)))
            .unwrap_or(Value::Null),
        ScalarType::String => row.try_get::<Option<String>, _>(name)?.map(Value::String).unwrap_or(Value::Null),
    })
}

#[async_trait]
impl Store for PgStore {
    fn schema(&self) -> &Arc<SchemaModel> {
        &self.schema
    }

    async fn find(&self, entity_type: &str, key: &Value) -> Result<Option<Instance>, StoreError> {
        let ty = self.entity_type(entity_type)?;
        let q = sql::select_by_key(ty, &self.default_schema, key);
        Ok(self.fetch_rows(ty, &q).await?.into_iter().next())
    }

    async fn find_by(&self, entity_type: &str, property: &str, value: &Value) -> Result<Vec<Instance>, StoreError> {
        let ty = self.entity_type(entity_type)?;
        let q = sql::select_where_eq(ty, &self.default_schema, property, value);
        self.fetch_rows(ty, &q).await
    }

    async fn query(&self, entity_type: &str, query: &StoreQuery) -> Result<Vec<Instance>, StoreError> {
        let ty = self.entity_type(entity_type)?;
        let q = sql::select_list(ty, &self.default_schema, query);
        self.fetch_rows(ty, &q).await
    }

    async fn count(&self, entity_type: &str, filter: Option<&FilterExpr>) -> Result<u64, StoreError> {
        let ty = self.entity_type(entity_type)?;
        let q = sql::count(ty, &self.default_schema, filter);
        let row = Self::bind(&q).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn next_key(&self, entity_type: &str) -> Result<Value, StoreError> {
        let ty = self.entity_type(entity_type)?;
        let key = self
            .schema
            .find_primary_key(entity_type)
            .map_err(|e| StoreError::Unsupported(e.to_string()))?;
        match key.scalar_type {
            ScalarType::Guid => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
            ScalarType::Int | ScalarType::Long => {
                let q = sql::next_key(ty, &self.default_schema);
                let row = Self::bind(&q).fetch_one(&self.pool).await?;
                let n: Option<i64> = row.try_get(0)?;
                n.map(Value::from).ok_or_else(|| {
                    StoreError::Unsupported(format!("{}.{} has no sequence", ty.table, key.name))
                })
            }
            ScalarType::String => Err(StoreError::MissingKey {
                entity_type: entity_type.to_string(),
            }),
            other => Err(StoreError::Unsupported(format!("generated {:?} keys", other))),
        }
    }

    async fn apply(&self, changes: Vec<Change>) -> Result<u64, StoreError> {
        let mut affected = 0;
        let mut tx = self.pool.begin().await?;
        for change in &changes {
            let q = match change {
                Change::Insert { entity_type, row } => {
                    sql::insert(self.entity_type(entity_type)?, &self.default_schema, row)
                }
                Change::Update {
                    entity_type,
                    key,
                    values,
                } => {
                    let ty = self.entity_type(entity_type)?;
                    if ty.row_values(values).is_empty() {
                        continue;
                    }
                    sql::update(ty, &self.default_schema, key, values)
                }
                Change::Delete { entity_type, key } => {
                    sql::delete(self.entity_type(entity_type)?, &self.default_schema, key)
                }
            };
            let result = Self::bind(&q).execute(&mut *tx).await.map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(db.message().to_string()),
                _ => StoreError::Db(e),
            })?;
            affected += result.rows_affected();
        }
        tx.commit().await?;
        tracing::debug!(affected, changes = changes.len(), "committed");
        Ok(affected)
    }
}
