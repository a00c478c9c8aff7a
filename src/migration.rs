//! Bootstrap DDL for the schema model: CREATE SCHEMA, CREATE TABLE IF NOT EXISTS, then foreign keys.
//! Idempotent; existing tables are left as they are.

use crate::error::AppError;
use crate::schema::{ScalarType, SchemaModel, SchemaType};
use crate::sql::{qualified_table, quoted};
use sqlx::PgPool;
use std::collections::BTreeSet;

/// Column type for a key column; single integer keys get a sequence.
fn key_type_str(ty: &SchemaType, scalar_type: ScalarType) -> &'static str {
    match (ty.key.len(), scalar_type) {
        (1, ScalarType::Int) => "SERIAL",
        (1, ScalarType::Long) => "BIGSERIAL",
        _ => scalar_type.pg_type(),
    }
}

/// CREATE TABLE statement for one schema type.
pub fn table_ddl(ty: &SchemaType, default_schema: &str) -> String {
    let mut col_defs: Vec<String> = Vec::new();
    for p in &ty.properties {
        let typ = if ty.key.contains(&p.name) {
            key_type_str(ty, p.scalar_type)
        } else {
            p.scalar_type.pg_type()
        };
        let mut def = format!("{} {}", quoted(&p.name), typ);
        if !p.nullable {
            def.push_str(" NOT NULL");
        }
        col_defs.push(def);
    }
    for c in &ty.complex_properties {
        let mut def = format!("{} JSONB", quoted(&c.name));
        if !c.nullable {
            def.push_str(" NOT NULL");
        }
        col_defs.push(def);
    }
    if !ty.key.is_empty() {
        let pk: Vec<String> = ty.key.iter().map(|k| quoted(k)).collect();
        col_defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(ty, default_schema),
        col_defs.join(",\n  ")
    )
}

/// One `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY` per navigation pair.
/// A reference keeps its foreign key on the owner; a collection keeps it on the target.
pub fn foreign_key_ddl(schema: &SchemaModel, default_schema: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for ty in schema.types() {
        for nav in &ty.navigations {
            let Some(target) = schema.find_entity_type(&nav.target_type) else {
                continue;
            };
            let (child, parent) = if nav.is_collection() { (target, ty) } else { (ty, target) };
            let Some(parent_key) = parent.key.first().filter(|_| parent.key.len() == 1) else {
                continue;
            };
            if !seen.insert((child.name.clone(), nav.foreign_key.clone())) {
                continue;
            }
            let constraint = format!("fk_{}_{}", child.table, nav.foreign_key);
            out.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                qualified_table(child, default_schema),
                quoted(&constraint),
                quoted(&nav.foreign_key),
                qualified_table(parent, default_schema),
                quoted(parent_key)
            ));
        }
    }
    out
}

/// Create schemas and tables for every type, then add foreign keys.
/// Foreign keys that already exist are skipped.
pub async fn ensure_tables(pool: &PgPool, schema: &SchemaModel, default_schema: &str) -> Result<(), AppError> {
    let schemas: BTreeSet<&str> = schema
        .types()
        .iter()
        .map(|t| t.schema.as_deref().unwrap_or(default_schema))
        .collect();
    for s in schemas {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(s)))
            .execute(pool)
            .await
            .map_err(crate::error::StoreError::from)?;
    }
    for ty in schema.types() {
        let sql = table_ddl(ty, default_schema);
        tracing::debug!(sql = %sql, "ensure table");
        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(crate::error::StoreError::from)?;
    }
    for sql in foreign_key_ddl(schema, default_schema) {
        if let Err(e) = sqlx::query(&sql).execute(pool).await {
            tracing::debug!(error = %e, sql = %sql, "foreign key skipped");
        }
    }
    tracing::info!(types = schema.types().len(), "tables ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use serde_json::json;

    fn schema() -> SchemaModel {
        let config: SchemaConfig = serde_json::from_value(json!({ "types": [
            { "name": "Customer", "key": ["id"], "properties": [
                { "name": "id", "type": "int" }, { "name": "name", "type": "string", "nullable": false }
            ], "navigations": [
                { "name": "payments", "target_type": "Payment", "kind": "collection", "foreign_key": "customer_id" }
            ] },
            { "name": "Payment", "key": ["id"], "properties": [
                { "name": "id", "type": "guid" }, { "name": "customer_id", "type": "int" }
            ], "complex_properties": [
                { "name": "payment_info", "type_name": "PaymentInfo", "properties": [{ "name": "card_number", "type": "string" }] }
            ], "navigations": [
                { "name": "customer", "target_type": "Customer", "kind": "reference", "foreign_key": "customer_id" }
            ] }
        ] }))
        .unwrap();
        SchemaModel::from_config(&config).unwrap()
    }

    #[test]
    fn integer_keys_are_serial_and_complex_values_jsonb() {
        let s = schema();
        let customer = table_ddl(s.find_entity_type("Customer").unwrap(), "public");
        assert!(customer.contains(r#""id" SERIAL NOT NULL"#));
        assert!(customer.contains(r#""name" text NOT NULL"#));
        let payment = table_ddl(s.find_entity_type("Payment").unwrap(), "public");
        assert!(payment.contains(r#""id" uuid NOT NULL"#));
        assert!(payment.contains(r#""payment_info" JSONB"#));
        assert!(payment.contains(r#"PRIMARY KEY ("id")"#));
    }

    #[test]
    fn navigation_pair_yields_one_foreign_key() {
        let fks = foreign_key_ddl(&schema(), "public");
        assert_eq!(fks.len(), 1);
        assert_eq!(
            fks[0],
            r#"ALTER TABLE "public"."payments" ADD CONSTRAINT "fk_payments_customer_id" FOREIGN KEY ("customer_id") REFERENCES "public"."customers" ("id")"#
        );
    }
}
