//! Store schema model: entity types, their scalar, complex and navigation members.

mod scalar;
pub mod taxonomy;

pub use scalar::ScalarType;
pub(crate) use scalar::as_decimal;
pub(crate) use scalar::json_kind;
pub use taxonomy::{PropertyMatch, PropertyTaxonomy};

use crate::config::{validate_schema, EntityTypeConfig, NavigationKind, SchemaConfig};
use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A persisted row (or embedded value) keyed by schema property name.
pub type Instance = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub name: String,
    pub scalar_type: ScalarType,
    pub nullable: bool,
}

impl Property {
    /// Value a freshly created instance gets when the payload leaves this property out.
    pub fn default_value(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            self.scalar_type.default_value()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ComplexProperty {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    pub properties: Vec<Property>,
}

#[derive(Clone, Debug)]
pub struct Navigation {
    pub name: String,
    pub target_type: String,
    pub kind: NavigationKind,
    pub foreign_key: String,
}

impl Navigation {
    pub fn is_collection(&self) -> bool {
        self.kind == NavigationKind::Collection
    }
}

#[derive(Clone, Debug)]
pub struct SchemaType {
    pub name: String,
    pub table: String,
    pub schema: Option<String>,
    pub key: Vec<String>,
    pub properties: Vec<Property>,
    pub complex_properties: Vec<ComplexProperty>,
    pub navigations: Vec<Navigation>,
}

impl SchemaType {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.name == name)
    }

    pub fn complex_property(&self, name: &str) -> Option<&ComplexProperty> {
        self.complex_properties.iter().find(|c| c.name == name)
    }

    /// Stored columns only: scalars and complex values, never navigation payloads.
    pub fn row_values(&self, instance: &Instance) -> Instance {
        instance
            .iter()
            .filter(|(k, _)| self.property(k).is_some() || self.complex_property(k).is_some())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Fill members absent from `row` with their defaults (nested into complex values too).
    pub fn fill_defaults(&self, row: &mut Instance) {
        for p in &self.properties {
            row.entry(p.name.clone()).or_insert_with(|| p.default_value());
        }
        for c in &self.complex_properties {
            match row.get_mut(&c.name) {
                Some(Value::Object(nested)) => {
                    for p in &c.properties {
                        nested.entry(p.name.clone()).or_insert_with(|| p.default_value());
                    }
                }
                Some(_) => {}
                None if c.nullable => {
                    row.insert(c.name.clone(), Value::Null);
                }
                None => {
                    let nested: Instance = c
                        .properties
                        .iter()
                        .map(|p| (p.name.clone(), p.default_value()))
                        .collect();
                    row.insert(c.name.clone(), Value::Object(nested));
                }
            }
        }
    }
}

/// Read-only schema lookups the rest of the crate needs from the store.
#[derive(Clone, Debug, Default)]
pub struct SchemaModel {
    types: Vec<SchemaType>,
    by_name: HashMap<String, usize>,
}

impl SchemaModel {
    pub fn from_config(config: &SchemaConfig) -> Result<Self, ConfigError> {
        validate_schema(config)?;
        let types: Vec<SchemaType> = config.types.iter().map(build_type).collect();
        let by_name = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Ok(SchemaModel { types, by_name })
    }

    pub fn types(&self) -> &[SchemaType] {
        &self.types
    }

    pub fn find_entity_type(&self, name: &str) -> Option<&SchemaType> {
        self.by_name.get(name).map(|&i| &self.types[i])
    }

    pub fn entity_type(&self, name: &str) -> Result<&SchemaType, ConfigError> {
        self.find_entity_type(name).ok_or_else(|| ConfigError::MissingReference {
            kind: "entity type",
            id: name.to_string(),
        })
    }

    /// The single key property of `type_name`; composite or missing keys are an error.
    pub fn find_primary_key(&self, type_name: &str) -> Result<&Property, ConfigError> {
        let ty = self.entity_type(type_name)?;
        match ty.key.as_slice() {
            [single] => ty.property(single).ok_or_else(|| ConfigError::InvalidPrimaryKey {
                type_name: ty.name.clone(),
                reason: format!("key property '{}' does not exist", single),
            }),
            [] => Err(ConfigError::InvalidPrimaryKey {
                type_name: ty.name.clone(),
                reason: "no key declared".into(),
            }),
            many => Err(ConfigError::InvalidPrimaryKey {
                type_name: ty.name.clone(),
                reason: format!("composite key ({}) is not supported", many.join(", ")),
            }),
        }
    }

    pub fn navigations(&self, type_name: &str) -> &[Navigation] {
        self.find_entity_type(type_name)
            .map(|t| t.navigations.as_slice())
            .unwrap_or(&[])
    }

    pub fn complex_properties(&self, type_name: &str) -> &[ComplexProperty] {
        self.find_entity_type(type_name)
            .map(|t| t.complex_properties.as_slice())
            .unwrap_or(&[])
    }
}

fn build_type(t: &EntityTypeConfig) -> SchemaType {
    let property = |p: &crate::config::PropertyConfig| Property {
        name: p.name.clone(),
        scalar_type: p.type_,
        // key columns are never null
        nullable: p.nullable && !t.key.contains(&p.name),
    };
    SchemaType {
        name: t.name.clone(),
        table: t
            .table
            .clone()
            .unwrap_or_else(|| crate::case::to_snake_case(&crate::case::pluralize(&t.name))),
        schema: t.schema.clone(),
        key: t.key.clone(),
        properties: t.properties.iter().map(property).collect(),
        complex_properties: t
            .complex_properties
            .iter()
            .map(|c| ComplexProperty {
                name: c.name.clone(),
                type_name: c.type_name.clone(),
                nullable: c.nullable,
                properties: c
                    .properties
                    .iter()
                    .map(|p| Property {
                        name: p.name.clone(),
                        scalar_type: p.type_,
                        nullable: p.nullable,
                    })
                    .collect(),
            })
            .collect(),
        navigations: t
            .navigations
            .iter()
            .map(|n| Navigation {
                name: n.name.clone(),
                target_type: n.target_type.clone(),
                kind: n.kind,
                foreign_key: n.foreign_key.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(json: Value) -> SchemaModel {
        let config: SchemaConfig = serde_json::from_value(json).unwrap();
        SchemaModel::from_config(&config).unwrap()
    }

    #[test]
    fn primary_key_must_be_single() {
        let m = model(json!({ "types": [
            { "name": "Line", "key": ["order_id", "no"], "properties": [
                { "name": "order_id", "type": "int" }, { "name": "no", "type": "int" }
            ] },
            { "name": "Tag", "key": [], "properties": [{ "name": "label", "type": "string" }] }
        ] }));
        assert!(matches!(
            m.find_primary_key("Line"),
            Err(ConfigError::InvalidPrimaryKey { .. })
        ));
        assert!(matches!(
            m.find_primary_key("Tag"),
            Err(ConfigError::InvalidPrimaryKey { .. })
        ));
        assert!(m.find_primary_key("Nope").is_err());
    }

    #[test]
    fn defaults_fill_missing_members() {
        let m = model(json!({ "types": [
            { "name": "Payment", "key": ["id"], "properties": [
                { "name": "id", "type": "int" },
                { "name": "amount", "type": "decimal", "nullable": false },
                { "name": "note", "type": "string" }
            ], "complex_properties": [
                { "name": "payment_info", "type_name": "PaymentInfo", "nullable": false, "properties": [
                    { "name": "card_number", "type": "string" },
                    { "name": "expires", "type": "int", "nullable": false }
                ] }
            ] }
        ] }));
        let ty = m.find_entity_type("Payment").unwrap();
        assert_eq!(ty.table, "payments");
        let mut row = Instance::new();
        row.insert("note".into(), json!("x"));
        ty.fill_defaults(&mut row);
        assert_eq!(row["amount"], json!(0));
        assert_eq!(row["note"], json!("x"));
        assert_eq!(row["payment_info"], json!({ "card_number": null, "expires": 0 }));
    }
}
