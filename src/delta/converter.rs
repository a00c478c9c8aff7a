//! Single-pass, all-or-nothing conversion of a JSON payload into a delta tree.

use super::{DeltaKind, DeltaNode, DeltaSet, DeltaValue};
use crate::case::NamingPolicy;
use crate::error::PayloadError;
use crate::schema::{json_kind, ComplexProperty, Property, PropertyMatch, PropertyTaxonomy, SchemaModel};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shared by all requests; taxonomies are built once per type and cached.
pub struct DeltaConverter {
    schema: Arc<SchemaModel>,
    naming: NamingPolicy,
    taxonomies: RwLock<HashMap<String, Arc<PropertyTaxonomy>>>,
}

impl DeltaConverter {
    pub fn new(schema: Arc<SchemaModel>, naming: NamingPolicy) -> Self {
        DeltaConverter {
            schema,
            naming,
            taxonomies: RwLock::new(HashMap::new()),
        }
    }

    pub fn naming(&self) -> NamingPolicy {
        self.naming
    }

    /// Parse a raw request body.
    pub fn parse_slice(&self, entity_type: &str, body: &[u8]) -> Result<DeltaNode, PayloadError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| PayloadError::Malformed {
            path: "$".into(),
            message: e.to_string(),
        })?;
        self.parse(entity_type, &value)
    }

    pub fn parse(&self, entity_type: &str, payload: &Value) -> Result<DeltaNode, PayloadError> {
        let taxonomy = self.entity_taxonomy(entity_type)?;
        let node = self.parse_node(&taxonomy, DeltaKind::Entity, payload, "$")?;
        tracing::debug!(entity = %entity_type, changed = ?node.changed_names(), "parsed delta");
        Ok(node)
    }

    fn cached(&self, key: &str, build: impl FnOnce() -> Result<PropertyTaxonomy, PayloadError>) -> Result<Arc<PropertyTaxonomy>, PayloadError> {
        if let Some(t) = self.taxonomies.read().unwrap_or_else(|e| e.into_inner()).get(key) {
            return Ok(t.clone());
        }
        let built = Arc::new(build()?);
        let mut map = self.taxonomies.write().unwrap_or_else(|e| e.into_inner());
        Ok(map.entry(key.to_string()).or_insert(built).clone())
    }

    fn entity_taxonomy(&self, entity_type: &str) -> Result<Arc<PropertyTaxonomy>, PayloadError> {
        self.cached(entity_type, || {
            let ty = self
                .schema
                .find_entity_type(entity_type)
                .ok_or_else(|| PayloadError::UnknownType(entity_type.to_string()))?;
            Ok(PropertyTaxonomy::for_entity(ty, self.naming))
        })
    }

    fn complex_taxonomy(&self, owner: &str, complex: &ComplexProperty) -> Result<Arc<PropertyTaxonomy>, PayloadError> {
        let key = format!("{}#{}", owner, complex.name);
        self.cached(&key, || Ok(PropertyTaxonomy::for_complex(complex, self.naming)))
    }

    fn parse_node(
        &self,
        taxonomy: &PropertyTaxonomy,
        kind: DeltaKind,
        payload: &Value,
        path: &str,
    ) -> Result<DeltaNode, PayloadError> {
        let Value::Object(fields) = payload else {
            return Err(PayloadError::Malformed {
                path: path.to_string(),
                message: format!("expected an object, found {}", json_kind(payload)),
            });
        };
        let mut node = DeltaNode::new(taxonomy.type_name.clone(), kind);
        for (wire_name, raw) in fields {
            let member_path = format!("{}.{}", path, wire_name);
            let Some(member) = taxonomy.lookup(wire_name) else {
                tracing::trace!(path = %member_path, "skipping unknown member");
                continue;
            };
            match member {
                PropertyMatch::Scalar(p) => {
                    let value = coerce_scalar(p, raw, &member_path)?;
                    node.set(&p.name, DeltaValue::Scalar(value));
                }
                PropertyMatch::Complex(c) => {
                    if raw.is_null() {
                        if !c.nullable {
                            return Err(PayloadError::Malformed {
                                path: member_path,
                                message: "complex value is not nullable".into(),
                            });
                        }
                        node.set(&c.name, DeltaValue::Scalar(Value::Null));
                        continue;
                    }
                    let nested_taxonomy = self.complex_taxonomy(&taxonomy.type_name, c)?;
                    let nested = self.parse_node(&nested_taxonomy, DeltaKind::Complex, raw, &member_path)?;
                    node.set(&c.name, DeltaValue::Node(nested));
                }
                PropertyMatch::Collection(n) => {
                    let element_taxonomy = self.entity_taxonomy(&n.target_type)?;
                    let mut set = DeltaSet::new(n.target_type.clone());
                    match raw {
                        Value::Null => {}
                        Value::Array(items) => {
                            for (i, item) in items.iter().enumerate() {
                                let item_path = format!("{}[{}]", member_path, i);
                                set.items.push(self.parse_node(
                                    &element_taxonomy,
                                    DeltaKind::Entity,
                                    item,
                                    &item_path,
                                )?);
                            }
                        }
                        other => {
                            return Err(PayloadError::Malformed {
                                path: member_path,
                                message: format!("expected an array, found {}", json_kind(other)),
                            })
                        }
                    }
                    node.set(&n.name, DeltaValue::Set(set));
                }
                PropertyMatch::Reference(n) => {
                    if raw.is_null() {
                        node.set(&n.name, DeltaValue::Scalar(Value::Null));
                        continue;
                    }
                    let target_taxonomy = self.entity_taxonomy(&n.target_type)?;
                    let nested = self.parse_node(&target_taxonomy, DeltaKind::Entity, raw, &member_path)?;
                    node.set(&n.name, DeltaValue::Node(nested));
                }
            }
        }
        Ok(node)
    }
}

fn coerce_scalar(p: &Property, raw: &Value, path: &str) -> Result<Value, PayloadError> {
    if raw.is_null() && !p.nullable {
        return Err(PayloadError::TypeMismatch {
            path: path.to_string(),
            expected: p.scalar_type,
            message: "null is not allowed".into(),
        });
    }
    p.scalar_type.coerce(raw).map_err(|message| PayloadError::TypeMismatch {
        path: path.to_string(),
        expected: p.scalar_type,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;
    use crate::schema::ScalarType;
    use serde_json::json;

    fn converter() -> DeltaConverter {
        let config: SchemaConfig = serde_json::from_value(json!({ "types": [
            { "name": "Customer", "key": ["id"], "properties": [
                { "name": "id", "type": "int" }, { "name": "name", "type": "string" }
            ] },
            { "name": "Order", "key": ["id"], "properties": [
                { "name": "id", "type": "int" }, { "name": "payment_id", "type": "int" },
                { "name": "amount", "type": "decimal", "nullable": false }
            ] },
            { "name": "Payment", "key": ["id"], "properties": [
                { "name": "id", "type": "int" },
                { "name": "customer_id", "type": "int" },
                { "name": "total_amount", "type": "decimal", "nullable": false },
                { "name": "note", "type": "string" }
            ], "complex_properties": [
                { "name": "payment_info", "type_name": "PaymentInfo", "nullable": false, "properties": [
                    { "name": "card_number", "type": "string" }, { "name": "expires", "type": "int" }
                ] }
            ], "navigations": [
                { "name": "orders", "target_type": "Order", "kind": "collection", "foreign_key": "payment_id" },
                { "name": "customer", "target_type": "Customer", "kind": "reference", "foreign_key": "customer_id" }
            ] }
        ] }))
        .unwrap();
        DeltaConverter::new(Arc::new(SchemaModel::from_config(&config).unwrap()), NamingPolicy::Camel)
    }

    #[test]
    fn changed_set_is_exactly_the_supplied_members() {
        let c = converter();
        let node = c.parse("Payment", &json!({ "totalAmount": 0, "note": "" })).unwrap();
        assert_eq!(node.changed_names(), vec!["note", "total_amount"]);
        assert_eq!(node.scalar("total_amount"), Some(&json!(0)));
        assert!(!node.is_changed("customer_id"));
        assert!(!node.instance().contains_key("customer_id"));

        let empty = c.parse("Payment", &json!({})).unwrap();
        assert!(empty.changed_names().is_empty());
    }

    #[test]
    fn explicit_null_is_a_change() {
        let node = converter().parse("Payment", &json!({ "note": null })).unwrap();
        assert_eq!(node.scalar("note"), Some(&Value::Null));
    }

    #[test]
    fn empty_array_differs_from_absent_collection() {
        let c = converter();
        let with_empty = c.parse("Payment", &json!({ "orders": [] })).unwrap();
        match with_empty.get("orders") {
            Some(DeltaValue::Set(s)) => assert!(s.is_empty()),
            other => panic!("expected empty set, got {:?}", other),
        }
        assert_eq!(with_empty.instance()["orders"], json!([]));

        let absent = c.parse("Payment", &json!({ "note": "x" })).unwrap();
        assert!(absent.get("orders").is_none());

        let null = c.parse("Payment", &json!({ "orders": null })).unwrap();
        assert!(matches!(null.get("orders"), Some(DeltaValue::Set(s)) if s.is_empty()));
    }

    #[test]
    fn nested_members_are_tracked_per_node() {
        let node = converter()
            .parse(
                "Payment",
                &json!({
                    "PaymentInfo": { "cardNumber": "4111" },
                    "orders": [{ "amount": 5 }, { "id": 7, "amount": 3.5 }],
                    "customer": { "id": 1 }
                }),
            )
            .unwrap();
        let Some(DeltaValue::Node(info)) = node.get("payment_info") else {
            panic!("payment_info missing");
        };
        assert_eq!(info.kind, DeltaKind::Complex);
        assert_eq!(info.changed_names(), vec!["card_number"]);
        let Some(DeltaValue::Set(orders)) = node.get("orders") else {
            panic!("orders missing");
        };
        assert_eq!(orders.len(), 2);
        assert_eq!(orders.items[0].changed_names(), vec!["amount"]);
        assert_eq!(orders.items[1].changed_names(), vec!["amount", "id"]);
        assert_eq!(node.instance()["orders"][1]["amount"], json!(3.5));
        assert!(matches!(node.get("customer"), Some(DeltaValue::Node(n)) if n.type_name == "Customer"));
    }

    #[test]
    fn unknown_members_are_skipped() {
        let node = converter().parse("Payment", &json!({ "note": "a", "surprise": [1, 2] })).unwrap();
        assert_eq!(node.changed_names(), vec!["note"]);
    }

    #[test]
    fn shape_errors_abort_the_whole_parse() {
        let c = converter();
        assert!(matches!(
            c.parse("Payment", &json!([1])),
            Err(PayloadError::Malformed { .. })
        ));
        assert!(matches!(
            c.parse("Payment", &json!({ "orders": { "amount": 1 } })),
            Err(PayloadError::Malformed { path, .. }) if path == "$.orders"
        ));
        assert!(matches!(
            c.parse("Payment", &json!({ "orders": [{ "amount": 1 }, 3] })),
            Err(PayloadError::Malformed { path, .. }) if path == "$.orders[1]"
        ));
        assert!(matches!(
            c.parse("Payment", &json!({ "paymentInfo": null })),
            Err(PayloadError::Malformed { .. })
        ));
        assert!(matches!(
            c.parse_slice("Payment", b"{not json"),
            Err(PayloadError::Malformed { .. })
        ));
    }

    #[test]
    fn scalar_type_errors() {
        let c = converter();
        assert!(matches!(
            c.parse("Payment", &json!({ "totalAmount": "lots" })),
            Err(PayloadError::TypeMismatch { expected: ScalarType::Decimal, .. })
        ));
        assert!(matches!(
            c.parse("Payment", &json!({ "totalAmount": null })),
            Err(PayloadError::TypeMismatch { .. })
        ));
        assert!(matches!(c.parse("Nope", &json!({})), Err(PayloadError::UnknownType(_))));
    }

    #[test]
    fn null_reference_records_an_unlink() {
        let node = converter().parse("Payment", &json!({ "customer": null })).unwrap();
        assert_eq!(node.get("customer"), Some(&DeltaValue::Scalar(Value::Null)));
    }
}
