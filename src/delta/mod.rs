//! Delta trees: a partially materialized instance plus the exact set of members the
//! payload supplied. Presence, not value, is what counts as a change.

pub mod converter;

pub use converter::DeltaConverter;

use crate::schema::Instance;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaKind {
    Entity,
    /// Embedded value stored inside its owner.
    Complex,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeltaValue {
    /// Scalar, or an explicit null for a complex value or single reference.
    Scalar(Value),
    Node(DeltaNode),
    Set(DeltaSet),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeltaNode {
    pub type_name: String,
    pub kind: DeltaKind,
    instance: Instance,
    changed: BTreeMap<String, DeltaValue>,
}

impl DeltaNode {
    pub fn new(type_name: impl Into<String>, kind: DeltaKind) -> Self {
        DeltaNode {
            type_name: type_name.into(),
            kind,
            instance: Instance::new(),
            changed: BTreeMap::new(),
        }
    }

    /// Record a supplied member and assign its materialized value onto the instance.
    pub fn set(&mut self, name: &str, value: DeltaValue) {
        let materialized = match &value {
            DeltaValue::Scalar(v) => v.clone(),
            DeltaValue::Node(n) => Value::Object(n.instance.clone()),
            DeltaValue::Set(s) => Value::Array(s.to_list()),
        };
        self.instance.insert(name.to_string(), materialized);
        self.changed.insert(name.to_string(), value);
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn into_instance(self) -> Instance {
        self.instance
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.changed.contains_key(name)
    }

    pub fn changed(&self) -> impl Iterator<Item = (&str, &DeltaValue)> {
        self.changed.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn changed_names(&self) -> Vec<&str> {
        self.changed.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&DeltaValue> {
        self.changed.get(name)
    }

    /// Supplied scalar value, if `name` was supplied as a scalar.
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        match self.changed.get(name) {
            Some(DeltaValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }
}

/// Ordered collection delta for one collection navigation.
#[derive(Clone, Debug, PartialEq)]
pub struct DeltaSet {
    pub element_type: String,
    pub items: Vec<DeltaNode>,
}

impl DeltaSet {
    pub fn new(element_type: impl Into<String>) -> Self {
        DeltaSet {
            element_type: element_type.into(),
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Materialize element instances in payload order.
    pub fn to_list(&self) -> Vec<Value> {
        self.items
            .iter()
            .map(|n| Value::Object(n.instance.clone()))
            .collect()
    }
}
