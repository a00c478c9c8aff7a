//! Per-type member maps keyed by case-insensitive wire name.

use super::{ComplexProperty, Navigation, Property, SchemaType};
use crate::case::NamingPolicy;
use std::collections::HashMap;

/// The four disjoint member maps of one type.
#[derive(Debug, Default)]
pub struct PropertyTaxonomy {
    pub type_name: String,
    scalars: HashMap<String, Property>,
    complex: HashMap<String, ComplexProperty>,
    collections: HashMap<String, Navigation>,
    references: HashMap<String, Navigation>,
}

#[derive(Debug, Clone, Copy)]
pub enum PropertyMatch<'a> {
    Scalar(&'a Property),
    Complex(&'a ComplexProperty),
    Collection(&'a Navigation),
    Reference(&'a Navigation),
}

fn wire_key(naming: NamingPolicy, name: &str) -> String {
    naming.wire_name(name).to_lowercase()
}

impl PropertyTaxonomy {
    pub fn for_entity(ty: &SchemaType, naming: NamingPolicy) -> Self {
        let mut t = PropertyTaxonomy {
            type_name: ty.name.clone(),
            ..Default::default()
        };
        for p in &ty.properties {
            t.scalars.insert(wire_key(naming, &p.name), p.clone());
        }
        for c in &ty.complex_properties {
            t.complex.insert(wire_key(naming, &c.name), c.clone());
        }
        for n in &ty.navigations {
            let map = if n.is_collection() {
                &mut t.collections
            } else {
                &mut t.references
            };
            map.insert(wire_key(naming, &n.name), n.clone());
        }
        t
    }

    /// Complex values carry scalars only.
    pub fn for_complex(complex: &ComplexProperty, naming: NamingPolicy) -> Self {
        PropertyTaxonomy {
            type_name: complex.type_name.clone(),
            scalars: complex
                .properties
                .iter()
                .map(|p| (wire_key(naming, &p.name), p.clone()))
                .collect(),
            ..Default::default()
        }
    }

    /// Scalar, then complex, then collection, then reference.
    pub fn lookup(&self, wire_name: &str) -> Option<PropertyMatch<'_>> {
        let key = wire_name.to_lowercase();
        if let Some(p) = self.scalars.get(&key) {
            return Some(PropertyMatch::Scalar(p));
        }
        if let Some(c) = self.complex.get(&key) {
            return Some(PropertyMatch::Complex(c));
        }
        if let Some(n) = self.collections.get(&key) {
            return Some(PropertyMatch::Collection(n));
        }
        self.references.get(&key).map(PropertyMatch::Reference)
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.scalars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn navigations(&self) -> impl Iterator<Item = (&str, &Navigation)> {
        self.collections
            .iter()
            .chain(self.references.iter())
            .map(|(k, v)| (k.as_str(), v))
    }
}
