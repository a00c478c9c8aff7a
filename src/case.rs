//! Wire naming: schema property names are snake_case, clients see the naming policy's form.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Convert a single identifier from snake_case to camelCase.
/// e.g. "payment_info" -> "paymentInfo"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a single identifier from camelCase or PascalCase to snake_case.
pub fn to_snake_case(s: &str) -> String {
    split_words(s, '_')
}

/// "PaymentInfo" -> "payment-info"
pub fn to_kebab_case(s: &str) -> String {
    split_words(s, '-')
}

fn split_words(s: &str, sep: char) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for c in s.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !out.is_empty() && !out.ends_with(sep) {
                out.push(sep);
            }
            prev_lower = false;
        } else if c.is_uppercase() {
            if prev_lower {
                out.push(sep);
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// English plural for route names generated from type names.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.ends_with('y')
        && !matches!(lower.chars().rev().nth(1), Some('a' | 'e' | 'i' | 'o' | 'u'))
    {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| lower.ends_with(suffix)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Route name for a store type without a declaration: "OrderLine" -> "order-lines".
pub fn route_name_for_type(type_name: &str) -> String {
    to_kebab_case(&pluralize(type_name))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    #[default]
    Camel,
    Snake,
    Verbatim,
}

impl NamingPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "camel" | "camelcase" => Some(NamingPolicy::Camel),
            "snake" | "snake_case" => Some(NamingPolicy::Snake),
            "verbatim" | "none" => Some(NamingPolicy::Verbatim),
            _ => None,
        }
    }

    /// Name a schema property is exposed under.
    pub fn wire_name(self, name: &str) -> String {
        match self {
            NamingPolicy::Camel => to_camel_case(name),
            NamingPolicy::Snake => to_snake_case(name),
            NamingPolicy::Verbatim => name.to_string(),
        }
    }

    /// Recursively rename object keys of a response value.
    pub fn to_wire(self, value: &mut Value) {
        if self == NamingPolicy::Verbatim {
            return;
        }
        match value {
            Value::Object(map) => {
                rename_keys(map, |k| self.wire_name(k));
                for (_, v) in map.iter_mut() {
                    self.to_wire(v);
                }
            }
            Value::Array(arr) => {
                for v in arr.iter_mut() {
                    self.to_wire(v);
                }
            }
            _ => {}
        }
    }
}

fn rename_keys(obj: &mut Map<String, Value>, f: impl Fn(&str) -> String) {
    let keys: Vec<String> = obj.keys().cloned().collect();
    for k in keys {
        let renamed = f(&k);
        if renamed != k {
            if let Some(v) = obj.remove(&k) {
                obj.insert(renamed, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_and_snake() {
        assert_eq!(to_camel_case("payment_info"), "paymentInfo");
        assert_eq!(to_snake_case("paymentInfo"), "payment_info");
        assert_eq!(to_snake_case("PaymentInfo"), "payment_info");
    }

    #[test]
    fn generated_route_names() {
        assert_eq!(route_name_for_type("Category"), "categories");
        assert_eq!(route_name_for_type("OrderLine"), "order-lines");
        assert_eq!(route_name_for_type("Box"), "boxes");
        assert_eq!(route_name_for_type("Day"), "days");
    }

    #[test]
    fn response_keys_follow_policy() {
        let mut v = json!({"payment_info": {"card_number": "1"}, "orders": [{"order_no": 1}]});
        NamingPolicy::Camel.to_wire(&mut v);
        assert_eq!(v, json!({"paymentInfo": {"cardNumber": "1"}, "orders": [{"orderNo": 1}]}));
    }
}
