use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::str::FromStr;

/// Primitive property and key types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Int,
    Long,
    Guid,
    Decimal,
    Double,
    Float,
    Bool,
    #[serde(alias = "datetime")]
    DateTime,
    String,
}

impl ScalarType {
    /// Route segment constraint name; strings are unconstrained.
    pub fn route_constraint(self) -> Option<&'static str> {
        match self {
            ScalarType::Int => Some("int"),
            ScalarType::Long => Some("long"),
            ScalarType::Guid => Some("guid"),
            ScalarType::Decimal => Some("decimal"),
            ScalarType::Double => Some("double"),
            ScalarType::Float => Some("float"),
            ScalarType::Bool => Some("bool"),
            ScalarType::DateTime => Some("datetime"),
            ScalarType::String => None,
        }
    }

    pub fn pg_type(self) -> &'static str {
        match self {
            ScalarType::Int => "int4",
            ScalarType::Long => "int8",
            ScalarType::Guid => "uuid",
            ScalarType::Decimal => "numeric",
            ScalarType::Double => "float8",
            ScalarType::Float => "float4",
            ScalarType::Bool => "bool",
            ScalarType::DateTime => "timestamptz",
            ScalarType::String => "text",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ScalarType::Int | ScalarType::Long | ScalarType::Decimal | ScalarType::Double | ScalarType::Float
        )
    }

    pub fn default_value(self) -> Value {
        match self {
            ScalarType::Int | ScalarType::Long => Value::from(0),
            ScalarType::Decimal | ScalarType::Double | ScalarType::Float => Value::from(0),
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Guid => Value::String(uuid::Uuid::nil().to_string()),
            ScalarType::DateTime => Value::String("0001-01-01T00:00:00Z".into()),
            ScalarType::String => Value::String(String::new()),
        }
    }

    /// Parse a route segment; `None` means the segment fails the route constraint.
    pub fn parse_segment(self, raw: &str) -> Option<Value> {
        match self {
            ScalarType::String => Some(Value::String(raw.to_string())),
            ScalarType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ScalarType::Int => raw.parse::<i32>().ok().map(Value::from),
            ScalarType::Long => raw.parse::<i64>().ok().map(Value::from),
            ScalarType::Decimal => self.coerce(&Value::String(raw.to_string())).ok(),
            ScalarType::Double | ScalarType::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(Number::from_f64)
                .map(|n| normalize_number(Value::Number(n))),
            ScalarType::Guid | ScalarType::DateTime => self.coerce(&Value::String(raw.to_string())).ok(),
        }
    }

    /// Normalize a JSON value to this type's canonical JSON form. Null passes through;
    /// nullability is the caller's concern.
    pub fn coerce(self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            ScalarType::String => match value {
                Value::String(_) => Ok(value.clone()),
                other => Err(format!("found {}", json_kind(other))),
            },
            ScalarType::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(format!("found {}", json_kind(other))),
            },
            ScalarType::Int => {
                let n = integer(value)?;
                i32::try_from(n)
                    .map(Value::from)
                    .map_err(|_| format!("{} is out of range for int", n))
            }
            ScalarType::Long => integer(value).map(Value::from),
            ScalarType::Decimal => match value {
                Value::Number(n) => decimal(&n.to_string()),
                Value::String(s) => decimal(s),
                other => Err(format!("found {}", json_kind(other))),
            },
            ScalarType::Double | ScalarType::Float => {
                let f = match value {
                    Value::Number(n) => n.as_f64().ok_or_else(|| "number out of range".to_string())?,
                    other => return Err(format!("found {}", json_kind(other))),
                };
                Number::from_f64(f)
                    .map(|n| normalize_number(Value::Number(n)))
                    .ok_or_else(|| "number is not finite".to_string())
            }
            ScalarType::Guid => match value {
                Value::String(s) => uuid::Uuid::parse_str(s)
                    .map(|u| Value::String(u.to_string()))
                    .map_err(|_| format!("'{}' is not a guid", s)),
                other => Err(format!("found {}", json_kind(other))),
            },
            ScalarType::DateTime => match value {
                Value::String(s) => parse_datetime(s)
                    .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                    .ok_or_else(|| format!("'{}' is not a date-time", s)),
                other => Err(format!("found {}", json_kind(other))),
            },
        }
    }
}

fn integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                    _ => Err(format!("{} is not an integer", n)),
                }
            }
        }
        other => Err(format!("found {}", json_kind(other))),
    }
}

/// Exact decimal in canonical form: a JSON number when `f64` carries it without loss,
/// otherwise the normalized digits as a string.
fn decimal(raw: &str) -> Result<Value, String> {
    let raw = raw.trim();
    let d = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| format!("'{}' is not a decimal", raw))?
        .normalize();
    if d.scale() == 0 {
        if let Some(i) = d.to_i64() {
            return Ok(Value::from(i));
        }
    }
    let canonical = d.to_string();
    if let Some(f) = d.to_f64() {
        if f.to_string() == canonical {
            if let Some(n) = Number::from_f64(f) {
                return Ok(Value::Number(n));
            }
        }
    }
    Ok(Value::String(canonical))
}

/// Numeric view of a decimal held either as a JSON number or as its string form.
pub(crate) fn as_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Whole floats become integers so `2.0` and `2` compare and serialize alike.
fn normalize_number(v: Value) -> Value {
    if let Value::Number(n) = &v {
        if let Some(f) = n.as_f64() {
            if n.as_i64().is_none() && f.fract() == 0.0 && f.abs() < 9.0e15 {
                return Value::from(f as i64);
            }
        }
    }
    v
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
