//! Typed document field values
//!
//! Mirrors the Firestore value model. The REST wire encoding
//! (`{"stringValue": "..."}`, `{"mapValue": {"fields": {...}}}`, ...) is used
//! both for Firestore calls and for rows in the local store.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};

/// Field name -> value
pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Map(Fields),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Encode as Firestore REST JSON
    pub fn to_firestore(&self) -> Value {
        match self {
            FieldValue::Null => json!({ "nullValue": null }),
            FieldValue::Boolean(b) => json!({ "booleanValue": b }),
            FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
            FieldValue::Double(d) => json!({ "doubleValue": d }),
            FieldValue::String(s) => json!({ "stringValue": s }),
            FieldValue::Timestamp(t) => {
                json!({ "timestampValue": t.to_rfc3339_opts(SecondsFormat::Micros, true) })
            }
            FieldValue::Map(fields) => json!({ "mapValue": { "fields": fields_to_firestore(fields) } }),
            FieldValue::Array(values) => {
                let values: Vec<Value> = values.iter().map(FieldValue::to_firestore).collect();
                json!({ "arrayValue": { "values": values } })
            }
        }
    }

    /// Decode Firestore REST JSON
    pub fn from_firestore(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidData(format!("Expected value object, got {}", value)))?;
        let (kind, inner) = obj
            .iter()
            .next()
            .ok_or_else(|| Error::InvalidData("Empty value object".into()))?;

        match kind.as_str() {
            "nullValue" => Ok(FieldValue::Null),
            "booleanValue" => inner
                .as_bool()
                .map(FieldValue::Boolean)
                .ok_or_else(|| invalid(kind, inner)),
            "integerValue" => match inner {
                Value::String(s) => s
                    .parse()
                    .map(FieldValue::Integer)
                    .map_err(|_| invalid(kind, inner)),
                Value::Number(n) => n
                    .as_i64()
                    .map(FieldValue::Integer)
                    .ok_or_else(|| invalid(kind, inner)),
                _ => Err(invalid(kind, inner)),
            },
            "doubleValue" => match inner {
                Value::Number(n) => n
                    .as_f64()
                    .map(FieldValue::Double)
                    .ok_or_else(|| invalid(kind, inner)),
                Value::String(s) => s
                    .parse()
                    .map(FieldValue::Double)
                    .map_err(|_| invalid(kind, inner)),
                _ => Err(invalid(kind, inner)),
            },
            "stringValue" | "referenceValue" | "bytesValue" => inner
                .as_str()
                .map(|s| FieldValue::String(s.to_string()))
                .ok_or_else(|| invalid(kind, inner)),
            "timestampValue" => inner
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| FieldValue::Timestamp(t.with_timezone(&Utc)))
                .ok_or_else(|| invalid(kind, inner)),
            "mapValue" => match inner.get("fields") {
                Some(fields) => fields_from_firestore(fields).map(FieldValue::Map),
                None => Ok(FieldValue::Map(Fields::new())),
            },
            "arrayValue" => {
                let values = match inner.get("values").and_then(Value::as_array) {
                    Some(values) => values
                        .iter()
                        .map(FieldValue::from_firestore)
                        .collect::<Result<Vec<_>>>()?,
                    None => Vec::new(),
                };
                Ok(FieldValue::Array(values))
            }
            "geoPointValue" => {
                let mut point = Fields::new();
                for axis in ["latitude", "longitude"] {
                    if let Some(v) = inner.get(axis).and_then(Value::as_f64) {
                        point.insert(axis.to_string(), FieldValue::Double(v));
                    }
                }
                Ok(FieldValue::Map(point))
            }
            other => Err(Error::InvalidData(format!(
                "Unsupported value type: {}",
                other
            ))),
        }
    }

    /// Plain JSON view for API responses (timestamps become RFC 3339 strings)
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => json!(i),
            FieldValue::Double(d) => json!(d),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Timestamp(t) => {
                Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Map(fields) => Value::Object(fields_to_json(fields)),
            FieldValue::Array(values) => Value::Array(values.iter().map(FieldValue::to_json).collect()),
        }
    }

    /// Compare two values of compatible kinds.
    ///
    /// Integers and doubles compare numerically; mismatched kinds are
    /// incomparable.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

fn invalid(kind: &str, inner: &Value) -> Error {
    Error::InvalidData(format!("Invalid {}: {}", kind, inner))
}

impl From<&Value> for FieldValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Double(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            Value::Array(values) => FieldValue::Array(values.iter().map(FieldValue::from).collect()),
            Value::Object(obj) => FieldValue::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(d: f64) -> Self {
        FieldValue::Double(d)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(t)
    }
}

/// Encode a field map as Firestore `fields`
pub fn fields_to_firestore(fields: &Fields) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_firestore()))
        .collect();
    Value::Object(map)
}

/// Decode Firestore `fields`
pub fn fields_from_firestore(value: &Value) -> Result<Fields> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::InvalidData("Document fields must be an object".into()))?;
    obj.iter()
        .map(|(k, v)| Ok((k.clone(), FieldValue::from_firestore(v)?)))
        .collect()
}

pub fn fields_to_json(fields: &Fields) -> Map<String, Value> {
    fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// Merge `incoming` into `existing`; nested maps merge key by key
pub fn merge_fields(existing: &mut Fields, incoming: Fields) {
    for (key, value) in incoming {
        match (existing.get_mut(&key), value) {
            (Some(FieldValue::Map(current)), FieldValue::Map(update)) => {
                merge_fields(current, update);
            }
            (_, value) => {
                existing.insert(key, value);
            }
        }
    }
}

/// Leaf field paths touched by a merge, quoted for Firestore update masks
pub fn merge_field_paths(fields: &Fields) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(fields, "", &mut paths);
    paths
}

fn collect_paths(fields: &Fields, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in fields {
        let path = if prefix.is_empty() {
            quote_segment(key)
        } else {
            format!("{}.{}", prefix, quote_segment(key))
        };
        match value {
            FieldValue::Map(inner) if !inner.is_empty() => collect_paths(inner, &path, out),
            _ => out.push(path),
        }
    }
}

/// Quote a field path segment unless it is a simple identifier
fn quote_segment(segment: &str) -> String {
    let simple = segment
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        segment.to_string()
    } else {
        format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
    }
}
