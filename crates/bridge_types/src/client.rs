//! Client-side value shapes
//!
//! The script environment on the other side of the bridge knows nothing about
//! server types. Every value that crosses the boundary is reduced to one of the
//! dynamically-typed shapes below before it leaves the process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Client Value
// ─────────────────────────────────────────────────────────────────────────────

/// A value as the client script sees it
///
/// Objects keep their fields in key order so that a given server value always
/// produces the same client value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientValue {
    /// null/undefined
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Every numeric value is a double on the client
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Ordered array of values
    Array(Vec<ClientValue>),
    /// Plain object with named fields
    Object(BTreeMap<String, ClientValue>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Accessors
// ─────────────────────────────────────────────────────────────────────────────

impl ClientValue {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, ClientValue::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ClientValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ClientValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as i64 when the number has no fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ClientValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClientValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as array reference
    pub fn as_array(&self) -> Option<&[ClientValue]> {
        match self {
            ClientValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Get as object fields reference
    pub fn as_object(&self) -> Option<&BTreeMap<String, ClientValue>> {
        match self {
            ClientValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Get as mutable object fields reference
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, ClientValue>> {
        match self {
            ClientValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Get a field from an object
    pub fn get(&self, key: &str) -> Option<&ClientValue> {
        self.as_object().and_then(|obj| obj.get(key))
    }

    /// Get an element from an array
    pub fn get_index(&self, index: usize) -> Option<&ClientValue> {
        self.as_array().and_then(|arr| arr.get(index))
    }

    /// Name of the shape, as the script would report it with `typeof`/`Array.isArray`
    pub fn kind(&self) -> &'static str {
        match self {
            ClientValue::Null => "null",
            ClientValue::Bool(_) => "boolean",
            ClientValue::Number(_) => "number",
            ClientValue::String(_) => "string",
            ClientValue::Array(_) => "array",
            ClientValue::Object(_) => "object",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Constructors
// ─────────────────────────────────────────────────────────────────────────────

impl ClientValue {
    /// Create an object from key-value pairs
    pub fn object_from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ClientValue>,
    {
        ClientValue::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Create an array from anything convertible
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ClientValue>,
    {
        ClientValue::Array(items.into_iter().map(Into::into).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// From Implementations
// ─────────────────────────────────────────────────────────────────────────────

impl From<()> for ClientValue {
    fn from(_: ()) -> Self {
        ClientValue::Null
    }
}

impl From<bool> for ClientValue {
    fn from(v: bool) -> Self {
        ClientValue::Bool(v)
    }
}

impl From<i32> for ClientValue {
    fn from(v: i32) -> Self {
        ClientValue::Number(v as f64)
    }
}

impl From<i64> for ClientValue {
    fn from(v: i64) -> Self {
        ClientValue::Number(v as f64)
    }
}

impl From<u32> for ClientValue {
    fn from(v: u32) -> Self {
        ClientValue::Number(v as f64)
    }
}

impl From<f64> for ClientValue {
    fn from(v: f64) -> Self {
        ClientValue::Number(v)
    }
}

impl From<String> for ClientValue {
    fn from(v: String) -> Self {
        ClientValue::String(v)
    }
}

impl From<&str> for ClientValue {
    fn from(v: &str) -> Self {
        ClientValue::String(v.to_string())
    }
}

impl<T: Into<ClientValue>> From<Vec<T>> for ClientValue {
    fn from(v: Vec<T>) -> Self {
        ClientValue::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ClientValue>> From<Option<T>> for ClientValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => ClientValue::Null,
        }
    }
}

impl From<BTreeMap<String, ClientValue>> for ClientValue {
    fn from(fields: BTreeMap<String, ClientValue>) -> Self {
        ClientValue::Object(fields)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// serde_json::Value Interop
// ─────────────────────────────────────────────────────────────────────────────

impl From<serde_json::Value> for ClientValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => ClientValue::Null,
            serde_json::Value::Bool(b) => ClientValue::Bool(b),
            serde_json::Value::Number(n) => {
                n.as_f64().map(ClientValue::Number).unwrap_or(ClientValue::Null)
            }
            serde_json::Value::String(s) => ClientValue::String(s),
            serde_json::Value::Array(arr) => {
                ClientValue::Array(arr.into_iter().map(ClientValue::from).collect())
            }
            serde_json::Value::Object(obj) => ClientValue::Object(
                obj.into_iter().map(|(k, v)| (k, ClientValue::from(v))).collect(),
            ),
        }
    }
}

impl From<ClientValue> for serde_json::Value {
    fn from(v: ClientValue) -> Self {
        match v {
            ClientValue::Null => serde_json::Value::Null,
            ClientValue::Bool(b) => serde_json::Value::Bool(b),
            ClientValue::Number(n) => {
                // Integral values go out as JSON integers so ids and counters stay readable
                if n.fract() == 0.0 && n.abs() < (1u64 << 53) as f64 {
                    serde_json::Value::Number((n as i64).into())
                } else {
                    // Only hand-built values can be non-finite here; the codec rejects them
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            ClientValue::String(s) => serde_json::Value::String(s),
            ClientValue::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(serde_json::Value::from).collect())
            }
            ClientValue::Object(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
