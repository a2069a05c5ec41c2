//! Server-side value shapes
//!
//! [`ServerValue`] is the closed set of shapes server code can pass through the
//! bridge: state fields, callback arguments, RPC arguments and return values.
//! Rust values get there through [`ToServerValue`].

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::connector::Connector;

// ─────────────────────────────────────────────────────────────────────────────
// Server Value
// ─────────────────────────────────────────────────────────────────────────────

/// A value on the server side of the bridge
#[derive(Clone, Default)]
pub enum ServerValue {
    /// Absent value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer of any width
    Int(i64),
    /// Unsigned integer of any width
    UInt(u64),
    /// Floating point of any width
    Float(f64),
    /// Text
    String(String),
    /// Ordered sequence
    List(Vec<ServerValue>),
    /// Unique collection, in iteration order
    Set(Vec<ServerValue>),
    /// Fixed-size array
    Array(Vec<ServerValue>),
    /// Mapping keyed by strings
    StringMap(BTreeMap<String, ServerValue>),
    /// Mapping with non-string keys, as ordered entries
    Map(Vec<(ServerValue, ServerValue)>),
    /// Record with named readable properties
    Bean(BeanValue),
    /// Reference to a live connector; crosses the bridge as its id only
    Connector(Arc<dyn Connector>),
    /// Anything else; needs a converter plugin
    Custom(CustomValue),
}

impl ServerValue {
    /// Name of the shape, for error messages and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerValue::Null => "null",
            ServerValue::Bool(_) => "bool",
            ServerValue::Int(_) => "int",
            ServerValue::UInt(_) => "uint",
            ServerValue::Float(_) => "float",
            ServerValue::String(_) => "string",
            ServerValue::List(_) => "list",
            ServerValue::Set(_) => "set",
            ServerValue::Array(_) => "array",
            ServerValue::StringMap(_) => "string map",
            ServerValue::Map(_) => "map",
            ServerValue::Bean(_) => "bean",
            ServerValue::Connector(_) => "connector",
            ServerValue::Custom(_) => "custom",
        }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, ServerValue::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ServerValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 (also from unsigned and lossless floats)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ServerValue::Int(i) => Some(*i),
            ServerValue::UInt(u) => i64::try_from(*u).ok(),
            ServerValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Get as f64 (also from integers)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ServerValue::Float(f) => Some(*f),
            ServerValue::Int(i) => Some(*i as f64),
            ServerValue::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ServerValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list, set or array
    pub fn as_elements(&self) -> Option<&[ServerValue]> {
        match self {
            ServerValue::List(items) | ServerValue::Set(items) | ServerValue::Array(items) => {
                Some(items)
            }
            _ => None,
        }
    }

    /// Get as string-keyed map
    pub fn as_string_map(&self) -> Option<&BTreeMap<String, ServerValue>> {
        match self {
            ServerValue::StringMap(map) => Some(map),
            _ => None,
        }
    }

    /// Get as bean
    pub fn as_bean(&self) -> Option<&BeanValue> {
        match self {
            ServerValue::Bean(bean) => Some(bean),
            _ => None,
        }
    }

    /// Get as connector reference
    pub fn as_connector(&self) -> Option<&Arc<dyn Connector>> {
        match self {
            ServerValue::Connector(c) => Some(c),
            _ => None,
        }
    }

    /// Get as custom value
    pub fn as_custom(&self) -> Option<&CustomValue> {
        match self {
            ServerValue::Custom(c) => Some(c),
            _ => None,
        }
    }

    /// Flatten a bean into a value
    pub fn from_bean<B: Bean + ?Sized>(bean: &B) -> Self {
        ServerValue::Bean(BeanValue {
            type_name: bean.bean_type().to_string(),
            properties: bean.properties(),
        })
    }
}

impl std::fmt::Debug for ServerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerValue::Null => write!(f, "Null"),
            ServerValue::Bool(b) => write!(f, "Bool({})", b),
            ServerValue::Int(i) => write!(f, "Int({})", i),
            ServerValue::UInt(u) => write!(f, "UInt({})", u),
            ServerValue::Float(v) => write!(f, "Float({})", v),
            ServerValue::String(s) => write!(f, "String({:?})", s),
            ServerValue::List(items) => f.debug_tuple("List").field(items).finish(),
            ServerValue::Set(items) => f.debug_tuple("Set").field(items).finish(),
            ServerValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            ServerValue::StringMap(map) => f.debug_tuple("StringMap").field(map).finish(),
            ServerValue::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            ServerValue::Bean(bean) => std::fmt::Debug::fmt(bean, f),
            ServerValue::Connector(c) => write!(f, "Connector({})", c.connector_id()),
            ServerValue::Custom(c) => std::fmt::Debug::fmt(c, f),
        }
    }
}

/// Equality is by value, except connectors compare by id and custom values by identity
impl PartialEq for ServerValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ServerValue::Null, ServerValue::Null) => true,
            (ServerValue::Bool(a), ServerValue::Bool(b)) => a == b,
            (ServerValue::Int(a), ServerValue::Int(b)) => a == b,
            (ServerValue::UInt(a), ServerValue::UInt(b)) => a == b,
            (ServerValue::Float(a), ServerValue::Float(b)) => a == b,
            (ServerValue::String(a), ServerValue::String(b)) => a == b,
            (ServerValue::List(a), ServerValue::List(b))
            | (ServerValue::Set(a), ServerValue::Set(b))
            | (ServerValue::Array(a), ServerValue::Array(b)) => a == b,
            (ServerValue::StringMap(a), ServerValue::StringMap(b)) => a == b,
            (ServerValue::Map(a), ServerValue::Map(b)) => a == b,
            (ServerValue::Bean(a), ServerValue::Bean(b)) => a == b,
            (ServerValue::Connector(a), ServerValue::Connector(b)) => {
                a.connector_id() == b.connector_id()
            }
            (ServerValue::Custom(a), ServerValue::Custom(b)) => {
                a.type_name == b.type_name && Arc::ptr_eq(&a.value, &b.value)
            }
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Beans
// ─────────────────────────────────────────────────────────────────────────────

/// A record flattened into its named properties
#[derive(Debug, Clone, PartialEq)]
pub struct BeanValue {
    /// Type the record came from
    pub type_name: String,
    /// Property values, in declaration order
    pub properties: Vec<(String, ServerValue)>,
}

impl BeanValue {
    /// Create an empty bean of the given type
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
        }
    }

    /// Add a property
    pub fn with_property(mut self, name: impl Into<String>, value: impl ToServerValue) -> Self {
        self.properties.push((name.into(), value.to_server_value()));
        self
    }

    /// Get a property by name
    pub fn get(&self, name: &str) -> Option<&ServerValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Introspection interface for records exposing named readable properties.
///
/// Shared state objects implement this so the bridge can push them to the client.
pub trait Bean {
    /// Type name of the record
    fn bean_type(&self) -> &str;

    /// Current property values, in declaration order
    fn properties(&self) -> Vec<(String, ServerValue)>;
}

impl Bean for BeanValue {
    fn bean_type(&self) -> &str {
        &self.type_name
    }

    fn properties(&self) -> Vec<(String, ServerValue)> {
        self.properties.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Custom Values
// ─────────────────────────────────────────────────────────────────────────────

/// A value outside the built-in shapes, tagged with its type name
#[derive(Clone)]
pub struct CustomValue {
    /// Type identifier used by converters to claim the value
    pub type_name: String,
    /// The wrapped value
    pub value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    /// Wrap a value
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            value: Arc::new(value),
        }
    }

    /// Borrow the wrapped value as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Custom({})", self.type_name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ToServerValue
// ─────────────────────────────────────────────────────────────────────────────

/// Conversion of Rust values into [`ServerValue`]
pub trait ToServerValue {
    fn to_server_value(&self) -> ServerValue;
}

/// Build a `Vec<ServerValue>` argument list from heterogeneous values
///
/// ```ignore
/// bridge.invoke_callback("moved", &server_args![12, "left"])?;
/// ```
#[macro_export]
macro_rules! server_args {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::ToServerValue::to_server_value(&$arg)),*]
    };
}

/// Map key types.
///
/// Whether a map becomes a client object or a pair of key/value arrays is
/// decided by the key *type*, so empty maps convert consistently.
pub trait MapKey: ToServerValue {
    /// Whether keys of this type are strings
    const STRING_KEYED: bool = false;

    /// The key as an object field name, for string-keyed types
    fn field_name(&self) -> Option<&str> {
        None
    }
}

impl ToServerValue for ServerValue {
    fn to_server_value(&self) -> ServerValue {
        self.clone()
    }
}

impl<T: ToServerValue + ?Sized> ToServerValue for &T {
    fn to_server_value(&self) -> ServerValue {
        (**self).to_server_value()
    }
}

impl<T: ToServerValue + ?Sized> ToServerValue for Box<T> {
    fn to_server_value(&self) -> ServerValue {
        (**self).to_server_value()
    }
}

impl ToServerValue for () {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Null
    }
}

impl ToServerValue for bool {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Bool(*self)
    }
}

macro_rules! signed_to_server {
    ($($t:ty),*) => {$(
        impl ToServerValue for $t {
            fn to_server_value(&self) -> ServerValue {
                ServerValue::Int(*self as i64)
            }
        }
        impl MapKey for $t {}
    )*};
}

macro_rules! unsigned_to_server {
    ($($t:ty),*) => {$(
        impl ToServerValue for $t {
            fn to_server_value(&self) -> ServerValue {
                ServerValue::UInt(*self as u64)
            }
        }
        impl MapKey for $t {}
    )*};
}

signed_to_server!(i8, i16, i32, i64, isize);
unsigned_to_server!(u8, u16, u32, u64, usize);

impl MapKey for bool {}

impl ToServerValue for f32 {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Float(*self as f64)
    }
}

impl ToServerValue for f64 {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Float(*self)
    }
}

impl ToServerValue for char {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::String(self.to_string())
    }
}

impl MapKey for char {}

impl ToServerValue for str {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::String(self.to_string())
    }
}

impl ToServerValue for String {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::String(self.clone())
    }
}

impl MapKey for String {
    const STRING_KEYED: bool = true;

    fn field_name(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl MapKey for &str {
    const STRING_KEYED: bool = true;

    fn field_name(&self) -> Option<&str> {
        Some(*self)
    }
}

impl<T: ToServerValue> ToServerValue for Option<T> {
    fn to_server_value(&self) -> ServerValue {
        match self {
            Some(v) => v.to_server_value(),
            None => ServerValue::Null,
        }
    }
}

impl<T: ToServerValue> ToServerValue for Vec<T> {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::List(self.iter().map(ToServerValue::to_server_value).collect())
    }
}

impl<T: ToServerValue> ToServerValue for VecDeque<T> {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::List(self.iter().map(ToServerValue::to_server_value).collect())
    }
}

impl<T: ToServerValue> ToServerValue for [T] {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Array(self.iter().map(ToServerValue::to_server_value).collect())
    }
}

impl<T: ToServerValue, const N: usize> ToServerValue for [T; N] {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Array(self.iter().map(ToServerValue::to_server_value).collect())
    }
}

impl<T: ToServerValue, S> ToServerValue for HashSet<T, S> {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Set(self.iter().map(ToServerValue::to_server_value).collect())
    }
}

impl<T: ToServerValue> ToServerValue for BTreeSet<T> {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Set(self.iter().map(ToServerValue::to_server_value).collect())
    }
}

fn map_to_server<'a, K, V>(entries: impl Iterator<Item = (&'a K, &'a V)>) -> ServerValue
where
    K: MapKey + 'a,
    V: ToServerValue + 'a,
{
    if K::STRING_KEYED {
        ServerValue::StringMap(
            entries
                .filter_map(|(k, v)| k.field_name().map(|name| (name.to_string(), v.to_server_value())))
                .collect(),
        )
    } else {
        ServerValue::Map(
            entries
                .map(|(k, v)| (k.to_server_value(), v.to_server_value()))
                .collect(),
        )
    }
}

impl<K: MapKey, V: ToServerValue, S> ToServerValue for HashMap<K, V, S> {
    fn to_server_value(&self) -> ServerValue {
        map_to_server(self.iter())
    }
}

impl<K: MapKey, V: ToServerValue> ToServerValue for BTreeMap<K, V> {
    fn to_server_value(&self) -> ServerValue {
        map_to_server(self.iter())
    }
}

impl ToServerValue for Arc<dyn Connector> {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Connector(Arc::clone(self))
    }
}

impl ToServerValue for BeanValue {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Bean(self.clone())
    }
}

impl ToServerValue for CustomValue {
    fn to_server_value(&self) -> ServerValue {
        ServerValue::Custom(self.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
