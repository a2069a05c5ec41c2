//! Value conversion between server and client shapes
//!
//! One scheme is used for every value that crosses the bridge: shared state
//! fields, callback and RPC arguments, and RPC return values.
//!
//! | Server shape                      | Client shape                     |
//! |-----------------------------------|----------------------------------|
//! | numbers of any width              | number                           |
//! | bool                              | boolean                          |
//! | string                            | string                           |
//! | list / set / array                | array, in iteration order        |
//! | string-keyed map                  | object                           |
//! | any other map                     | `[[keys...], [values...]]`       |
//! | bean                              | object, one field per property   |
//! | connector                         | string holding the connector id  |
//! | custom                            | first matching [`ValueConverter`]|
//!
//! Client to server conversion is driven by a declared [`Shape`].
//!
//! Integers outside the exactly representable range of a double, and
//! non-finite floats, fail to encode instead of losing precision.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::ClientValue;
use crate::connector::{ConnectorId, ConnectorRegistry};
use crate::server::{BeanValue, CustomValue, ServerValue};
use crate::shape::Shape;

/// Default limit on value nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while converting a single value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("Unsupported value type: {type_name}")]
    UnsupportedValueType { type_name: String },

    #[error("Expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: &'static str },

    #[error("Number {value} does not fit in {target}")]
    IntegerOutOfRange { value: f64, target: &'static str },

    #[error("Number {value} has no client representation")]
    NonFiniteNumber { value: f64 },

    #[error("Value nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("Converter for '{type_name}' failed: {message}")]
    Converter { type_name: String, message: String },
}

impl ConversionError {
    fn mismatch(expected: &Shape, actual: &ClientValue) -> Self {
        ConversionError::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.kind(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Converter Plugins
// ─────────────────────────────────────────────────────────────────────────────

/// Conversion plugin for values outside the built-in shapes
pub trait ValueConverter: Send + Sync {
    /// Whether this converter claims the value
    fn can_handle(&self, value: &CustomValue) -> bool;

    /// Convert a claimed value for the client
    fn to_client(&self, value: &CustomValue) -> Result<ClientValue, ConversionError>;

    /// Whether this converter can decode client values into `type_name`
    fn can_decode(&self, _type_name: &str) -> bool {
        false
    }

    /// Decode a client value into `type_name`
    fn from_client(
        &self,
        type_name: &str,
        _value: &ClientValue,
    ) -> Result<ServerValue, ConversionError> {
        Err(ConversionError::UnsupportedValueType {
            type_name: type_name.to_string(),
        })
    }
}

/// Ordered list of converter plugins; the first match wins
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn ValueConverter>>,
}

impl ConverterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a converter; earlier registrations take precedence
    pub fn register(&mut self, converter: Arc<dyn ValueConverter>) {
        self.converters.push(converter);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.register(Arc::new(converter));
        self
    }

    /// First converter claiming the value
    pub fn encoder_for(&self, value: &CustomValue) -> Option<&Arc<dyn ValueConverter>> {
        self.converters.iter().find(|c| c.can_handle(value))
    }

    /// First converter able to decode into `type_name`
    pub fn decoder_for(&self, type_name: &str) -> Option<&Arc<dyn ValueConverter>> {
        self.converters.iter().find(|c| c.can_decode(type_name))
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

/// The conversion scheme, bound to a connector registry and converter plugins
#[derive(Clone)]
pub struct ValueCodec {
    converters: Arc<ConverterRegistry>,
    connectors: Arc<dyn ConnectorRegistry>,
    max_depth: usize,
}

impl ValueCodec {
    /// Create a codec without converter plugins
    pub fn new(connectors: Arc<dyn ConnectorRegistry>) -> Self {
        Self {
            converters: Arc::new(ConverterRegistry::new()),
            connectors,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Use the given converter plugins
    pub fn with_converters(mut self, converters: Arc<ConverterRegistry>) -> Self {
        self.converters = converters;
        self
    }

    /// Limit value nesting
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The connector registry used to resolve connector values
    pub fn connectors(&self) -> &Arc<dyn ConnectorRegistry> {
        &self.connectors
    }

    /// Convert a server value for the client
    pub fn encode(&self, value: &ServerValue) -> Result<ClientValue, ConversionError> {
        self.encode_at(value, 0)
    }

    /// Convert an argument list for the client
    pub fn encode_all(&self, values: &[ServerValue]) -> Result<Vec<ClientValue>, ConversionError> {
        values.iter().map(|v| self.encode(v)).collect()
    }

    /// Convert a client value into the declared server shape
    pub fn decode(&self, value: &ClientValue, shape: &Shape) -> Result<ServerValue, ConversionError> {
        self.decode_at(value, shape, 0)
    }

    /// Check a server value against a declared shape without converting it.
    ///
    /// `Null` satisfies every shape. Integers satisfy `Float`, and signed and
    /// unsigned integers satisfy each other when the value fits.
    pub fn check_shape(&self, value: &ServerValue, shape: &Shape) -> Result<(), ConversionError> {
        self.check_shape_at(value, shape, 0)
    }

    fn check_shape_at(&self, value: &ServerValue, shape: &Shape, depth: usize) -> Result<(), ConversionError> {
        self.check_depth(depth)?;
        let next = depth + 1;
        let mismatch = || ConversionError::ShapeMismatch {
            expected: shape.to_string(),
            actual: value.kind(),
        };

        match (shape, value) {
            (_, ServerValue::Null) | (Shape::Any, _) => Ok(()),
            (Shape::Bool, ServerValue::Bool(_)) => Ok(()),
            (Shape::Int, ServerValue::Int(_)) => Ok(()),
            (Shape::Int, ServerValue::UInt(u)) if i64::try_from(*u).is_ok() => Ok(()),
            (Shape::UInt, ServerValue::UInt(_)) => Ok(()),
            (Shape::UInt, ServerValue::Int(i)) if *i >= 0 => Ok(()),
            (Shape::Float, ServerValue::Float(_) | ServerValue::Int(_) | ServerValue::UInt(_)) => Ok(()),
            (Shape::String, ServerValue::String(_)) => Ok(()),
            (
                Shape::List { element } | Shape::Set { element } | Shape::Array { element },
                ServerValue::List(items) | ServerValue::Set(items) | ServerValue::Array(items),
            ) => items
                .iter()
                .try_for_each(|item| self.check_shape_at(item, element, next)),
            (Shape::StringMap { value: value_shape }, ServerValue::StringMap(map)) => map
                .values()
                .try_for_each(|item| self.check_shape_at(item, value_shape, next)),
            (Shape::Map { key, value: value_shape }, ServerValue::Map(entries)) => {
                entries.iter().try_for_each(|(k, v)| {
                    self.check_shape_at(k, key, next)?;
                    self.check_shape_at(v, value_shape, next)
                })
            }
            (Shape::Map { key, value: value_shape }, ServerValue::StringMap(map))
                if matches!(**key, Shape::String | Shape::Any) =>
            {
                map.values()
                    .try_for_each(|item| self.check_shape_at(item, value_shape, next))
            }
            (Shape::Bean { properties, .. }, ServerValue::Bean(bean)) => {
                properties.iter().try_for_each(|(name, property_shape)| {
                    match bean.get(name) {
                        Some(item) => self.check_shape_at(item, property_shape, next),
                        None => Ok(()),
                    }
                })
            }
            (Shape::Connector, ServerValue::Connector(_)) => Ok(()),
            (Shape::Custom { type_name }, ServerValue::Custom(custom)) if custom.type_name == *type_name => Ok(()),
            _ => Err(mismatch()),
        }
    }

    fn check_depth(&self, depth: usize) -> Result<(), ConversionError> {
        if depth > self.max_depth {
            return Err(ConversionError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn encode_at(&self, value: &ServerValue, depth: usize) -> Result<ClientValue, ConversionError> {
        self.check_depth(depth)?;
        let next = depth + 1;

        Ok(match value {
            ServerValue::Null => ClientValue::Null,
            ServerValue::Bool(b) => ClientValue::Bool(*b),
            ServerValue::Int(i) => ClientValue::Number(exact_i64(*i)?),
            ServerValue::UInt(u) => ClientValue::Number(exact_u64(*u)?),
            // JSON has no NaN or infinities
            ServerValue::Float(f) if !f.is_finite() => {
                return Err(ConversionError::NonFiniteNumber { value: *f });
            }
            ServerValue::Float(f) => ClientValue::Number(*f),
            ServerValue::String(s) => ClientValue::String(s.clone()),
            ServerValue::List(items) | ServerValue::Set(items) | ServerValue::Array(items) => {
                ClientValue::Array(self.encode_elements(items, next)?)
            }
            ServerValue::StringMap(map) => {
                let mut fields = BTreeMap::new();
                for (key, item) in map {
                    fields.insert(key.clone(), self.encode_at(item, next)?);
                }
                ClientValue::Object(fields)
            }
            ServerValue::Map(entries) => {
                let mut keys = Vec::with_capacity(entries.len());
                let mut values = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    keys.push(self.encode_at(key, next)?);
                    values.push(self.encode_at(item, next)?);
                }
                ClientValue::Array(vec![ClientValue::Array(keys), ClientValue::Array(values)])
            }
            ServerValue::Bean(bean) => {
                let mut fields = BTreeMap::new();
                for (name, item) in &bean.properties {
                    fields.insert(name.clone(), self.encode_at(item, next)?);
                }
                ClientValue::Object(fields)
            }
            ServerValue::Connector(connector) => {
                ClientValue::String(self.connectors.id_of(connector.as_ref()).to_string())
            }
            ServerValue::Custom(custom) => match self.converters.encoder_for(custom) {
                Some(converter) => {
                    tracing::trace!("Encoding {} with converter plugin", custom.type_name);
                    converter.to_client(custom)?
                }
                None => {
                    return Err(ConversionError::UnsupportedValueType {
                        type_name: custom.type_name.clone(),
                    });
                }
            },
        })
    }

    fn encode_elements(
        &self,
        items: &[ServerValue],
        depth: usize,
    ) -> Result<Vec<ClientValue>, ConversionError> {
        items.iter().map(|item| self.encode_at(item, depth)).collect()
    }

    fn decode_at(
        &self,
        value: &ClientValue,
        shape: &Shape,
        depth: usize,
    ) -> Result<ServerValue, ConversionError> {
        self.check_depth(depth)?;
        if value.is_null() {
            return Ok(ServerValue::Null);
        }
        let next = depth + 1;

        match shape {
            Shape::Any => self.decode_untyped(value, depth),
            Shape::Bool => value
                .as_bool()
                .map(ServerValue::Bool)
                .ok_or_else(|| ConversionError::mismatch(shape, value)),
            Shape::Int => {
                let n = expect_number(value, shape)?;
                // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
                if n.fract() != 0.0 || n < i64::MIN as f64 || n >= i64::MAX as f64 {
                    return Err(ConversionError::IntegerOutOfRange { value: n, target: "int" });
                }
                Ok(ServerValue::Int(n as i64))
            }
            Shape::UInt => {
                let n = expect_number(value, shape)?;
                if n.fract() != 0.0 || n < 0.0 || n >= u64::MAX as f64 {
                    return Err(ConversionError::IntegerOutOfRange { value: n, target: "uint" });
                }
                Ok(ServerValue::UInt(n as u64))
            }
            Shape::Float => expect_number(value, shape).map(ServerValue::Float),
            Shape::String => value
                .as_str()
                .map(|s| ServerValue::String(s.to_string()))
                .ok_or_else(|| ConversionError::mismatch(shape, value)),
            Shape::List { element } => {
                let items = expect_array(value, shape)?;
                Ok(ServerValue::List(self.decode_elements(items, element, next)?))
            }
            Shape::Array { element } => {
                let items = expect_array(value, shape)?;
                Ok(ServerValue::Array(self.decode_elements(items, element, next)?))
            }
            Shape::Set { element } => {
                let items = expect_array(value, shape)?;
                let mut unique: Vec<ServerValue> = Vec::with_capacity(items.len());
                for item in self.decode_elements(items, element, next)? {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                Ok(ServerValue::Set(unique))
            }
            Shape::StringMap { value: value_shape } => {
                let fields = value
                    .as_object()
                    .ok_or_else(|| ConversionError::mismatch(shape, value))?;
                let mut map = BTreeMap::new();
                for (key, item) in fields {
                    map.insert(key.clone(), self.decode_at(item, value_shape, next)?);
                }
                Ok(ServerValue::StringMap(map))
            }
            Shape::Map {
                key: key_shape,
                value: value_shape,
            } => {
                let (keys, values) = match expect_array(value, shape)? {
                    [ClientValue::Array(keys), ClientValue::Array(values)]
                        if keys.len() == values.len() =>
                    {
                        (keys, values)
                    }
                    _ => return Err(ConversionError::mismatch(shape, value)),
                };
                let mut entries = Vec::with_capacity(keys.len());
                for (key, item) in keys.iter().zip(values) {
                    entries.push((
                        self.decode_at(key, key_shape, next)?,
                        self.decode_at(item, value_shape, next)?,
                    ));
                }
                Ok(ServerValue::Map(entries))
            }
            Shape::Bean {
                type_name,
                properties,
            } => {
                let fields = value
                    .as_object()
                    .ok_or_else(|| ConversionError::mismatch(shape, value))?;
                let mut bean = BeanValue::new(type_name.clone());
                for (name, property_shape) in properties {
                    if let Some(item) = fields.get(name) {
                        bean.properties
                            .push((name.clone(), self.decode_at(item, property_shape, next)?));
                    }
                }
                Ok(ServerValue::Bean(bean))
            }
            Shape::Connector => {
                let id = value
                    .as_str()
                    .ok_or_else(|| ConversionError::mismatch(shape, value))?;
                let id = ConnectorId::new(id);
                match self.connectors.lookup_by_id(&id) {
                    Some(connector) => Ok(ServerValue::Connector(connector)),
                    None => {
                        tracing::warn!("Stale connector reference {} decoded as null", id);
                        Ok(ServerValue::Null)
                    }
                }
            }
            Shape::Custom { type_name } => match self.converters.decoder_for(type_name) {
                Some(converter) => converter.from_client(type_name, value),
                None => Err(ConversionError::UnsupportedValueType {
                    type_name: type_name.clone(),
                }),
            },
        }
    }

    fn decode_elements(
        &self,
        items: &[ClientValue],
        shape: &Shape,
        depth: usize,
    ) -> Result<Vec<ServerValue>, ConversionError> {
        items
            .iter()
            .map(|item| self.decode_at(item, shape, depth))
            .collect()
    }

    /// Decode without a declared target: integral numbers become ints,
    /// arrays lists and objects string maps.
    fn decode_untyped(&self, value: &ClientValue, depth: usize) -> Result<ServerValue, ConversionError> {
        self.check_depth(depth)?;
        let next = depth + 1;

        Ok(match value {
            ClientValue::Null => ServerValue::Null,
            ClientValue::Bool(b) => ServerValue::Bool(*b),
            ClientValue::Number(n) => {
                if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n < i64::MAX as f64 {
                    ServerValue::Int(*n as i64)
                } else {
                    ServerValue::Float(*n)
                }
            }
            ClientValue::String(s) => ServerValue::String(s.clone()),
            ClientValue::Array(items) => ServerValue::List(
                items
                    .iter()
                    .map(|item| self.decode_untyped(item, next))
                    .collect::<Result<_, _>>()?,
            ),
            ClientValue::Object(fields) => {
                let mut map = BTreeMap::new();
                for (key, item) in fields {
                    map.insert(key.clone(), self.decode_untyped(item, next)?);
                }
                ServerValue::StringMap(map)
            }
        })
    }
}

/// 2^63 and 2^64 are the first doubles past the integer ranges; `as` saturates there
fn exact_i64(i: i64) -> Result<f64, ConversionError> {
    let n = i as f64;
    if n >= i64::MAX as f64 || n as i64 != i {
        return Err(ConversionError::IntegerOutOfRange { value: n, target: "number" });
    }
    Ok(n)
}

fn exact_u64(u: u64) -> Result<f64, ConversionError> {
    let n = u as f64;
    if n >= u64::MAX as f64 || n as u64 != u {
        return Err(ConversionError::IntegerOutOfRange { value: n, target: "number" });
    }
    Ok(n)
}

fn expect_number(value: &ClientValue, shape: &Shape) -> Result<f64, ConversionError> {
    value
        .as_f64()
        .ok_or_else(|| ConversionError::mismatch(shape, value))
}

fn expect_array<'a>(value: &'a ClientValue, shape: &Shape) -> Result<&'a [ClientValue], ConversionError> {
    value
        .as_array()
        .ok_or_else(|| ConversionError::mismatch(shape, value))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use super::*;
    use crate::connector::{Connector, ConnectorNode, ConnectorTree};
    use crate::server::{Bean, ToServerValue};

    fn codec() -> (Arc<ConnectorTree>, ValueCodec) {
        let tree = Arc::new(ConnectorTree::new());
        tree.attach(Arc::new(ConnectorNode::new("c7")), None);
        let codec = ValueCodec::new(tree.clone());
        (tree, codec)
    }

    fn num(n: f64) -> ClientValue {
        ClientValue::Number(n)
    }

    struct Point {
        x: i32,
        y: i32,
    }

    impl Bean for Point {
        fn bean_type(&self) -> &str {
            "demo.Point"
        }

        fn properties(&self) -> Vec<(String, ServerValue)> {
            vec![
                ("x".to_string(), self.x.to_server_value()),
                ("y".to_string(), self.y.to_server_value()),
            ]
        }
    }

    #[test]
    fn test_encode_table() {
        let (tree, codec) = codec();
        let connector = tree.lookup_by_id(&"c7".into()).unwrap();

        let mut nested = HashMap::new();
        nested.insert("a".to_string(), ServerValue::Int(1));
        nested.insert("b".to_string(), vec![1, 2, 3].to_server_value());

        let mut by_int = BTreeMap::new();
        by_int.insert(1, "x");
        by_int.insert(2, "y");

        let cases: Vec<(ServerValue, ClientValue)> = vec![
            (42u16.to_server_value(), num(42.0)),
            ((-3i64).to_server_value(), num(-3.0)),
            (0.25f32.to_server_value(), num(0.25)),
            (true.to_server_value(), ClientValue::Bool(true)),
            ("hi".to_server_value(), ClientValue::from("hi")),
            (None::<String>.to_server_value(), ClientValue::Null),
            ([3, 1, 2].to_server_value(), ClientValue::array([3, 1, 2])),
            (
                ["b", "a"].iter().copied().collect::<BTreeSet<_>>().to_server_value(),
                ClientValue::array(["a", "b"]),
            ),
            (
                nested.to_server_value(),
                ClientValue::object_from_pairs([
                    ("a", num(1.0)),
                    ("b", ClientValue::array([1, 2, 3])),
                ]),
            ),
            (
                by_int.to_server_value(),
                ClientValue::array([ClientValue::array([1, 2]), ClientValue::array(["x", "y"])]),
            ),
            (
                ServerValue::from_bean(&Point { x: 1, y: -1 }),
                ClientValue::object_from_pairs([("x", num(1.0)), ("y", num(-1.0))]),
            ),
            (connector.to_server_value(), ClientValue::from("c7")),
        ];

        for (server, expected) in cases {
            assert_eq!(codec.encode(&server).unwrap(), expected, "encoding {:?}", server);
        }
    }

    #[test]
    fn test_empty_non_string_map_encodes_as_pair_of_arrays() {
        let (_, codec) = codec();
        let empty: HashMap<u8, bool> = HashMap::new();
        assert_eq!(
            codec.encode(&empty.to_server_value()).unwrap(),
            ClientValue::array([ClientValue::Array(vec![]), ClientValue::Array(vec![])])
        );
    }

    #[test]
    fn test_connector_inside_bean_is_not_traversed() {
        let (tree, codec) = codec();
        let connector = tree.lookup_by_id(&"c7".into()).unwrap();
        let bean = BeanValue::new("demo.Holder").with_property("owner", connector);
        assert_eq!(
            codec.encode(&bean.to_server_value()).unwrap(),
            ClientValue::object_from_pairs([("owner", "c7")])
        );
    }

    #[test]
    fn test_unsupported_custom_value() {
        let (_, codec) = codec();
        let value = CustomValue::new("demo.Opaque", 5u8).to_server_value();
        assert_eq!(
            codec.encode(&value),
            Err(ConversionError::UnsupportedValueType {
                type_name: "demo.Opaque".to_string()
            })
        );
    }

    #[test]
    fn test_custom_shape_without_decoder() {
        let (tree, _) = codec();
        let codec = ValueCodec::new(tree).with_converters(Arc::new(ConverterRegistry::new().with(Shouting)));
        assert_eq!(
            codec.decode(&ClientValue::from("#ff0000"), &Shape::custom("demo.Color")),
            Err(ConversionError::UnsupportedValueType {
                type_name: "demo.Color".to_string()
            })
        );
    }

    #[test]
    fn test_integers_beyond_double_precision_are_rejected() {
        let (_, codec) = codec();
        let limit: i64 = 1 << 53;

        let client = codec.encode(&ServerValue::Int(limit)).unwrap();
        assert_eq!(codec.decode(&client, &Shape::Int).unwrap(), ServerValue::Int(limit));
        assert_eq!(codec.encode(&ServerValue::Int(-limit)).unwrap(), num(-(limit as f64)));

        assert!(matches!(
            codec.encode(&ServerValue::Int(limit + 1)),
            Err(ConversionError::IntegerOutOfRange { target: "number", .. })
        ));
        assert!(matches!(
            codec.encode(&ServerValue::UInt(limit as u64 + 1)),
            Err(ConversionError::IntegerOutOfRange { target: "number", .. })
        ));
        assert!(matches!(
            codec.encode(&ServerValue::Int(i64::MAX)),
            Err(ConversionError::IntegerOutOfRange { .. })
        ));
        assert!(matches!(
            codec.encode(&ServerValue::UInt(u64::MAX)),
            Err(ConversionError::IntegerOutOfRange { .. })
        ));
        assert!(codec.encode(&ServerValue::Int(i64::MIN)).is_ok());
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let (_, codec) = codec();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                codec.encode(&ServerValue::Float(value)),
                Err(ConversionError::NonFiniteNumber { .. })
            ));
        }
        assert!(matches!(
            codec.encode(&vec![1.0, f64::NAN].to_server_value()),
            Err(ConversionError::NonFiniteNumber { .. })
        ));
    }

    #[test]
    fn test_check_shape() {
        let (tree, codec) = codec();
        let connector = tree.lookup_by_id(&"c7".into()).unwrap();

        let accepted: Vec<(ServerValue, Shape)> = vec![
            (ServerValue::Null, Shape::UInt),
            (ServerValue::UInt(3), Shape::UInt),
            (ServerValue::Int(3), Shape::UInt),
            (ServerValue::Int(3), Shape::Float),
            (vec!["a", "b"].to_server_value(), Shape::set(Shape::String)),
            (
                {
                    let mut m = BTreeMap::new();
                    m.insert(1, true);
                    m.to_server_value()
                },
                Shape::map(Shape::Int, Shape::Bool),
            ),
            (ServerValue::from_bean(&Point { x: 1, y: 2 }), Shape::bean("demo.Point", [("x", Shape::Int)])),
            (connector.to_server_value(), Shape::Connector),
            (ServerValue::Float(1.5), Shape::Any),
        ];
        for (value, shape) in accepted {
            assert!(codec.check_shape(&value, &shape).is_ok(), "{:?} as {}", value, shape);
        }

        assert_eq!(
            codec.check_shape(&ServerValue::String("ten".into()), &Shape::UInt),
            Err(ConversionError::ShapeMismatch {
                expected: "uint".to_string(),
                actual: "string"
            })
        );
        assert!(codec.check_shape(&ServerValue::Int(-1), &Shape::UInt).is_err());
        assert!(codec.check_shape(&ServerValue::Float(1.0), &Shape::Int).is_err());
        assert!(
            codec
                .check_shape(&vec![1, 2].to_server_value(), &Shape::list(Shape::String))
                .is_err()
        );
        assert!(
            codec
                .check_shape(&CustomValue::new("demo.Color", ()).to_server_value(), &Shape::custom("demo.Other"))
                .is_err()
        );
    }

    struct HexColor;

    impl ValueConverter for HexColor {
        fn can_handle(&self, value: &CustomValue) -> bool {
            value.type_name == "demo.Color"
        }

        fn to_client(&self, value: &CustomValue) -> Result<ClientValue, ConversionError> {
            let (r, g, b) = value
                .downcast_ref::<(u8, u8, u8)>()
                .ok_or_else(|| ConversionError::Converter {
                    type_name: value.type_name.clone(),
                    message: "not an rgb triple".to_string(),
                })?;
            Ok(ClientValue::String(format!("#{:02x}{:02x}{:02x}", r, g, b)))
        }

        fn can_decode(&self, type_name: &str) -> bool {
            type_name == "demo.Color"
        }

        fn from_client(&self, type_name: &str, value: &ClientValue) -> Result<ServerValue, ConversionError> {
            let hex = value.as_str().unwrap_or_default().trim_start_matches('#');
            let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2).unwrap_or(""), 16);
            match (channel(0), channel(2), channel(4)) {
                (Ok(r), Ok(g), Ok(b)) => Ok(CustomValue::new(type_name, (r, g, b)).to_server_value()),
                _ => Err(ConversionError::Converter {
                    type_name: type_name.to_string(),
                    message: format!("bad color {:?}", value),
                }),
            }
        }
    }

    struct Shouting;

    impl ValueConverter for Shouting {
        fn can_handle(&self, _value: &CustomValue) -> bool {
            true
        }

        fn to_client(&self, value: &CustomValue) -> Result<ClientValue, ConversionError> {
            Ok(ClientValue::String(value.type_name.to_uppercase()))
        }
    }

    #[test]
    fn test_converter_plugins_first_match_wins() {
        let (tree, _) = codec();
        let converters = ConverterRegistry::new().with(HexColor).with(Shouting);
        let codec = ValueCodec::new(tree).with_converters(Arc::new(converters));

        let red = CustomValue::new("demo.Color", (255u8, 0u8, 0u8)).to_server_value();
        assert_eq!(codec.encode(&red).unwrap(), ClientValue::from("#ff0000"));

        let other = CustomValue::new("demo.Other", ()).to_server_value();
        assert_eq!(codec.encode(&other).unwrap(), ClientValue::from("DEMO.OTHER"));

        let decoded = codec
            .decode(&ClientValue::from("#00ff80"), &Shape::custom("demo.Color"))
            .unwrap();
        let color = decoded.as_custom().and_then(|c| c.downcast_ref::<(u8, u8, u8)>());
        assert_eq!(color, Some(&(0, 255, 128)));
    }

    #[test]
    fn test_decode_typed() {
        let (_, codec) = codec();

        assert_eq!(codec.decode(&num(5.0), &Shape::Int).unwrap(), ServerValue::Int(5));
        assert_eq!(codec.decode(&num(5.0), &Shape::Float).unwrap(), ServerValue::Float(5.0));
        assert_eq!(codec.decode(&ClientValue::Null, &Shape::Int).unwrap(), ServerValue::Null);
        assert!(matches!(
            codec.decode(&num(5.5), &Shape::Int),
            Err(ConversionError::IntegerOutOfRange { .. })
        ));
        assert!(matches!(
            codec.decode(&num(-1.0), &Shape::UInt),
            Err(ConversionError::IntegerOutOfRange { .. })
        ));
        assert_eq!(
            codec.decode(&ClientValue::from("x"), &Shape::Bool),
            Err(ConversionError::ShapeMismatch {
                expected: "bool".to_string(),
                actual: "string"
            })
        );

        let set = codec
            .decode(&ClientValue::array([1, 2, 1]), &Shape::set(Shape::Int))
            .unwrap();
        assert_eq!(set, ServerValue::Set(vec![ServerValue::Int(1), ServerValue::Int(2)]));
    }

    #[test]
    fn test_decode_maps() {
        let (_, codec) = codec();

        let pairs = ClientValue::array([ClientValue::array([1, 2]), ClientValue::array(["x", "y"])]);
        let decoded = codec.decode(&pairs, &Shape::map(Shape::Int, Shape::String)).unwrap();
        assert_eq!(decoded, {
            let mut m = BTreeMap::new();
            m.insert(1i64, "x");
            m.insert(2i64, "y");
            m.to_server_value()
        });

        let uneven = ClientValue::array([ClientValue::array([1, 2]), ClientValue::array(["x"])]);
        assert!(matches!(
            codec.decode(&uneven, &Shape::map(Shape::Int, Shape::String)),
            Err(ConversionError::ShapeMismatch { .. })
        ));

        let object = ClientValue::object_from_pairs([("k", 1)]);
        let decoded = codec.decode(&object, &Shape::string_map(Shape::UInt)).unwrap();
        assert_eq!(decoded.as_string_map().and_then(|m| m.get("k")), Some(&ServerValue::UInt(1)));
    }

    #[test]
    fn test_decode_bean_and_connector() {
        let (_, codec) = codec();
        let shape = Shape::bean(
            "demo.Link",
            [("target", Shape::Connector), ("weight", Shape::Float)],
        );
        let value = ClientValue::object_from_pairs([
            ("target", ClientValue::from("c7")),
            ("ignored", ClientValue::Bool(true)),
        ]);

        let decoded = codec.decode(&value, &shape).unwrap();
        let bean = decoded.as_bean().unwrap();
        assert_eq!(bean.type_name, "demo.Link");
        assert_eq!(bean.properties.len(), 1);
        assert_eq!(
            bean.get("target").and_then(|t| t.as_connector()).map(|c| c.connector_id()),
            Some(ConnectorId::from("c7"))
        );

        let stale = codec.decode(&ClientValue::from("gone"), &Shape::Connector).unwrap();
        assert!(stale.is_null());
    }

    #[test]
    fn test_decode_untyped() {
        let (_, codec) = codec();
        let value = ClientValue::object_from_pairs([
            ("n", num(2.0)),
            ("f", num(2.5)),
            ("l", ClientValue::array(["a"])),
        ]);
        let decoded = codec.decode(&value, &Shape::Any).unwrap();
        let map = decoded.as_string_map().unwrap();
        assert_eq!(map["n"], ServerValue::Int(2));
        assert_eq!(map["f"], ServerValue::Float(2.5));
        assert_eq!(map["l"], ServerValue::List(vec![ServerValue::String("a".into())]));
    }

    #[test]
    fn test_depth_limit() {
        let (tree, _) = codec();
        let codec = ValueCodec::new(tree).with_max_depth(2);

        let deep = vec![vec![vec![1]]].to_server_value();
        assert_eq!(
            codec.encode(&deep),
            Err(ConversionError::DepthExceeded { limit: 2 })
        );
        let shallow = vec![vec![1]].to_server_value();
        assert!(codec.encode(&shallow).is_ok());
    }

    #[test]
    fn test_round_trip_preserves_value_not_type() {
        let (_, codec) = codec();
        let original = vec![1u8, 2, 3].to_server_value();
        let client = codec.encode(&original).unwrap();
        let back = codec.decode(&client, &Shape::Any).unwrap();
        assert_eq!(back, vec![1i64, 2, 3].to_server_value());
        assert_ne!(back, original);
    }
}
