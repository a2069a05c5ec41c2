// Shape descriptors
//
// The client sends untyped values. A Shape is what the server side declares it
// expects for a callback or RPC parameter, so the codec can validate and decode.

use serde::{Deserialize, Serialize};

/// Expected server shape of a value coming from the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum Shape {
    /// Accept anything, decoded without a target type
    Any,
    /// Boolean
    Bool,
    /// Signed integer
    Int,
    /// Unsigned integer
    UInt,
    /// Floating point
    Float,
    /// Text
    String,
    /// Ordered sequence of a specific shape
    List { element: Box<Shape> },
    /// Unique collection of a specific shape
    Set { element: Box<Shape> },
    /// Fixed array of a specific shape
    Array { element: Box<Shape> },
    /// String-keyed mapping
    StringMap { value: Box<Shape> },
    /// Mapping with non-string keys
    Map { key: Box<Shape>, value: Box<Shape> },
    /// Record with declared properties
    Bean {
        type_name: String,
        properties: Vec<(String, Shape)>,
    },
    /// Reference to a connector, sent as its id
    Connector,
    /// Type handled by a converter plugin
    Custom { type_name: String },
}

impl Shape {
    pub fn list(element: Shape) -> Self {
        Shape::List {
            element: Box::new(element),
        }
    }

    pub fn set(element: Shape) -> Self {
        Shape::Set {
            element: Box::new(element),
        }
    }

    pub fn array(element: Shape) -> Self {
        Shape::Array {
            element: Box::new(element),
        }
    }

    pub fn string_map(value: Shape) -> Self {
        Shape::StringMap {
            value: Box::new(value),
        }
    }

    pub fn map(key: Shape, value: Shape) -> Self {
        Shape::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Bean shape from `(property, shape)` pairs
    pub fn bean<I, S>(type_name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = (S, Shape)>,
        S: Into<String>,
    {
        Shape::Bean {
            type_name: type_name.into(),
            properties: properties
                .into_iter()
                .map(|(name, shape)| (name.into(), shape))
                .collect(),
        }
    }

    pub fn custom(type_name: impl Into<String>) -> Self {
        Shape::Custom {
            type_name: type_name.into(),
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Any => write!(f, "any"),
            Shape::Bool => write!(f, "bool"),
            Shape::Int => write!(f, "int"),
            Shape::UInt => write!(f, "uint"),
            Shape::Float => write!(f, "float"),
            Shape::String => write!(f, "string"),
            Shape::List { element } => write!(f, "list<{}>", element),
            Shape::Set { element } => write!(f, "set<{}>", element),
            Shape::Array { element } => write!(f, "array<{}>", element),
            Shape::StringMap { value } => write!(f, "map<string, {}>", value),
            Shape::Map { key, value } => write!(f, "map<{}, {}>", key, value),
            Shape::Bean { type_name, .. } => write!(f, "bean {}", type_name),
            Shape::Connector => write!(f, "connector"),
            Shape::Custom { type_name } => write!(f, "{}", type_name),
        }
    }
}
