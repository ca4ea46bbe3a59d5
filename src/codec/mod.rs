pub mod locate;
pub mod node;

use crate::error::StructuralError;
pub use crate::codec::node::Node;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Source syntax of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Picks the syntax from the file extension, falling back to the first
    /// significant byte of the content.
    pub fn detect(name: &str, bytes: &[u8]) -> Format {
        let name = name.split(['?', '#']).next().unwrap_or(name).to_ascii_lowercase();
        if name.ends_with(".json") {
            return Format::Json;
        }
        if name.ends_with(".yml") || name.ends_with(".yaml") {
            return Format::Yaml;
        }
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'[') => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// A decode failure before it is placed in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub path: Vec<String>,
    pub message: String,
    /// Whether the failure concerns the map key rather than its value.
    pub key: bool,
}

impl DecodeError {
    pub fn at_value(path: Vec<String>, message: impl Into<String>) -> Self {
        DecodeError {
            path,
            message: message.into(),
            key: false,
        }
    }

    pub fn at_key(path: Vec<String>, message: impl Into<String>) -> Self {
        DecodeError {
            path,
            message: message.into(),
            key: true,
        }
    }

    /// Places the failure inside `source`.
    pub fn locate(self, source: &[u8], format: Format) -> StructuralError {
        let offset = match format {
            Format::Json => locate::json_offset(source, &self.path, self.key),
            Format::Yaml => locate::yaml_offset(source, &self.path, self.key),
        };
        StructuralError::new(offset.unwrap_or(0), self.path, self.message)
    }

    /// Converts a failure that has no source to point into.
    pub fn unlocated(self) -> StructuralError {
        StructuralError::new(0, self.path, self.message)
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} at '{}'", self.message, self.path.join("/"))
        }
    }
}

impl std::error::Error for DecodeError {}

/// Builds a model value out of a decoded document node.
pub trait Decode: Sized {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError>;
}

impl Decode for String {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        Ok(node.require_str()?.to_owned())
    }
}

impl Decode for bool {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_bool()
    }
}

impl Decode for f64 {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_f64()
    }
}

impl Decode for Value {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        Ok(node.value().clone())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.elements()?.iter().map(T::decode).collect()
    }
}

impl<T: Decode> Decode for IndexMap<String, T> {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        let mut map = IndexMap::new();
        for (key, child) in node.entries()? {
            map.insert(key.to_owned(), T::decode(&child)?);
        }
        Ok(map)
    }
}

/// Parses raw bytes into a JSON value, reporting syntax errors with their
/// byte offset.
pub fn decode_value(bytes: &[u8], format: Format) -> Result<Value, StructuralError> {
    match format {
        Format::Json => match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Ok(value),
            Err(e) => {
                let offset = locate::line_column_offset(bytes, e.line(), e.column());
                Err(StructuralError::new(offset, Vec::new(), e.to_string()))
            }
        },
        Format::Yaml => {
            if bytes.iter().all(|b| b.is_ascii_whitespace()) {
                return Ok(Value::Null);
            }
            match serde_yaml::from_slice::<Value>(bytes) {
                Ok(value) => Ok(value),
                Err(e) => {
                    let offset = e.location().map(|l| l.index()).unwrap_or(0);
                    Err(StructuralError::new(offset, Vec::new(), e.to_string()))
                }
            }
        }
    }
}

/// Decodes JSON or YAML bytes into a model type.
pub fn decode<T: Decode>(bytes: &[u8], format: Format) -> Result<T, StructuralError> {
    let value = decode_value(bytes, format)?;
    match T::decode(&Node::root(&value)) {
        Ok(decoded) => Ok(decoded),
        Err(e) => Err(e.locate(bytes, format)),
    }
}

/// Decodes a model type from an already parsed value.
pub fn decode_from_value<T: Decode>(value: &Value) -> Result<T, DecodeError> {
    T::decode(&Node::root(value))
}
