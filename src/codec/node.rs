use crate::codec::{Decode, DecodeError};
use crate::types::primitive::OpenApiPrimitives;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A cursor into a decoded document that remembers how it got there.
///
/// Every accessor reports failures with the full field path of the offending
/// node so the codec can turn it into a byte offset afterward.
#[derive(Debug, Clone)]
pub struct Node<'a> {
    value: &'a Value,
    path: Vec<String>,
}

impl<'a> Node<'a> {
    pub fn root(value: &'a Value) -> Self {
        Node {
            value,
            path: Vec::new(),
        }
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    fn child(&self, segment: impl Into<String>, value: &'a Value) -> Node<'a> {
        let mut path = self.path.clone();
        path.push(segment.into());
        Node { value, path }
    }

    pub fn get(&self, field: &str) -> Option<Node<'a>> {
        match self.value.get(field) {
            Some(Value::Null) | None => None,
            Some(value) => Some(self.child(field, value)),
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Fails with the path of this node, pointing at its value.
    pub fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::at_value(self.path.clone(), message)
    }

    /// Fails with the path of this node, pointing at its key.
    pub fn key_error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::at_key(self.path.clone(), message)
    }

    pub fn type_mismatch(&self, expected: &str) -> DecodeError {
        self.error(format!(
            "expected {} but received {}",
            expected,
            OpenApiPrimitives::of(self.value)
        ))
    }

    pub fn require_object(&self) -> Result<&'a Map<String, Value>, DecodeError> {
        match self.value.as_object() {
            Some(map) => Ok(map),
            None => Err(self.type_mismatch("object")),
        }
    }

    pub fn require_array(&self) -> Result<&'a Vec<Value>, DecodeError> {
        match self.value.as_array() {
            Some(list) => Ok(list),
            None => Err(self.type_mismatch("array")),
        }
    }

    pub fn require_str(&self) -> Result<&'a str, DecodeError> {
        match self.value.as_str() {
            Some(s) => Ok(s),
            None => Err(self.type_mismatch("string")),
        }
    }

    pub fn require_bool(&self) -> Result<bool, DecodeError> {
        match self.value.as_bool() {
            Some(b) => Ok(b),
            None => Err(self.type_mismatch("boolean")),
        }
    }

    pub fn require_f64(&self) -> Result<f64, DecodeError> {
        match self.value.as_f64() {
            Some(n) => Ok(n),
            None => Err(self.type_mismatch("number")),
        }
    }

    pub fn require_u64(&self) -> Result<u64, DecodeError> {
        if let Some(n) = self.value.as_u64() {
            return Ok(n);
        }
        match self.value.as_f64() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as u64),
            _ => Err(self.type_mismatch("non-negative integer")),
        }
    }

    /// Iterates the members of an object node in document order.
    pub fn entries(&self) -> Result<Vec<(&'a str, Node<'a>)>, DecodeError> {
        let map = self.require_object()?;
        Ok(map
            .iter()
            .map(|(key, value)| (key.as_str(), self.child(key.as_str(), value)))
            .collect())
    }

    pub fn elements(&self) -> Result<Vec<Node<'a>>, DecodeError> {
        let list = self.require_array()?;
        Ok(list
            .iter()
            .enumerate()
            .map(|(index, value)| self.child(index.to_string(), value))
            .collect())
    }

    pub fn get_as_str(&self, field: &str) -> Result<Option<String>, DecodeError> {
        match self.get(field) {
            Some(node) => Ok(Some(node.require_str()?.to_owned())),
            None => Ok(None),
        }
    }

    pub fn get_as_bool(&self, field: &str) -> Result<Option<bool>, DecodeError> {
        match self.get(field) {
            Some(node) => Ok(Some(node.require_bool()?)),
            None => Ok(None),
        }
    }

    pub fn get_as_f64(&self, field: &str) -> Result<Option<f64>, DecodeError> {
        match self.get(field) {
            Some(node) => Ok(Some(node.require_f64()?)),
            None => Ok(None),
        }
    }

    pub fn get_as_usize(&self, field: &str) -> Result<Option<usize>, DecodeError> {
        match self.get(field) {
            Some(node) => Ok(Some(node.require_u64()? as usize)),
            None => Ok(None),
        }
    }

    /// Raw JSON of a field, cloned as is.
    pub fn get_raw(&self, field: &str) -> Option<Value> {
        self.get(field).map(|node| node.value.clone())
    }

    pub fn decode<T: Decode>(&self, field: &str) -> Result<Option<T>, DecodeError> {
        match self.get(field) {
            Some(node) => Ok(Some(T::decode(&node)?)),
            None => Ok(None),
        }
    }

    pub fn decode_or_default<T: Decode + Default>(&self, field: &str) -> Result<T, DecodeError> {
        Ok(self.decode(field)?.unwrap_or_default())
    }

    pub fn decode_list<T: Decode>(&self, field: &str) -> Result<Vec<T>, DecodeError> {
        Ok(self.decode::<Vec<T>>(field)?.unwrap_or_default())
    }

    pub fn decode_map<T: Decode>(&self, field: &str) -> Result<IndexMap<String, T>, DecodeError> {
        Ok(self
            .decode::<IndexMap<String, T>>(field)?
            .unwrap_or_default())
    }
}
