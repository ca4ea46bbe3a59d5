use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// One of the primitive kinds a schema `type` may name.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub enum OpenApiPrimitives {
    Null,
    Bool,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl Display for OpenApiPrimitives {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPrimitive(pub String);

impl Display for UnknownPrimitive {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid type '{}'", self.0)
    }
}

impl std::error::Error for UnknownPrimitive {}

impl FromStr for OpenApiPrimitives {
    type Err = UnknownPrimitive;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(OpenApiPrimitives::Null),
            "boolean" => Ok(OpenApiPrimitives::Bool),
            "integer" => Ok(OpenApiPrimitives::Integer),
            "number" => Ok(OpenApiPrimitives::Number),
            "string" => Ok(OpenApiPrimitives::String),
            "array" => Ok(OpenApiPrimitives::Array),
            "object" => Ok(OpenApiPrimitives::Object),
            other => Err(UnknownPrimitive(other.to_owned())),
        }
    }
}

impl OpenApiPrimitives {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenApiPrimitives::Null => "null",
            OpenApiPrimitives::Bool => "boolean",
            OpenApiPrimitives::Integer => "integer",
            OpenApiPrimitives::Number => "number",
            OpenApiPrimitives::String => "string",
            OpenApiPrimitives::Array => "array",
            OpenApiPrimitives::Object => "object",
        }
    }

    /// The kind of a decoded JSON value. Whole numbers report `Integer`.
    pub fn of(value: &Value) -> OpenApiPrimitives {
        match value {
            Value::Null => OpenApiPrimitives::Null,
            Value::Bool(_) => OpenApiPrimitives::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => OpenApiPrimitives::Integer,
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.is_finite() => OpenApiPrimitives::Integer,
                _ => OpenApiPrimitives::Number,
            },
            Value::String(_) => OpenApiPrimitives::String,
            Value::Array(_) => OpenApiPrimitives::Array,
            Value::Object(_) => OpenApiPrimitives::Object,
        }
    }
}

/// The set of kinds a schema accepts, kept sorted so that merging two
/// schemas renders deterministically (`[string, object]`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Types(Vec<OpenApiPrimitives>);

impl Types {
    pub fn new() -> Self {
        Types(Vec::new())
    }

    pub fn single(kind: OpenApiPrimitives) -> Self {
        Types(vec![kind])
    }

    pub fn insert(&mut self, kind: OpenApiPrimitives) {
        if let Err(index) = self.0.binary_search(&kind) {
            self.0.insert(index, kind);
        }
    }

    pub fn union(&mut self, other: &Types) {
        for kind in &other.0 {
            self.insert(*kind);
        }
    }

    pub fn contains(&self, kind: OpenApiPrimitives) -> bool {
        self.0.contains(&kind)
    }

    /// True when the set names `integer` or `number` explicitly.
    pub fn is_numeric(&self) -> bool {
        self.contains(OpenApiPrimitives::Integer) || self.contains(OpenApiPrimitives::Number)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = OpenApiPrimitives> + '_ {
        self.0.iter().copied()
    }

    /// The only kind of the set, ignoring `null`.
    pub fn primary(&self) -> Option<OpenApiPrimitives> {
        let mut kinds = self.0.iter().filter(|k| **k != OpenApiPrimitives::Null);
        match (kinds.next(), kinds.next()) {
            (Some(kind), None) => Some(*kind),
            _ => None,
        }
    }
}

impl From<Vec<OpenApiPrimitives>> for Types {
    fn from(kinds: Vec<OpenApiPrimitives>) -> Self {
        let mut types = Types::new();
        for kind in kinds {
            types.insert(kind);
        }
        types
    }
}

impl Display for Types {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [single] => write!(f, "{}", single),
            many => {
                let names: Vec<&str> = many.iter().map(|k| k.as_str()).collect();
                write!(f, "[{}]", names.join(", "))
            }
        }
    }
}

impl Serialize for Types {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single.as_str()),
            many => {
                let names: Vec<&str> = many.iter().map(|k| k.as_str()).collect();
                names.serialize(serializer)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_of_values() {
        assert_eq!(OpenApiPrimitives::of(&json!(1)), OpenApiPrimitives::Integer);
        assert_eq!(OpenApiPrimitives::of(&json!(1.0)), OpenApiPrimitives::Integer);
        assert_eq!(OpenApiPrimitives::of(&json!(1.5)), OpenApiPrimitives::Number);
        assert_eq!(OpenApiPrimitives::of(&json!("a")), OpenApiPrimitives::String);
        assert_eq!(OpenApiPrimitives::of(&json!(null)), OpenApiPrimitives::Null);
        assert_eq!(OpenApiPrimitives::of(&json!({})), OpenApiPrimitives::Object);
    }

    #[test]
    fn test_union_rendering() {
        let mut types = Types::single(OpenApiPrimitives::Object);
        types.union(&Types::single(OpenApiPrimitives::String));
        types.union(&Types::single(OpenApiPrimitives::String));
        assert_eq!(types.to_string(), "[string, object]");
        assert_eq!(json!(types), json!(["string", "object"]));
        assert_eq!(types.primary(), None);
    }

    #[test]
    fn test_primary_ignores_null() {
        let types = Types::from(vec![OpenApiPrimitives::Null, OpenApiPrimitives::Integer]);
        assert_eq!(types.primary(), Some(OpenApiPrimitives::Integer));
        assert_eq!(types.to_string(), "[null, integer]");
    }

    #[test]
    fn test_unknown_kind() {
        let err = "foo".parse::<OpenApiPrimitives>().unwrap_err();
        assert_eq!(err.to_string(), "invalid type 'foo'");
    }
}
