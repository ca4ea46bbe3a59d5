pub mod format;
pub mod generator;
pub mod marshal;
pub mod parse;

use crate::codec::{Decode, DecodeError, Node};
use crate::error::{SpecError, SpecResultExt};
use crate::openapi::patch::{Patch, patch_list, patch_scalar, patch_set, patch_string};
use crate::openapi::reference::{Ref, Resolve, Resolver};
use crate::types::primitive::{OpenApiPrimitives, Types};
use crate::{FORMAT_FIELD, ITEMS_FIELD, PROPERTIES_FIELD, REQUIRED_FIELD, TYPE_FIELD};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;

pub use crate::schema::generator::{DataGenerator, RandomGenerator};
pub use crate::schema::parse::Parser;

pub type SchemaRef = Ref<Schema>;

/// Either a schema for unknown properties or a plain allow/deny flag.
#[derive(Debug, Clone)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(SchemaRef),
}

impl Serialize for AdditionalProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AdditionalProperties::Allowed(allowed) => serializer.serialize_bool(*allowed),
            AdditionalProperties::Schema(schema) => schema.serialize(serializer),
        }
    }
}

/// `exclusiveMinimum`/`exclusiveMaximum` are flags in 3.0 and bounds in 3.1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exclusive {
    Flag(bool),
    Bound(f64),
}

impl Serialize for Exclusive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Exclusive::Flag(flag) => serializer.serialize_bool(*flag),
            Exclusive::Bound(bound) => serializer.serialize_f64(*bound),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Xml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub attribute: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub wrapped: bool,
}

impl Decode for Xml {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Xml {
            name: node.get_as_str("name")?,
            namespace: node.get_as_str("namespace")?,
            prefix: node.get_as_str("prefix")?,
            attribute: node.get_as_bool("attribute")?.unwrap_or(false),
            wrapped: node.get_as_bool("wrapped")?.unwrap_or(false),
        })
    }
}

impl Patch for Xml {
    fn patch(&mut self, other: &Self) {
        patch_string(&mut self.name, &other.name);
        patch_string(&mut self.namespace, &other.namespace);
        patch_string(&mut self.prefix, &other.prefix);
        self.attribute = other.attribute;
        self.wrapped = other.wrapped;
    }
}

/// A JSON-Schema-like description of a value.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", skip_serializing_if = "Types::is_empty")]
    pub types: Types,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, SchemaRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<SchemaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<SchemaRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<SchemaRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<SchemaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<SchemaRef>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enumeration: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_minimum: Option<Exclusive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_maximum: Option<Exclusive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unique_items: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub write_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml: Option<Xml>,
}

impl Schema {
    pub fn of(kind: OpenApiPrimitives) -> Self {
        Schema {
            types: Types::single(kind),
            ..Default::default()
        }
    }

    pub fn is(&self, kind: OpenApiPrimitives) -> bool {
        self.types.contains(kind)
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable || self.types.contains(OpenApiPrimitives::Null)
    }

    /// Whether unknown properties are accepted when the parser itself is
    /// not free-form.
    pub fn is_free_form(&self) -> bool {
        match &self.additional_properties {
            Some(AdditionalProperties::Allowed(allowed)) => *allowed,
            Some(AdditionalProperties::Schema(_)) => true,
            None => self.properties.is_empty(),
        }
    }

    pub fn property(&self, name: &str) -> Option<std::sync::Arc<Schema>> {
        self.properties.get(name).and_then(|p| p.value())
    }

    pub fn items(&self) -> Option<std::sync::Arc<Schema>> {
        self.items.as_ref().and_then(|i| i.value())
    }

    /// Lower bound and whether it is exclusive.
    pub fn lower_bound(&self) -> Option<(f64, bool)> {
        match (self.minimum, self.exclusive_minimum) {
            (_, Some(Exclusive::Bound(bound))) => Some((bound, true)),
            (Some(min), Some(Exclusive::Flag(exclusive))) => Some((min, exclusive)),
            (Some(min), None) => Some((min, false)),
            _ => None,
        }
    }

    pub fn upper_bound(&self) -> Option<(f64, bool)> {
        match (self.maximum, self.exclusive_maximum) {
            (_, Some(Exclusive::Bound(bound))) => Some((bound, true)),
            (Some(max), Some(Exclusive::Flag(exclusive))) => Some((max, exclusive)),
            (Some(max), None) => Some((max, false)),
            _ => None,
        }
    }
}

fn decode_types(node: &Node<'_>) -> Result<Types, DecodeError> {
    let parse = |node: &Node<'_>| -> Result<OpenApiPrimitives, DecodeError> {
        let name = node.require_str()?;
        OpenApiPrimitives::from_str(name).map_err(|e| node.error(e.to_string()))
    };
    match node.value() {
        Value::String(_) => Ok(Types::single(parse(node)?)),
        Value::Array(_) => {
            let mut types = Types::new();
            for element in node.elements()? {
                types.insert(parse(&element)?);
            }
            Ok(types)
        }
        _ => Err(node.type_mismatch("string or array")),
    }
}

fn decode_exclusive(node: &Node<'_>, field: &str) -> Result<Option<Exclusive>, DecodeError> {
    let Some(child) = node.get(field) else {
        return Ok(None);
    };
    match child.value() {
        Value::Bool(flag) => Ok(Some(Exclusive::Flag(*flag))),
        Value::Number(_) => Ok(Some(Exclusive::Bound(child.require_f64()?))),
        _ => Err(child.type_mismatch("boolean or number")),
    }
}

impl Decode for AdditionalProperties {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        match node.value() {
            Value::Bool(allowed) => Ok(AdditionalProperties::Allowed(*allowed)),
            Value::Object(_) => Ok(AdditionalProperties::Schema(SchemaRef::decode(node)?)),
            _ => Err(node.type_mismatch("boolean or object")),
        }
    }
}

impl Decode for Schema {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        // `true` and `false` are valid 3.1 schemas
        if let Value::Bool(accept) = node.value() {
            let mut schema = Schema::default();
            if !*accept {
                schema.not = Some(SchemaRef::new(Schema::default()));
            }
            return Ok(schema);
        }
        node.require_object()?;
        let types = match node.get(TYPE_FIELD) {
            Some(types) => decode_types(&types)?,
            None => Types::new(),
        };
        let items = match node.get(ITEMS_FIELD) {
            // tuple-style items take the first entry
            Some(items) if items.value().is_array() => {
                items.elements()?.first().map(SchemaRef::decode).transpose()?
            }
            Some(items) => Some(SchemaRef::decode(&items)?),
            None => None,
        };
        let examples = match node.get("examples") {
            Some(examples) if examples.value().is_array() => examples.require_array()?.clone(),
            _ => Vec::new(),
        };
        Ok(Schema {
            types,
            format: node.get_as_str(FORMAT_FIELD)?,
            title: node.get_as_str("title")?,
            description: node.get_as_str("description")?,
            pattern: node.get_as_str("pattern")?,
            properties: node.decode_map(PROPERTIES_FIELD)?,
            required: node.decode_list(REQUIRED_FIELD)?,
            items,
            additional_properties: node.decode("additionalProperties")?,
            all_of: node.decode_list("allOf")?,
            any_of: node.decode_list("anyOf")?,
            one_of: node.decode_list("oneOf")?,
            not: node.decode("not")?,
            enumeration: node.decode_list("enum")?,
            minimum: node.get_as_f64("minimum")?,
            maximum: node.get_as_f64("maximum")?,
            exclusive_minimum: decode_exclusive(node, "exclusiveMinimum")?,
            exclusive_maximum: decode_exclusive(node, "exclusiveMaximum")?,
            multiple_of: node.get_as_f64("multipleOf")?,
            min_length: node.get_as_usize("minLength")?,
            max_length: node.get_as_usize("maxLength")?,
            min_items: node.get_as_usize("minItems")?,
            max_items: node.get_as_usize("maxItems")?,
            unique_items: node.get_as_bool("uniqueItems")?.unwrap_or(false),
            min_properties: node.get_as_usize("minProperties")?,
            max_properties: node.get_as_usize("maxProperties")?,
            nullable: node.get_as_bool("nullable")?.unwrap_or(false),
            default: node.get_raw("default"),
            example: node.get_raw("example"),
            examples,
            deprecated: node.get_as_bool("deprecated")?.unwrap_or(false),
            read_only: node.get_as_bool("readOnly")?.unwrap_or(false),
            write_only: node.get_as_bool("writeOnly")?.unwrap_or(false),
            xml: node.decode("xml")?,
        })
    }
}

fn resolve_list(
    resolver: &mut Resolver<'_>,
    list: &mut [SchemaRef],
    keyword: &str,
) -> Result<(), SpecError> {
    for (index, schema) in list.iter_mut().enumerate() {
        resolver
            .resolve(schema)
            .context(|| format!("parse {} index {} failed", keyword, index))?;
    }
    Ok(())
}

impl Resolve for Schema {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        if let Some(pattern) = &self.pattern {
            if let Err(e) = format::anchored_pattern(pattern) {
                return Err(SpecError::invalid(format!(
                    "invalid pattern '{}': {}",
                    pattern, e
                )));
            }
        }
        for (name, property) in self.properties.iter_mut() {
            resolver
                .resolve(property)
                .context(|| format!("parse property '{}' failed", name))?;
        }
        if let Some(items) = &mut self.items {
            resolver.resolve(items).context(|| "parse items failed")?;
        }
        if let Some(AdditionalProperties::Schema(additional)) = &mut self.additional_properties {
            resolver
                .resolve(additional)
                .context(|| "parse additionalProperties failed")?;
        }
        resolve_list(resolver, &mut self.all_of, "allOf")?;
        resolve_list(resolver, &mut self.any_of, "anyOf")?;
        resolve_list(resolver, &mut self.one_of, "oneOf")?;
        if let Some(not) = &mut self.not {
            resolver.resolve(not).context(|| "parse not failed")?;
        }
        Ok(())
    }
}

impl Patch for AdditionalProperties {
    fn patch(&mut self, other: &Self) {
        match (&mut *self, other) {
            (AdditionalProperties::Schema(base), AdditionalProperties::Schema(overlay)) => {
                base.patch(overlay)
            }
            _ => *self = other.clone(),
        }
    }
}

impl Patch for Schema {
    fn patch(&mut self, other: &Self) {
        self.types.union(&other.types);
        patch_string(&mut self.format, &other.format);
        patch_string(&mut self.title, &other.title);
        patch_string(&mut self.description, &other.description);
        patch_string(&mut self.pattern, &other.pattern);
        self.properties.patch(&other.properties);
        patch_set(&mut self.required, &other.required);
        self.items.patch(&other.items);
        self.additional_properties.patch(&other.additional_properties);
        patch_list(&mut self.all_of, &other.all_of);
        patch_list(&mut self.any_of, &other.any_of);
        patch_list(&mut self.one_of, &other.one_of);
        self.not.patch(&other.not);
        patch_set(&mut self.enumeration, &other.enumeration);
        patch_scalar(&mut self.minimum, &other.minimum);
        patch_scalar(&mut self.maximum, &other.maximum);
        patch_scalar(&mut self.exclusive_minimum, &other.exclusive_minimum);
        patch_scalar(&mut self.exclusive_maximum, &other.exclusive_maximum);
        patch_scalar(&mut self.multiple_of, &other.multiple_of);
        patch_scalar(&mut self.min_length, &other.min_length);
        patch_scalar(&mut self.max_length, &other.max_length);
        patch_scalar(&mut self.min_items, &other.min_items);
        patch_scalar(&mut self.max_items, &other.max_items);
        patch_scalar(&mut self.min_properties, &other.min_properties);
        patch_scalar(&mut self.max_properties, &other.max_properties);
        self.unique_items = other.unique_items;
        self.nullable = other.nullable;
        patch_scalar(&mut self.default, &other.default);
        if other.example.is_some() {
            self.example.clone_from(&other.example);
            self.examples.clear();
        } else if !other.examples.is_empty() {
            self.examples.clone_from(&other.examples);
            self.example = None;
        }
        self.deprecated = other.deprecated;
        self.read_only = other.read_only;
        self.write_only = other.write_only;
        self.xml.patch(&other.xml);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use serde_json::json;

    fn schema(value: Value) -> Schema {
        decode_from_value(&value).unwrap()
    }

    #[test]
    fn test_decode_schema() {
        let s = schema(json!({
            "type": "object",
            "required": ["id"],
            "properties": {
                "id": {"type": "integer", "format": "int64"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "parent": {"$ref": "#/components/schemas/Pet"}
            },
            "additionalProperties": false
        }));
        assert!(s.is(OpenApiPrimitives::Object));
        assert_eq!(s.properties.keys().collect::<Vec<_>>(), vec!["id", "tags", "parent"]);
        assert!(s.properties["parent"].is_reference());
        assert!(!s.is_free_form());
        assert_eq!(s.property("id").unwrap().format.as_deref(), Some("int64"));
    }

    #[test]
    fn test_decode_31_type_list_and_exclusive_bound() {
        let s = schema(json!({"type": ["string", "null"], "exclusiveMinimum": 3}));
        assert!(s.is_nullable());
        assert_eq!(s.lower_bound(), Some((3.0, true)));

        let s = schema(json!({"type": "number", "minimum": 1, "exclusiveMinimum": true}));
        assert_eq!(s.lower_bound(), Some((1.0, true)));
    }

    #[test]
    fn test_invalid_type() {
        let doc = json!({"type": "foo"});
        let err = decode_from_value::<Schema>(&doc).unwrap_err();
        assert_eq!(err.message, "invalid type 'foo'");
        assert_eq!(err.path, vec!["type"]);
    }

    #[test]
    fn test_patch_type_union() {
        let mut base = schema(json!({"type": "string"}));
        base.patch(&schema(json!({"type": "object", "properties": {"a": {"type": "string"}}})));
        assert_eq!(base.types.to_string(), "[string, object]");
        assert!(base.properties.contains_key("a"));
    }

    #[test]
    fn test_patch_example_clears_examples() {
        let mut base = schema(json!({"examples": [1, 2]}));
        base.patch(&schema(json!({"example": 3})));
        assert_eq!(base.example, Some(json!(3)));
        assert!(base.examples.is_empty());

        base.patch(&schema(json!({})));
        assert_eq!(base.example, Some(json!(3)));
    }

    #[test]
    fn test_serialize_round_trip() {
        let doc = json!({
            "type": "object",
            "properties": {"name": {"type": "string", "maxLength": 3}},
            "additionalProperties": {"type": "integer"},
            "xml": {"name": "pet"}
        });
        let s = schema(doc.clone());
        assert_eq!(serde_json::to_value(&s).unwrap(), doc);
    }
}
