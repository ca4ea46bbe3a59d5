use crate::codec::{Decode, DecodeError, Node};
use crate::error::{SpecError, SpecResultExt};
use crate::openapi::example::Example;
use crate::openapi::media_type::Content;
use crate::openapi::parameter::{Parameter, Style};
use crate::openapi::patch::{Patch, patch_scalar, patch_string};
use crate::openapi::reference::{Ref, Resolve, Resolver};
use crate::schema::SchemaRef;
use crate::types::ParameterLocation;
use crate::{
    CONTENT_FIELD, DEPRECATED_FIELD, DESCRIPTION_FIELD, EXAMPLE_FIELD, EXAMPLES_FIELD,
    EXPLODE_FIELD, REQUIRED_FIELD, SCHEMA_FIELD, STYLE_FIELD,
};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// A header declaration. Its name is the key it is stored under; `name`
/// and `in` inside the body are ignored.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub examples: IndexMap<String, Ref<Example>>,
    #[serde(skip_serializing_if = "Content::is_empty")]
    pub content: Content,
}

impl Header {
    /// The header as a header-located parameter named `name`.
    pub fn to_parameter(&self, name: &str) -> Parameter {
        Parameter {
            name: name.to_owned(),
            location: ParameterLocation::Header,
            description: self.description.clone(),
            schema: self.schema.clone(),
            required: self.required,
            deprecated: self.deprecated,
            style: self.style,
            explode: self.explode,
            example: self.example.clone(),
            examples: self.examples.clone(),
            content: self.content.clone(),
            ..Default::default()
        }
    }
}

impl Decode for Header {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Header {
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            required: node.get_as_bool(REQUIRED_FIELD)?.unwrap_or(false),
            deprecated: node.get_as_bool(DEPRECATED_FIELD)?.unwrap_or(false),
            schema: node.decode(SCHEMA_FIELD)?,
            style: node.decode(STYLE_FIELD)?,
            explode: node.get_as_bool(EXPLODE_FIELD)?,
            example: node.get_raw(EXAMPLE_FIELD),
            examples: node.decode_map(EXAMPLES_FIELD)?,
            content: node.decode_or_default(CONTENT_FIELD)?,
        })
    }
}

impl Resolve for Header {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        if let Some(schema) = &mut self.schema {
            resolver.resolve(schema).context(|| "parse schema failed")?;
        }
        for (name, example) in self.examples.iter_mut() {
            resolver
                .resolve(example)
                .context(|| format!("parse example '{}' failed", name))?;
        }
        self.content.resolve(resolver)
    }
}

impl Patch for Header {
    fn patch(&mut self, other: &Self) {
        patch_string(&mut self.description, &other.description);
        self.required = other.required;
        self.deprecated = other.deprecated;
        self.schema.patch(&other.schema);
        patch_scalar(&mut self.style, &other.style);
        patch_scalar(&mut self.explode, &other.explode);
        if other.example.is_some() {
            self.example.clone_from(&other.example);
            self.examples.clear();
        } else if !other.examples.is_empty() {
            self.examples.patch(&other.examples);
            self.example = None;
        }
        self.content.patch(&other.content);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use serde_json::json;

    #[test]
    fn test_header_ignores_name_and_in() {
        let header: Header = decode_from_value(&json!({
            "name": "ignored",
            "in": "query",
            "required": true,
            "schema": {"type": "integer"}
        }))
        .unwrap();
        let parameter = header.to_parameter("X-Rate-Limit");
        assert_eq!(parameter.name, "X-Rate-Limit");
        assert_eq!(parameter.location, ParameterLocation::Header);
        assert!(parameter.required);
    }
}
