use crate::codec::{Decode, DecodeError, Node};
use crate::error::{SpecError, SpecResultExt};
use crate::openapi::example::{Example, select_example};
use crate::openapi::media_type::Content;
use crate::openapi::patch::{Patch, patch_scalar, patch_string};
use crate::openapi::reference::{Ref, Resolve, Resolver};
use crate::schema::{Schema, SchemaRef};
use crate::types::ParameterLocation;
use crate::{
    ALLOW_RESERVED_FIELD, CONTENT_FIELD, DEPRECATED_FIELD, DESCRIPTION_FIELD, EXAMPLE_FIELD,
    EXAMPLES_FIELD, EXPLODE_FIELD, IN_FIELD, NAME_FIELD, REQUIRED_FIELD, SCHEMA_FIELD, STYLE_FIELD,
};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Serialization style of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    Simple,
    Label,
    Matrix,
    Form,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Style::Simple),
            "label" => Ok(Style::Label),
            "matrix" => Ok(Style::Matrix),
            "form" => Ok(Style::Form),
            "spaceDelimited" => Ok(Style::SpaceDelimited),
            "pipeDelimited" => Ok(Style::PipeDelimited),
            "deepObject" => Ok(Style::DeepObject),
            other => Err(format!("unknown style '{}'", other)),
        }
    }
}

impl Display for Style {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Style::Simple => "simple",
            Style::Label => "label",
            Style::Matrix => "matrix",
            Style::Form => "form",
            Style::SpaceDelimited => "spaceDelimited",
            Style::PipeDelimited => "pipeDelimited",
            Style::DeepObject => "deepObject",
        };
        f.write_str(name)
    }
}

impl Decode for Style {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        Style::from_str(node.require_str()?).map_err(|e| node.error(e))
    }
}

impl Decode for ParameterLocation {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        ParameterLocation::from_str(node.require_str()?).map_err(|e| node.error(e))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaRef>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explode: Option<bool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allow_reserved: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allow_empty_value: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub examples: IndexMap<String, Ref<Example>>,
    #[serde(skip_serializing_if = "Content::is_empty")]
    pub content: Content,
}

impl Parameter {
    pub fn new(name: impl Into<String>, location: ParameterLocation) -> Self {
        Parameter {
            name: name.into(),
            location,
            required: location == ParameterLocation::Path,
            ..Default::default()
        }
    }

    /// The declared style, else `form` for query and cookie and `simple`
    /// for path and header.
    pub fn style(&self) -> Style {
        self.style.unwrap_or(match self.location {
            ParameterLocation::Query | ParameterLocation::Cookie | ParameterLocation::QueryString => {
                Style::Form
            }
            ParameterLocation::Path | ParameterLocation::Header => Style::Simple,
        })
    }

    pub fn explode(&self) -> bool {
        self.explode.unwrap_or(self.style() == Style::Form)
    }

    /// The value schema, taken from `content` when no `schema` is set.
    pub fn schema(&self) -> Option<Arc<Schema>> {
        match &self.schema {
            Some(schema) => schema.value(),
            None => self
                .content
                .iter()
                .next()
                .and_then(|m| m.schema.as_ref())
                .and_then(|s| s.value()),
        }
    }

    pub fn schema_ref(&self) -> Option<&SchemaRef> {
        match &self.schema {
            Some(schema) => Some(schema),
            None => self.content.iter().next().and_then(|m| m.schema.as_ref()),
        }
    }

    pub fn sample(&self) -> Option<Value> {
        select_example(self.example.as_ref(), &self.examples)
    }
}

impl Decode for Parameter {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Parameter {
            name: node.get_as_str(NAME_FIELD)?.unwrap_or_default(),
            location: node.decode(IN_FIELD)?.unwrap_or_default(),
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            schema: node.decode(SCHEMA_FIELD)?,
            required: node.get_as_bool(REQUIRED_FIELD)?.unwrap_or(false),
            deprecated: node.get_as_bool(DEPRECATED_FIELD)?.unwrap_or(false),
            style: node.decode(STYLE_FIELD)?,
            explode: node.get_as_bool(EXPLODE_FIELD)?,
            allow_reserved: node.get_as_bool(ALLOW_RESERVED_FIELD)?.unwrap_or(false),
            allow_empty_value: node.get_as_bool("allowEmptyValue")?.unwrap_or(false),
            example: node.get_raw(EXAMPLE_FIELD),
            examples: node.decode_map(EXAMPLES_FIELD)?,
            content: node.decode_or_default(CONTENT_FIELD)?,
        })
    }
}

impl Resolve for Parameter {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        if self.name.is_empty() {
            return Err(SpecError::invalid("parameter name is required"));
        }
        if self.schema.is_some() && !self.content.is_empty() {
            return Err(SpecError::invalid(format!(
                "parameter '{}' must not declare both schema and content",
                self.name
            )));
        }
        if self.content.len() > 1 {
            return Err(SpecError::invalid(format!(
                "parameter '{}' content must declare exactly one media type",
                self.name
            )));
        }
        if self.location == ParameterLocation::Path {
            if self.deprecated && !self.required {
                return Err(SpecError::invalid(format!(
                    "path parameter '{}' cannot be deprecated and optional",
                    self.name
                )));
            }
            self.required = true;
        }
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

impl Patch for Parameter {
    fn patch(&mut self, other: &Self) {
        self.name.patch(&other.name);
        self.location = other.location;
        patch_string(&mut self.description, &other.description);
        self.schema.patch(&other.schema);
        self.required = other.required;
        self.deprecated = other.deprecated;
        patch_scalar(&mut self.style, &other.style);
        patch_scalar(&mut self.explode, &other.explode);
        self.allow_reserved = other.allow_reserved;
        self.allow_empty_value = other.allow_empty_value;
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

/// Resolves a parameter list, naming each failure by parameter name or
/// position.
pub(crate) fn resolve_parameters(
    resolver: &mut Resolver<'_>,
    parameters: &mut [Ref<Parameter>],
) -> Result<(), SpecError> {
    for (index, parameter) in parameters.iter_mut().enumerate() {
        let label = match (&parameter.reference, parameter.value()) {
            (None, Some(p)) if !p.name.is_empty() => format!("parameter '{}'", p.name),
            (Some(reference), _) => format!("parameter '{}'", reference),
            _ => format!("parameter index {}", index),
        };
        resolver
            .resolve(parameter)
            .context(|| format!("parse {} failed", label))?;
    }
    Ok(())
}

/// Patches parameters matching by name and location; others are appended.
pub(crate) fn patch_parameters(base: &mut Vec<Ref<Parameter>>, other: &[Ref<Parameter>]) {
    for overlay in other {
        let target = overlay.value().and_then(|o| {
            base.iter().position(|b| {
                b.value()
                    .is_some_and(|b| b.name == o.name && b.location == o.location)
            })
        });
        match target {
            Some(index) => base[index].patch(overlay),
            None => base.push(overlay.clone()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use serde_json::json;

    #[test]
    fn test_default_style_and_explode() {
        let query = Parameter::new("q", ParameterLocation::Query);
        assert_eq!(query.style(), Style::Form);
        assert!(query.explode());

        let path = Parameter::new("id", ParameterLocation::Path);
        assert_eq!(path.style(), Style::Simple);
        assert!(!path.explode());
        assert!(path.required);

        let mut header = Parameter::new("h", ParameterLocation::Header);
        header.explode = Some(true);
        assert!(header.explode());
    }

    #[test]
    fn test_decode_invalid_location() {
        let err = decode_from_value::<Parameter>(&json!({"name": "x", "in": "body"})).unwrap_err();
        assert_eq!(err.path, vec!["in"]);
        assert_eq!(err.message, "unknown parameter location 'body'");
    }

    #[test]
    fn test_patch_parameters_by_name_and_location() {
        let mut base = vec![
            Ref::new(Parameter::new("id", ParameterLocation::Path)),
            Ref::new(Parameter::new("q", ParameterLocation::Query)),
        ];
        let mut overlay = Parameter::new("q", ParameterLocation::Query);
        overlay.description = Some("search".into());
        patch_parameters(
            &mut base,
            &[Ref::new(overlay), Ref::new(Parameter::new("h", ParameterLocation::Header))],
        );
        assert_eq!(base.len(), 3);
        assert_eq!(base[1].value().unwrap().description.as_deref(), Some("search"));
    }
}
