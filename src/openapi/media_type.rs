use crate::codec::{Decode, DecodeError, Node};
use crate::error::{SpecError, SpecResultExt};
use crate::openapi::example::{Example, select_example};
use crate::openapi::header::Header;
use crate::openapi::parameter::Style;
use crate::openapi::patch::{Patch, patch_scalar, patch_string};
use crate::openapi::reference::{Ref, Resolve, Resolver};
use crate::schema::SchemaRef;
use crate::{ALLOW_RESERVED_FIELD, EXAMPLE_FIELD, EXAMPLES_FIELD, EXPLODE_FIELD, HEADERS_FIELD, SCHEMA_FIELD, STYLE_FIELD};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// A parsed media type such as `application/json; charset=utf-8`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentType {
    pub type_: String,
    pub subtype: String,
    pub parameters: Vec<(String, String)>,
    raw: String,
}

impl ContentType {
    pub fn parse(raw: &str) -> ContentType {
        let raw = raw.trim();
        let mut parts = raw.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let (type_, subtype) = match essence.split_once('/') {
            Some((t, s)) => (t.trim().to_owned(), s.trim().to_owned()),
            None if essence == "*" => ("*".to_owned(), "*".to_owned()),
            None => (essence.clone(), "*".to_owned()),
        };
        let parameters = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| {
                (
                    k.trim().to_ascii_lowercase(),
                    v.trim().trim_matches('"').to_owned(),
                )
            })
            .collect();
        ContentType {
            type_,
            subtype,
            parameters,
            raw: raw.to_owned(),
        }
    }

    /// `type/subtype` without parameters.
    pub fn key(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    pub fn is_any(&self) -> bool {
        self.type_ == "*" && self.subtype == "*"
    }

    pub fn is_range(&self) -> bool {
        self.type_ != "*" && self.subtype == "*"
    }

    pub fn is_wildcard(&self) -> bool {
        self.is_any() || self.is_range()
    }

    /// 2 for a concrete type, 1 for a subtype range, 0 for `*/*`.
    pub fn precedence(&self) -> u8 {
        if self.is_any() {
            0
        } else if self.is_range() {
            1
        } else {
            2
        }
    }

    /// Whether either side admits the other, honoring wildcards on both.
    pub fn matches(&self, other: &ContentType) -> bool {
        let type_ok = self.type_ == "*" || other.type_ == "*" || self.type_ == other.type_;
        let subtype_ok =
            self.subtype == "*" || other.subtype == "*" || self.subtype == other.subtype;
        type_ok && subtype_ok
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_json(&self) -> bool {
        self.subtype == "json" || self.subtype.ends_with("+json")
    }

    pub fn is_xml(&self) -> bool {
        self.subtype == "xml" || self.subtype.ends_with("+xml")
    }

    pub fn is_form_urlencoded(&self) -> bool {
        self.type_ == "application" && self.subtype == "x-www-form-urlencoded"
    }

    pub fn is_multipart(&self) -> bool {
        self.type_ == "multipart"
    }

    pub fn is_text(&self) -> bool {
        self.type_ == "text"
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.raw.is_empty() {
            write!(f, "{}", self.key())
        } else {
            f.write_str(&self.raw)
        }
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Encoding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, Ref<Header>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explode: Option<bool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allow_reserved: bool,
}

impl Encoding {
    pub fn style(&self) -> Style {
        self.style.unwrap_or(Style::Form)
    }

    pub fn explode(&self) -> bool {
        self.explode.unwrap_or(self.style() == Style::Form)
    }
}

impl Decode for Encoding {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Encoding {
            content_type: node.get_as_str("contentType")?,
            headers: node.decode_map(HEADERS_FIELD)?,
            style: node.decode(STYLE_FIELD)?,
            explode: node.get_as_bool(EXPLODE_FIELD)?,
            allow_reserved: node.get_as_bool(ALLOW_RESERVED_FIELD)?.unwrap_or(false),
        })
    }
}

impl Patch for Encoding {
    fn patch(&mut self, other: &Self) {
        patch_string(&mut self.content_type, &other.content_type);
        self.headers.patch(&other.headers);
        patch_scalar(&mut self.style, &other.style);
        patch_scalar(&mut self.explode, &other.explode);
        self.allow_reserved = other.allow_reserved;
    }
}

/// A content entry: a media type paired with its schema and examples.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaType {
    #[serde(skip)]
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub examples: IndexMap<String, Ref<Example>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub encoding: IndexMap<String, Encoding>,
}

impl MediaType {
    /// The declared sample: `example`, else the first of `examples`.
    pub fn sample(&self) -> Option<Value> {
        select_example(self.example.as_ref(), &self.examples)
    }
}

impl Decode for MediaType {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(MediaType {
            content_type: ContentType::default(),
            schema: node.decode(SCHEMA_FIELD)?,
            example: node.get_raw(EXAMPLE_FIELD),
            examples: node.decode_map(EXAMPLES_FIELD)?,
            encoding: node.decode_map("encoding")?,
        })
    }
}

impl Resolve for MediaType {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        if let Some(schema) = &mut self.schema {
            resolver.resolve(schema).context(|| "parse schema failed")?;
        }
        for (name, example) in self.examples.iter_mut() {
            resolver
                .resolve(example)
                .context(|| format!("parse example '{}' failed", name))?;
        }
        for (property, encoding) in self.encoding.iter_mut() {
            for (name, header) in encoding.headers.iter_mut() {
                resolver.resolve(header).context(|| {
                    format!("parse encoding '{}' header '{}' failed", property, name)
                })?;
            }
        }
        Ok(())
    }
}

impl Patch for MediaType {
    fn patch(&mut self, other: &Self) {
        self.schema.patch(&other.schema);
        if other.example.is_some() {
            self.example.clone_from(&other.example);
            self.examples.clear();
        } else if !other.examples.is_empty() {
            self.examples.patch(&other.examples);
            self.example = None;
        }
        self.encoding.patch(&other.encoding);
    }
}

/// Content entries in declaration order, keyed by the media type string.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Content(pub IndexMap<String, MediaType>);

/// The outcome of matching an `Accept` header against declared content.
#[derive(Debug, Clone)]
pub struct Negotiated<'a> {
    /// The type to answer with; concrete whenever either side was concrete.
    pub content_type: ContentType,
    pub media_type: &'a MediaType,
}

impl Content {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaType> {
        self.0.values()
    }

    pub fn insert(&mut self, key: impl Into<String>, mut media_type: MediaType) {
        let key = key.into();
        media_type.content_type = ContentType::parse(&key);
        self.0.insert(key, media_type);
    }

    /// Finds the declared entry whose type equals `content_type`, falling
    /// back to the most specific wildcard entry that admits it.
    pub fn get(&self, content_type: &ContentType) -> Option<&MediaType> {
        let key = content_type.key();
        if let Some(exact) = self.iter().find(|m| m.content_type.key() == key) {
            return Some(exact);
        }
        self.iter()
            .filter(|m| m.content_type.matches(content_type))
            .max_by_key(|m| m.content_type.precedence())
    }

    /// Picks the entry to answer with for an `Accept` header.
    ///
    /// Candidates rank by precedence (exact beats a range beats `*/*`), then
    /// by position in `accept`, then by declaration order. An empty header
    /// takes the first declared entry. `None` means nothing matched.
    pub fn negotiate(&self, accept: &str) -> Option<Negotiated<'_>> {
        let accepted: Vec<ContentType> = accept
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ContentType::parse)
            .collect();
        if accepted.is_empty() {
            return self.iter().next().map(|m| Negotiated {
                content_type: m.content_type.clone(),
                media_type: m,
            });
        }
        let mut best: Option<(u8, usize, usize)> = None;
        let mut chosen = None;
        for (accept_index, wanted) in accepted.iter().enumerate() {
            for (declared_index, media_type) in self.iter().enumerate() {
                let declared = &media_type.content_type;
                if !wanted.matches(declared) {
                    continue;
                }
                let precedence = wanted.precedence().min(declared.precedence());
                let rank = (precedence, usize::MAX - accept_index, usize::MAX - declared_index);
                if best.is_none_or(|b| rank > b) {
                    best = Some(rank);
                    let content_type = if declared.is_wildcard() && !wanted.is_wildcard() {
                        wanted.clone()
                    } else {
                        declared.clone()
                    };
                    chosen = Some(Negotiated {
                        content_type,
                        media_type,
                    });
                }
            }
        }
        chosen
    }
}

impl Decode for Content {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        let mut content = Content::default();
        for (key, child) in node.entries()? {
            content.insert(key, MediaType::decode(&child)?);
        }
        Ok(content)
    }
}

impl Content {
    pub(crate) fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        for (key, media_type) in self.0.iter_mut() {
            media_type
                .resolve(resolver)
                .context(|| format!("parse content '{}' failed", key))?;
        }
        Ok(())
    }
}

impl Patch for Content {
    fn patch(&mut self, other: &Self) {
        self.0.patch(&other.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use serde_json::json;

    fn content(value: Value) -> Content {
        decode_from_value(&value).unwrap()
    }

    #[test]
    fn test_parse_content_type() {
        let ct = ContentType::parse("Application/JSON; charset=\"utf-8\"");
        assert_eq!(ct.key(), "application/json");
        assert_eq!(ct.parameter("charset"), Some("utf-8"));
        assert!(ct.is_json());
        assert!(ContentType::parse("application/problem+json").is_json());
        assert!(ContentType::parse("text/*").is_range());
        assert!(ContentType::parse("*/*").is_any());
        assert!(ContentType::parse("text/*").matches(&ContentType::parse("text/plain")));
        assert!(!ContentType::parse("text/*").matches(&ContentType::parse("application/json")));
    }

    #[test]
    fn test_negotiate_first_matched_accept() {
        let content = content(json!({"application/json": {}, "text/plain": {}}));
        let chosen = content.negotiate("text/plain,application/json").unwrap();
        assert_eq!(chosen.content_type.key(), "text/plain");
        let chosen = content.negotiate("application/json, text/plain").unwrap();
        assert_eq!(chosen.content_type.key(), "application/json");
    }

    #[test]
    fn test_negotiate_precedence() {
        let content = content(json!({"application/json": {}, "text/plain": {}}));
        let chosen = content.negotiate("*/*, text/*").unwrap();
        assert_eq!(chosen.content_type.key(), "text/plain");
        let chosen = content.negotiate("*/*").unwrap();
        assert_eq!(chosen.content_type.key(), "application/json");
        assert!(content.negotiate("image/png").is_none());
        let chosen = content.negotiate("").unwrap();
        assert_eq!(chosen.content_type.key(), "application/json");
    }

    #[test]
    fn test_negotiate_declared_wildcard() {
        let content = content(json!({"*/*": {}}));
        let chosen = content.negotiate("image/png").unwrap();
        assert_eq!(chosen.content_type.key(), "image/png");
    }

    #[test]
    fn test_get_by_content_type() {
        let content = content(json!({"application/json": {}, "text/*": {}}));
        assert!(content.get(&ContentType::parse("application/json; charset=utf-8")).is_some());
        assert_eq!(
            content.get(&ContentType::parse("text/csv")).unwrap().content_type.key(),
            "text/*"
        );
        assert!(content.get(&ContentType::parse("image/png")).is_none());
    }

    #[test]
    fn test_patch_example_exclusive() {
        let mut base: MediaType = decode_from_value(&json!({"example": 1})).unwrap();
        let patch: MediaType =
            decode_from_value(&json!({"examples": {"a": {"value": 2}}})).unwrap();
        base.patch(&patch);
        assert!(base.example.is_none());
        assert_eq!(base.sample(), Some(json!(2)));
    }
}
