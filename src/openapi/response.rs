use crate::codec::{Decode, DecodeError, Node};
use crate::error::{SpecError, SpecResultExt};
use crate::openapi::header::Header;
use crate::openapi::media_type::Content;
use crate::openapi::patch::{Patch, patch_string};
use crate::openapi::reference::{Ref, Resolve, Resolver};
use crate::{CONTENT_FIELD, DESCRIPTION_FIELD, HEADERS_FIELD};
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, Ref<Header>>,
    #[serde(skip_serializing_if = "Content::is_empty")]
    pub content: Content,
}

impl Decode for Response {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Response {
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            headers: node.decode_map(HEADERS_FIELD)?,
            content: node.decode_or_default(CONTENT_FIELD)?,
        })
    }
}

impl Resolve for Response {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        for (name, header) in self.headers.iter_mut() {
            resolver
                .resolve(header)
                .context(|| format!("parse header '{}' failed", name))?;
        }
        self.content.resolve(resolver)
    }
}

impl Patch for Response {
    fn patch(&mut self, other: &Self) {
        patch_string(&mut self.description, &other.description);
        self.headers.patch(&other.headers);
        self.content.patch(&other.content);
    }
}

/// Key of a responses entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKey {
    Default,
    /// `1XX` to `5XX`, holding the leading digit.
    Range(u16),
    Code(u16),
}

impl StatusKey {
    pub fn is_success(&self) -> bool {
        match self {
            StatusKey::Range(class) => *class == 2,
            StatusKey::Code(code) => (200..300).contains(code),
            StatusKey::Default => false,
        }
    }

    /// The status to answer with when this entry is picked without a
    /// concrete request for one.
    pub fn status(&self) -> u16 {
        match self {
            StatusKey::Default => 200,
            StatusKey::Range(class) => class * 100,
            StatusKey::Code(code) => *code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatusKey(pub String);

impl Display for InvalidStatusKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid http status code '{}'", self.0)
    }
}

impl std::error::Error for InvalidStatusKey {}

impl FromStr for StatusKey {
    type Err = InvalidStatusKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "default" {
            return Ok(StatusKey::Default);
        }
        let bytes = s.as_bytes();
        if bytes.len() == 3 && bytes[1..].eq_ignore_ascii_case(b"xx") {
            if let b'1'..=b'5' = bytes[0] {
                return Ok(StatusKey::Range(u16::from(bytes[0] - b'0')));
            }
        }
        match s.parse::<u16>() {
            Ok(code) if (100..600).contains(&code) => Ok(StatusKey::Code(code)),
            _ => Err(InvalidStatusKey(s.to_owned())),
        }
    }
}

impl Display for StatusKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusKey::Default => f.write_str("default"),
            StatusKey::Range(class) => write!(f, "{}XX", class),
            StatusKey::Code(code) => write!(f, "{}", code),
        }
    }
}

/// Responses in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Responses(pub IndexMap<StatusKey, Ref<Response>>);

impl Responses {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, key: StatusKey, response: Ref<Response>) {
        self.0.insert(key, response);
    }

    /// The exact entry for `code`, else its range class, else `default`.
    pub fn get(&self, code: u16) -> Option<Arc<Response>> {
        let candidates = [
            StatusKey::Code(code),
            StatusKey::Range(code / 100),
            StatusKey::Default,
        ];
        candidates
            .iter()
            .find_map(|key| self.0.get(key))
            .and_then(Ref::value)
    }

    /// The first 2xx entry in declaration order, else `default`.
    pub fn success(&self) -> Option<(u16, Arc<Response>)> {
        let entry = self
            .0
            .iter()
            .find(|(key, _)| key.is_success())
            .or_else(|| self.0.get_key_value(&StatusKey::Default))?;
        let (key, response) = entry;
        Some((key.status(), response.value()?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatusKey, &Ref<Response>)> {
        self.0.iter()
    }
}

impl Serialize for Responses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, response) in &self.0 {
            map.serialize_entry(&key.to_string(), response)?;
        }
        map.end()
    }
}

impl Decode for Responses {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        let mut responses = Responses::default();
        for (key, child) in node.entries()? {
            let status = StatusKey::from_str(key).map_err(|e| child.key_error(e.to_string()))?;
            responses.insert(status, Ref::decode(&child)?);
        }
        Ok(responses)
    }
}

impl Responses {
    pub(crate) fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        for (key, response) in self.0.iter_mut() {
            resolver
                .resolve(response)
                .context(|| format!("parse response '{}' failed", key))?;
        }
        Ok(())
    }
}

impl Patch for Responses {
    fn patch(&mut self, other: &Self) {
        for (key, response) in &other.0 {
            match self.0.get_mut(key) {
                Some(base) => base.patch(response),
                None => {
                    self.0.insert(*key, response.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::{Format, decode, decode_from_value};
    use serde_json::json;

    #[test]
    fn test_default_response() {
        let responses: Responses =
            decode_from_value(&json!({"default": {"description": "foo"}})).unwrap();
        assert_eq!(responses.len(), 1);
        let response = responses.get(200).unwrap();
        assert_eq!(response.description.as_deref(), Some("foo"));
    }

    #[test]
    fn test_invalid_status_key_offset() {
        #[derive(Debug)]
        struct Wrapper(#[allow(dead_code)] Responses);
        impl Decode for Wrapper {
            fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
                Ok(Wrapper(node.decode_or_default("responses")?))
            }
        }
        let source = br#"{"responses":{"foo":{}}}"#;
        let err = decode::<Wrapper>(source, Format::Json).unwrap_err();
        assert_eq!(err.message, "invalid http status code 'foo'");
        assert_eq!(err.offset, 14);
    }

    #[test]
    fn test_lookup_order() {
        let responses: Responses = decode_from_value(&json!({
            "default": {"description": "fallback"},
            "2XX": {"description": "range"},
            "204": {"description": "exact"}
        }))
        .unwrap();
        assert_eq!(responses.get(204).unwrap().description.as_deref(), Some("exact"));
        assert_eq!(responses.get(201).unwrap().description.as_deref(), Some("range"));
        assert_eq!(responses.get(404).unwrap().description.as_deref(), Some("fallback"));

        let (status, response) = responses.success().unwrap();
        assert_eq!(status, 200);
        assert_eq!(response.description.as_deref(), Some("range"));
    }

    #[test]
    fn test_status_key() {
        assert_eq!("4xx".parse::<StatusKey>().unwrap(), StatusKey::Range(4));
        assert_eq!("201".parse::<StatusKey>().unwrap(), StatusKey::Code(201));
        assert!("6XX".parse::<StatusKey>().is_err());
        assert!("99".parse::<StatusKey>().is_err());
        assert_eq!(StatusKey::Range(5).to_string(), "5XX");
    }

    #[test]
    fn test_patch_keeps_order() {
        let mut base: Responses =
            decode_from_value(&json!({"200": {"description": "ok"}})).unwrap();
        let other: Responses = decode_from_value(&json!({
            "404": {"description": "missing"},
            "200": {"description": "fine"}
        }))
        .unwrap();
        base.patch(&other);
        let keys: Vec<String> = base.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["200", "404"]);
        assert_eq!(base.get(200).unwrap().description.as_deref(), Some("fine"));
    }
}
