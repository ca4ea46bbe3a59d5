//! Extraction of request parameters according to OpenAPI style and explode
//! rules.
//!
//! Every location has its own extractor producing the still textual value
//! of a parameter; [`parse_parameters`] then coerces it through the schema
//! engine with string conversion enabled.

mod cookie;
mod header;
mod path;
mod query;

use crate::error::RequestError;
use crate::openapi::parameter::Parameter;
use crate::schema::Parser;
use crate::types::ParameterLocation;
use crate::types::primitive::OpenApiPrimitives;
use http::HeaderMap;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub use crate::parameter::path::{match_template, strip_base_path};
pub(crate) use crate::parameter::query::query_pairs;

/// A parsed parameter together with the text it was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestParameter {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// The declared parameters found in a request, by location.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    pub path: IndexMap<String, RequestParameter>,
    pub query: IndexMap<String, RequestParameter>,
    pub header: IndexMap<String, RequestParameter>,
    pub cookie: IndexMap<String, RequestParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<RequestParameter>,
}

impl RequestParameters {
    pub fn get(&self, location: ParameterLocation, name: &str) -> Option<&RequestParameter> {
        match location {
            ParameterLocation::Path => self.path.get(name),
            ParameterLocation::Query => self.query.get(name),
            ParameterLocation::Header => self
                .header
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v),
            ParameterLocation::Cookie => self.cookie.get(name),
            ParameterLocation::QueryString => self.query_string.as_ref(),
        }
    }

    /// Every parameter with its location, path first.
    pub fn iter(&self) -> impl Iterator<Item = (ParameterLocation, &str, &RequestParameter)> {
        located(ParameterLocation::Path, &self.path)
            .chain(located(ParameterLocation::Query, &self.query))
            .chain(located(ParameterLocation::Header, &self.header))
            .chain(located(ParameterLocation::Cookie, &self.cookie))
            .chain(
                self.query_string
                    .iter()
                    .map(|p| (ParameterLocation::QueryString, "", p)),
            )
    }

    fn insert(&mut self, location: ParameterLocation, name: &str, parameter: RequestParameter) {
        let target = match location {
            ParameterLocation::Path => &mut self.path,
            ParameterLocation::Query => &mut self.query,
            ParameterLocation::Header => &mut self.header,
            ParameterLocation::Cookie => &mut self.cookie,
            ParameterLocation::QueryString => {
                self.query_string = Some(parameter);
                return;
            }
        };
        target.insert(name.to_owned(), parameter);
    }
}

fn located(
    location: ParameterLocation,
    map: &IndexMap<String, RequestParameter>,
) -> impl Iterator<Item = (ParameterLocation, &str, &RequestParameter)> {
    map.iter().map(move |(name, p)| (location, name.as_str(), p))
}

/// The parts of a request parameters are read from.
#[derive(Debug, Clone, Copy)]
pub struct ParameterSource<'a> {
    /// Request path with the service base path already removed.
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
}

/// A parameter value as found in the request, before schema coercion.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Extracted {
    pub value: Value,
    pub raw: String,
}

impl Extracted {
    pub(crate) fn new(value: Value, raw: impl Into<String>) -> Self {
        Extracted {
            value,
            raw: raw.into(),
        }
    }
}

/// Reads the textual value of parameters in one location.
pub(crate) trait Extractor {
    fn location(&self) -> ParameterLocation;

    /// Parameters this location never reads, such as headers owned by the
    /// protocol itself.
    fn ignores(&self, _parameter: &Parameter) -> bool {
        false
    }

    /// `Ok(None)` when the request does not carry the parameter.
    fn extract(&self, parameter: &Parameter) -> Result<Option<Extracted>, String>;
}

/// Extracts and validates `parameters` for a request matched to `template`.
pub fn parse_parameters(
    parameters: &[Arc<Parameter>],
    template: &str,
    source: &ParameterSource<'_>,
) -> Result<RequestParameters, RequestError> {
    let path = path::PathExtractor::new(template, source.path);
    let query = query::QueryExtractor::new(source.query, parameters);
    let header = header::HeaderExtractor::new(source.headers);
    let cookie = cookie::CookieExtractor::new(source.headers);
    let query_string = query::QueryStringExtractor::new(source.query);

    let mut result = RequestParameters::default();
    for parameter in parameters {
        let extractor: &dyn Extractor = match parameter.location {
            ParameterLocation::Path => &path,
            ParameterLocation::Query => &query,
            ParameterLocation::Header => &header,
            ParameterLocation::Cookie => &cookie,
            ParameterLocation::QueryString => &query_string,
        };
        if extractor.ignores(parameter) {
            continue;
        }
        if let Some(parsed) = parse_parameter(extractor, parameter)? {
            result.insert(parameter.location, &parameter.name, parsed);
        }
    }
    Ok(result)
}

fn parse_parameter(
    extractor: &dyn Extractor,
    parameter: &Parameter,
) -> Result<Option<RequestParameter>, RequestError> {
    let failed = |reason: &dyn std::fmt::Display| {
        RequestError::bad_request(format!(
            "parse {} parameter '{}' failed: {}",
            extractor.location(),
            parameter.name,
            reason
        ))
    };
    let extracted = extractor
        .extract(parameter)
        .map_err(|reason| failed(&reason))?;
    let extracted = match extracted {
        Some(e) if !is_empty(&e.value) || parameter.allow_empty_value => e,
        _ => {
            if parameter.required {
                return Err(failed(&"parameter is required"));
            }
            return Ok(parameter
                .schema()
                .and_then(|s| s.default.clone())
                .map(|value| RequestParameter { value, raw: None }));
        }
    };
    let value = Parser::for_parameters()
        .parse(&extracted.value, parameter.schema_ref())
        .map_err(|e| failed(&e))?;
    Ok(Some(RequestParameter {
        value,
        raw: Some(extracted.raw),
    }))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// How a parameter value is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Primitive,
    Array,
    Object,
}

impl Shape {
    pub(crate) fn of(parameter: &Parameter) -> Shape {
        let Some(schema) = parameter.schema() else {
            return Shape::Primitive;
        };
        match schema.types.primary() {
            Some(OpenApiPrimitives::Array) => Shape::Array,
            Some(OpenApiPrimitives::Object) => Shape::Object,
            Some(_) => Shape::Primitive,
            None if !schema.properties.is_empty() => Shape::Object,
            None if schema.items.is_some() => Shape::Array,
            None => Shape::Primitive,
        }
    }
}

/// Percent-decodes a token unless reserved characters are taken literally.
pub(crate) fn decode_token(token: &str, allow_reserved: bool) -> String {
    if allow_reserved {
        return token.to_owned();
    }
    percent_decode_str(token).decode_utf8_lossy().into_owned()
}

pub(crate) fn to_array<'t>(tokens: impl Iterator<Item = &'t str>, allow_reserved: bool) -> Value {
    Value::Array(
        tokens
            .map(|t| Value::String(decode_token(t, allow_reserved)))
            .collect(),
    )
}

/// `k1,v1,k2,v2` style objects.
pub(crate) fn pairs_to_object<'t>(
    mut tokens: impl Iterator<Item = &'t str>,
    allow_reserved: bool,
) -> Result<Value, String> {
    let mut map = Map::new();
    while let Some(key) = tokens.next() {
        let Some(value) = tokens.next() else {
            return Err(format!("invalid number of key-value pairs, missing value of '{}'", key));
        };
        map.insert(
            decode_token(key, allow_reserved),
            Value::String(decode_token(value, allow_reserved)),
        );
    }
    Ok(Value::Object(map))
}

/// `k1=v1,k2=v2` style objects.
pub(crate) fn assignments_to_object<'t>(
    tokens: impl Iterator<Item = &'t str>,
    allow_reserved: bool,
) -> Result<Value, String> {
    let mut map = Map::new();
    for token in tokens.filter(|t| !t.is_empty()) {
        let Some((key, value)) = token.split_once('=') else {
            return Err(format!("invalid format for key-value pair '{}'", token));
        };
        map.insert(
            decode_token(key, allow_reserved),
            Value::String(decode_token(value, allow_reserved)),
        );
    }
    Ok(Value::Object(map))
}

/// Decodes a `simple`-style value: comma separated, objects as pairs or
/// assignments depending on `explode`.
pub(crate) fn simple(parameter: &Parameter, text: &str) -> Result<Value, String> {
    let reserved = parameter.allow_reserved;
    match Shape::of(parameter) {
        Shape::Primitive => Ok(Value::String(decode_token(text, reserved))),
        Shape::Array => Ok(to_array(text.split(','), reserved)),
        Shape::Object if parameter.explode() => assignments_to_object(text.split(','), reserved),
        Shape::Object => pairs_to_object(text.split(','), reserved),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use http::HeaderValue;
    use serde_json::json;

    fn parameters(value: Value) -> Vec<Arc<Parameter>> {
        let list: Vec<Parameter> = decode_from_value(&value).unwrap();
        list.into_iter().map(Arc::new).collect()
    }

    fn source<'a>(path: &'a str, query: Option<&'a str>, headers: &'a HeaderMap) -> ParameterSource<'a> {
        ParameterSource {
            path,
            query,
            headers,
        }
    }

    #[test]
    fn test_path_parameter_int64() {
        let headers = HeaderMap::new();
        let params = parameters(json!([
            {"name": "petId", "in": "path", "required": true,
             "schema": {"type": "integer", "format": "int64"}}
        ]));
        let result =
            parse_parameters(&params, "/pet/{petId}", &source("/pet/42", None, &headers)).unwrap();
        let pet_id = &result.path["petId"];
        assert_eq!(pet_id.value, json!(42));
        assert!(pet_id.value.is_i64());
        assert_eq!(pet_id.raw.as_deref(), Some("42"));
    }

    #[test]
    fn test_query_deep_object() {
        let headers = HeaderMap::new();
        let params = parameters(json!([
            {"name": "id", "in": "query", "style": "deepObject", "explode": true,
             "schema": {"type": "object", "properties": {
                 "role": {"type": "string"}, "firstName": {"type": "string"}}}}
        ]));
        let result = parse_parameters(
            &params,
            "/search",
            &source("/search", Some("id[role]=admin&id[firstName]=Alex"), &headers),
        )
        .unwrap();
        assert_eq!(
            result.query["id"].value,
            json!({"role": "admin", "firstName": "Alex"})
        );
    }

    #[test]
    fn test_required_missing() {
        let headers = HeaderMap::new();
        let params = parameters(json!([
            {"name": "limit", "in": "query", "required": true, "schema": {"type": "integer"}}
        ]));
        let err = parse_parameters(&params, "/pets", &source("/pets", Some("limit="), &headers))
            .unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_REQUEST);
        assert_eq!(
            err.message,
            "parse query parameter 'limit' failed: parameter is required"
        );
    }

    #[test]
    fn test_invalid_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-limit", HeaderValue::from_static("abc"));
        let params = parameters(json!([
            {"name": "X-Limit", "in": "header", "schema": {"type": "integer"}}
        ]));
        let err = parse_parameters(&params, "/pets", &source("/pets", None, &headers)).unwrap_err();
        assert!(
            err.message
                .starts_with("parse header parameter 'X-Limit' failed: error count 1:"),
            "{}",
            err.message
        );
    }

    #[test]
    fn test_optional_default() {
        let headers = HeaderMap::new();
        let params = parameters(json!([
            {"name": "offset", "in": "query", "schema": {"type": "integer", "default": 0}}
        ]));
        let result = parse_parameters(&params, "/pets", &source("/pets", None, &headers)).unwrap();
        assert_eq!(result.query["offset"], RequestParameter { value: json!(0), raw: None });
    }

    #[test]
    fn test_simple_object() {
        let mut parameter = Parameter::new("color", ParameterLocation::Path);
        parameter.schema = Some(crate::openapi::reference::Ref::new(
            decode_from_value(&json!({"type": "object"})).unwrap(),
        ));
        assert_eq!(
            simple(&parameter, "R,100,G,200").unwrap(),
            json!({"R": "100", "G": "200"})
        );
        parameter.explode = Some(true);
        assert_eq!(
            simple(&parameter, "R=100,G=200").unwrap(),
            json!({"R": "100", "G": "200"})
        );
        assert!(simple(&parameter, "R").is_err());
    }
}
