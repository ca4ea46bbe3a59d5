//! Request body decoding by media type.

use crate::error::RequestError;
use crate::openapi::media_type::{ContentType, MediaType};
use crate::parameter::{decode_token, query_pairs};
use crate::schema::{Parser, Schema};
use crate::types::primitive::OpenApiPrimitives;
use serde_json::{Map, Value};

/// Decodes `bytes` as `content_type` and validates the result against the
/// media type schema.
///
/// Malformed payloads fail with 500, schema violations with 400.
pub fn decode_body(
    bytes: &[u8],
    content_type: &ContentType,
    media_type: &MediaType,
    free_form: bool,
) -> Result<Value, RequestError> {
    let failed = |reason: &dyn std::fmt::Display| {
        format!("read request body '{}' failed: {}", content_type, reason)
    };
    let schema = media_type.schema.as_ref().and_then(|s| s.value());
    let parser = Parser::new().free_form(free_form);
    let (value, parser) = if content_type.is_json() {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| RequestError::internal(failed(&e)))?;
        (value, parser)
    } else if content_type.is_form_urlencoded() {
        let text = String::from_utf8_lossy(bytes);
        let fields = query_pairs(&text)
            .into_iter()
            .map(|(k, v)| (k, Value::String(decode_token(&v, false))));
        (collect_fields(fields, schema.as_deref()), parser.convert_strings(true))
    } else if content_type.is_multipart() {
        let boundary = content_type
            .parameter("boundary")
            .ok_or_else(|| RequestError::internal(failed(&"missing multipart boundary")))?;
        let fields = parse_multipart(bytes, boundary).map_err(|e| RequestError::internal(failed(&e)))?;
        (collect_fields(fields.into_iter(), schema.as_deref()), parser.convert_strings(true))
    } else if content_type.is_text() && !content_type.is_xml() {
        (Value::String(String::from_utf8_lossy(bytes).into_owned()), parser)
    } else {
        // no structural decoder; handed on as text without validation
        return Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()));
    };
    match schema {
        Some(schema) => parser
            .parse_schema(&value, &schema)
            .map_err(|e| RequestError::bad_request(failed(&e))),
        None => Ok(value),
    }
}

/// Builds an object from form fields. Repeated names and properties
/// declared as arrays collect into lists.
fn collect_fields(fields: impl Iterator<Item = (String, Value)>, schema: Option<&Schema>) -> Value {
    let mut map = Map::new();
    for (name, value) in fields {
        match map.get_mut(&name) {
            Some(Value::Array(list)) => list.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                let is_array = schema
                    .and_then(|s| s.property(&name))
                    .is_some_and(|p| p.is(OpenApiPrimitives::Array));
                let value = if is_array { Value::Array(vec![value]) } else { value };
                map.insert(name, value);
            }
        }
    }
    Value::Object(map)
}

/// Splits a `multipart/form-data` payload into its named fields. File parts
/// are kept as text.
fn parse_multipart(bytes: &[u8], boundary: &str) -> Result<Vec<(String, Value)>, String> {
    let boundary = boundary.trim_matches('"');
    let text = String::from_utf8_lossy(bytes);
    let delimiter = format!("--{}", boundary);
    let mut fields = Vec::new();
    let mut parts = text.split(delimiter.as_str());
    if parts.next().is_none() {
        return Err("no parts found".to_owned());
    }
    for part in parts {
        if part.starts_with("--") {
            break;
        }
        let part = part.strip_prefix("\r\n").unwrap_or(part);
        let Some((head, body)) = part.split_once("\r\n\r\n") else {
            return Err("part without header section".to_owned());
        };
        let body = body.strip_suffix("\r\n").unwrap_or(body);
        let name = head
            .lines()
            .find(|l| {
                l.split_once(':')
                    .is_some_and(|(k, _)| k.trim().eq_ignore_ascii_case("content-disposition"))
            })
            .and_then(disposition_name)
            .ok_or_else(|| "part without content-disposition name".to_owned())?;
        fields.push((name, Value::String(body.to_owned())));
    }
    Ok(fields)
}

fn disposition_name(line: &str) -> Option<String> {
    line.split(';').map(str::trim).find_map(|token| {
        let value = token.strip_prefix("name=")?;
        Some(value.trim_matches('"').to_owned())
    })
}
