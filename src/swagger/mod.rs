//! Swagger 2.0 ingestion.
//!
//! A 2.0 document is rewritten into an OpenAPI 3.0 document before it is
//! decoded, so the rest of the crate only ever sees one model.

mod operation;
pub mod schema;

use crate::codec::{Format, decode_from_value, decode_value};
use crate::error::{SpecError, StructuralError};
use crate::openapi::Config;
use crate::swagger::operation::{Defaults, convert_parameter, convert_path_item, convert_response};
use crate::swagger::schema::convert_schema;
use crate::{DEFAULT_CONTENT_TYPE, DESCRIPTION_FIELD, IN_FIELD, NAME_FIELD, TYPE_FIELD};
use serde_json::{Map, Value, json};

/// The `openapi` version written into converted documents.
pub const CONVERTED_VERSION: &str = "3.0.3";

/// Whether a decoded document declares `swagger: "2.0"`.
pub fn is_swagger(document: &Value) -> bool {
    match document.get("swagger") {
        Some(Value::String(v)) => v.starts_with('2'),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| (2.0..3.0).contains(&v)),
        _ => false,
    }
}

/// Decodes a 2.0 document from bytes and converts it.
pub fn decode(bytes: &[u8], format: Format) -> Result<Config, SpecError> {
    let document = decode_value(bytes, format)?;
    convert_to_config(&document)
}

pub fn convert_to_config(document: &Value) -> Result<Config, SpecError> {
    let converted = convert(document)?;
    decode_from_value(&converted)
        .map_err(|e| SpecError::from(e.unlocated()).context("decode converted document failed"))
}

/// Rewrites a Swagger 2.0 document into an OpenAPI 3.0 document.
pub fn convert(document: &Value) -> Result<Value, SpecError> {
    let Some(source) = document.as_object() else {
        return Err(StructuralError::new(0, Vec::new(), "swagger document must be an object").into());
    };
    let defaults = Defaults {
        consumes: media_types(source.get("consumes")),
        produces: media_types(source.get("produces")),
        parameters: source
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    };

    let mut out = Map::new();
    out.insert("openapi".to_owned(), json!(CONVERTED_VERSION));
    if let Some(info) = source.get("info") {
        out.insert("info".to_owned(), info.clone());
    }
    let servers = servers(source);
    if !servers.is_empty() {
        out.insert("servers".to_owned(), Value::Array(servers));
    }

    let mut paths = Map::new();
    if let Some(source_paths) = source.get("paths").and_then(Value::as_object) {
        for (template, item) in source_paths {
            if template.starts_with("x-") {
                paths.insert(template.clone(), item.clone());
                continue;
            }
            paths.insert(template.clone(), convert_path_item(item, &defaults)?);
        }
    }
    out.insert("paths".to_owned(), Value::Object(paths));

    let components = components(source, &defaults)?;
    if !components.is_empty() {
        out.insert("components".to_owned(), Value::Object(components));
    }
    for key in ["security", "tags", "externalDocs"] {
        if let Some(value) = source.get(key) {
            out.insert(key.to_owned(), value.clone());
        }
    }
    for (key, value) in source.iter().filter(|(k, _)| k.starts_with("x-")) {
        out.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(out))
}

pub(crate) fn media_types(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// One server per scheme for `host` + `basePath`; `http` without schemes.
fn servers(source: &Map<String, Value>) -> Vec<Value> {
    let host = source.get("host").and_then(Value::as_str).unwrap_or_default();
    let base_path = source
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if host.is_empty() {
        if base_path.is_empty() {
            return Vec::new();
        }
        return vec![json!({"url": base_path})];
    }
    let schemes = media_types(source.get("schemes"));
    if schemes.is_empty() {
        return vec![json!({"url": format!("http://{}{}", host, base_path)})];
    }
    schemes
        .iter()
        .map(|scheme| json!({"url": format!("{}://{}{}", scheme, host, base_path)}))
        .collect()
}

fn components(
    source: &Map<String, Value>,
    defaults: &Defaults,
) -> Result<Map<String, Value>, SpecError> {
    let mut components = Map::new();

    if let Some(definitions) = source.get("definitions").and_then(Value::as_object) {
        let schemas: Map<String, Value> = definitions
            .iter()
            .map(|(name, s)| (name.clone(), convert_schema(s)))
            .collect();
        components.insert("schemas".to_owned(), Value::Object(schemas));
    }

    // body and formData parameters have no 3.0 component counterpart; they
    // are inlined into request bodies where referenced
    let parameters: Map<String, Value> = defaults
        .parameters
        .iter()
        .filter(|(_, p)| !matches!(p.get(IN_FIELD).and_then(Value::as_str), Some("body" | "formData")))
        .map(|(name, p)| Ok((name.clone(), convert_parameter(p)?)))
        .collect::<Result<_, SpecError>>()?;
    if !parameters.is_empty() {
        components.insert("parameters".to_owned(), Value::Object(parameters));
    }

    if let Some(responses) = source.get("responses").and_then(Value::as_object) {
        let produces = if defaults.produces.is_empty() {
            vec![DEFAULT_CONTENT_TYPE.to_owned()]
        } else {
            defaults.produces.clone()
        };
        let converted: Map<String, Value> = responses
            .iter()
            .map(|(name, r)| (name.clone(), convert_response(r, &produces)))
            .collect();
        components.insert("responses".to_owned(), Value::Object(converted));
    }

    if let Some(definitions) = source.get("securityDefinitions").and_then(Value::as_object) {
        let schemes: Map<String, Value> = definitions
            .iter()
            .map(|(name, d)| (name.clone(), convert_security_scheme(d)))
            .collect();
        components.insert("securitySchemes".to_owned(), Value::Object(schemes));
    }
    Ok(components)
}

fn convert_security_scheme(definition: &Value) -> Value {
    let description = definition.get(DESCRIPTION_FIELD).cloned();
    let mut scheme = match definition.get(TYPE_FIELD).and_then(Value::as_str) {
        Some("basic") => json!({"type": "http", "scheme": "basic"}),
        Some("apiKey") => json!({
            "type": "apiKey",
            "name": definition.get(NAME_FIELD).cloned().unwrap_or_default(),
            "in": definition.get(IN_FIELD).cloned().unwrap_or_else(|| json!("header")),
        }),
        Some(other) => json!({"type": other}),
        None => json!({}),
    };
    if let (Some(description), Some(map)) = (description, scheme.as_object_mut()) {
        map.insert(DESCRIPTION_FIELD.to_owned(), description);
    }
    scheme
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::openapi::security::SecurityScheme;

    #[test]
    fn test_servers_from_host() {
        let config = convert_to_config(&json!({
            "swagger": "2.0",
            "host": "foo:8080",
            "basePath": "/bar"
        }))
        .unwrap();
        assert_eq!(config.servers[0].url, "http://foo:8080/bar");
        assert_eq!(config.openapi.to_string(), "3.0.3");
    }

    #[test]
    fn test_servers_from_schemes() {
        let converted = convert(&json!({
            "swagger": "2.0",
            "host": "api.example.com",
            "schemes": ["https", "http"]
        }))
        .unwrap();
        assert_eq!(
            converted["servers"],
            json!([{"url": "https://api.example.com"}, {"url": "http://api.example.com"}])
        );
    }

    #[test]
    fn test_integer_defaults_to_int32() {
        let converted = convert(&json!({
            "swagger": "2.0",
            "definitions": {"Count": {"type": "integer"}}
        }))
        .unwrap();
        assert_eq!(
            converted["components"]["schemas"]["Count"],
            json!({"type": "integer", "format": "int32"})
        );
    }

    #[test]
    fn test_security_definitions() {
        let config = convert_to_config(&json!({
            "swagger": "2.0",
            "securityDefinitions": {
                "basic": {"type": "basic"},
                "key": {"type": "apiKey", "name": "X-Key", "in": "header"},
                "oauth": {"type": "oauth2", "flow": "implicit", "authorizationUrl": "https://a"}
            }
        }))
        .unwrap();
        let schemes = &config.components.security_schemes;
        assert!(matches!(
            schemes["basic"].value().as_deref(),
            Some(SecurityScheme::Http { scheme, .. }) if scheme == "basic"
        ));
        assert!(matches!(
            schemes["key"].value().as_deref(),
            Some(SecurityScheme::ApiKey { name, .. }) if name == "X-Key"
        ));
        assert!(matches!(
            schemes["oauth"].value().as_deref(),
            Some(SecurityScheme::NotSupported { kind }) if kind == "oauth2"
        ));
    }

    #[test]
    fn test_is_swagger() {
        assert!(is_swagger(&json!({"swagger": "2.0"})));
        assert!(!is_swagger(&json!({"openapi": "3.0.0"})));
    }
}
