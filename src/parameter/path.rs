use crate::openapi::parameter::{Parameter, Style};
use crate::parameter::{
    Extracted, Extractor, Shape, assignments_to_object, decode_token, pairs_to_object, simple,
    to_array,
};
use crate::types::ParameterLocation;
use dashmap::DashMap;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

static TEMPLATES: OnceLock<DashMap<String, Option<Arc<Regex>>>> = OnceLock::new();

fn template_regex(template: &str) -> Option<Arc<Regex>> {
    let cache = TEMPLATES.get_or_init(DashMap::new);
    if let Some(cached) = cache.get(template) {
        return cached.clone();
    }
    let compiled = compile_template(template).map(Arc::new);
    if compiled.is_none() {
        log::warn!("path template '{}' cannot be compiled", template);
    }
    cache.insert(template.to_owned(), compiled.clone());
    compiled
}

fn compile_template(template: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let close = open + rest[open..].find('}')?;
        pattern.push_str(&regex::escape(&rest[..open]));
        pattern.push_str("([^/]+)");
        rest = &rest[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Regex::new(&pattern).ok()
}

fn placeholder_names(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        names.push(&rest[open + 1..open + len]);
        rest = &rest[open + len + 1..];
    }
    names
}

/// Matches a request path against a template such as `/pets/{petId}`,
/// returning the raw text of every placeholder.
pub fn match_template(template: &str, path: &str) -> Option<IndexMap<String, String>> {
    if !template.contains('{') {
        return (template == path).then(IndexMap::new);
    }
    let regex = template_regex(template)?;
    let captures = regex.captures(path)?;
    Some(
        placeholder_names(template)
            .into_iter()
            .zip(captures.iter().skip(1))
            .filter_map(|(name, m)| m.map(|m| (name.to_owned(), m.as_str().to_owned())))
            .collect(),
    )
}

/// Removes a service base path from a request path. The remainder always
/// starts with `/`; `None` when the path is outside the base.
pub fn strip_base_path<'p>(path: &'p str, base: &str) -> Option<&'p str> {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

pub(crate) struct PathExtractor {
    values: IndexMap<String, String>,
}

impl PathExtractor {
    pub(crate) fn new(template: &str, path: &str) -> Self {
        PathExtractor {
            values: match_template(template, path).unwrap_or_default(),
        }
    }
}

impl Extractor for PathExtractor {
    fn location(&self) -> ParameterLocation {
        ParameterLocation::Path
    }

    fn extract(&self, parameter: &Parameter) -> Result<Option<Extracted>, String> {
        let Some(raw) = self.values.get(&parameter.name) else {
            return Ok(None);
        };
        let value = match parameter.style() {
            Style::Label => label(parameter, raw)?,
            Style::Matrix => matrix(parameter, raw)?,
            _ => simple(parameter, raw)?,
        };
        Ok(Some(Extracted::new(value, raw.as_str())))
    }
}

fn label(parameter: &Parameter, raw: &str) -> Result<Value, String> {
    let Some(text) = raw.strip_prefix('.') else {
        return Err(format!("label style value '{}' must start with '.'", raw));
    };
    let reserved = parameter.allow_reserved;
    let separator = if parameter.explode() { '.' } else { ',' };
    match Shape::of(parameter) {
        Shape::Primitive => Ok(Value::String(decode_token(text, reserved))),
        Shape::Array => Ok(to_array(text.split(separator), reserved)),
        Shape::Object if parameter.explode() => assignments_to_object(text.split('.'), reserved),
        Shape::Object => pairs_to_object(text.split(','), reserved),
    }
}

fn matrix(parameter: &Parameter, raw: &str) -> Result<Value, String> {
    let Some(text) = raw.strip_prefix(';') else {
        return Err(format!("matrix style value '{}' must start with ';'", raw));
    };
    let reserved = parameter.allow_reserved;
    let name = parameter.name.as_str();
    let shape = Shape::of(parameter);
    if shape == Shape::Object && parameter.explode() {
        return assignments_to_object(text.split(';'), reserved);
    }
    if shape == Shape::Array && parameter.explode() {
        let mut items = Vec::new();
        for token in text.split(';') {
            items.push(matrix_value(name, token)?);
        }
        return Ok(to_array(items.into_iter(), reserved));
    }
    let value = matrix_value(name, text)?;
    match shape {
        Shape::Primitive => Ok(Value::String(decode_token(value, reserved))),
        Shape::Array => Ok(to_array(value.split(','), reserved)),
        Shape::Object => pairs_to_object(value.split(','), reserved),
    }
}

fn matrix_value<'t>(name: &str, token: &'t str) -> Result<&'t str, String> {
    match token.split_once('=') {
        Some((key, value)) if key == name => Ok(value),
        None if token == name => Ok(""),
        _ => Err(format!("matrix value '{}' does not name parameter '{}'", token, name)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use serde_json::json;

    fn parameter(value: Value) -> Parameter {
        decode_from_value(&value).unwrap()
    }

    #[test]
    fn test_match_template() {
        let values = match_template("/pets/{petId}/photos/{photoId}", "/pets/7/photos/x%20y").unwrap();
        assert_eq!(values["petId"], "7");
        assert_eq!(values["photoId"], "x%20y");
        assert!(match_template("/pets/{petId}", "/pets/7/photos").is_none());
        assert!(match_template("/pets/{petId}", "/pets/").is_none());
        assert!(match_template("/pets", "/pets").is_some());

        let values = match_template("/reports/{id}.{format}", "/reports/12.csv").unwrap();
        assert_eq!(values["id"], "12");
        assert_eq!(values["format"], "csv");
    }

    #[test]
    fn test_strip_base_path() {
        assert_eq!(strip_base_path("/api/v1/pets", "/api/v1"), Some("/pets"));
        assert_eq!(strip_base_path("/api/v1", "/api/v1/"), Some("/"));
        assert_eq!(strip_base_path("/api/v10/pets", "/api/v1"), None);
        assert_eq!(strip_base_path("/pets", ""), Some("/pets"));
    }

    #[test]
    fn test_label_and_matrix() {
        let p = parameter(json!({"name": "id", "in": "path", "style": "label",
            "schema": {"type": "array", "items": {"type": "integer"}}}));
        assert_eq!(label(&p, ".3,4,5").unwrap(), json!(["3", "4", "5"]));

        let p = parameter(json!({"name": "id", "in": "path", "style": "matrix", "explode": true,
            "schema": {"type": "array"}}));
        assert_eq!(matrix(&p, ";id=3;id=4").unwrap(), json!(["3", "4"]));

        let p = parameter(json!({"name": "id", "in": "path", "style": "matrix",
            "schema": {"type": "string"}}));
        assert_eq!(matrix(&p, ";id=a%2Fb").unwrap(), json!("a/b"));
        assert_eq!(
            matrix(&p, ";other=1").unwrap_err(),
            "matrix value 'other=1' does not name parameter 'id'"
        );
        assert!(matrix(&p, "id=1").is_err());
    }
}
