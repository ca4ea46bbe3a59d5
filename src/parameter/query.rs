use crate::openapi::parameter::{Parameter, Style};
use crate::parameter::{Extracted, Extractor, Shape, decode_token, pairs_to_object, to_array};
use crate::types::ParameterLocation;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Splits a query string into decoded keys and still encoded values. A
/// `+` stands for a space in both.
pub(crate) fn query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                decode_token(&key.replace('+', " "), false),
                value.replace('+', " "),
            )
        })
        .collect()
}

pub(crate) struct QueryExtractor {
    pairs: Vec<(String, String)>,
    declared: HashSet<String>,
}

impl QueryExtractor {
    pub(crate) fn new(query: Option<&str>, parameters: &[Arc<Parameter>]) -> Self {
        QueryExtractor {
            pairs: query.map(query_pairs).unwrap_or_default(),
            declared: parameters
                .iter()
                .filter(|p| p.location == ParameterLocation::Query)
                .map(|p| p.name.clone())
                .collect(),
        }
    }

    fn values(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn delimited(&self, parameter: &Parameter, delimiter: char) -> Option<Extracted> {
        let values = self.values(&parameter.name);
        let first = *values.first()?;
        if parameter.explode() {
            return Some(Extracted::new(
                to_array(values.iter().copied(), parameter.allow_reserved),
                values.join(&delimiter.to_string()),
            ));
        }
        let decoded = decode_token(first, parameter.allow_reserved);
        let value = Value::Array(
            decoded
                .split(delimiter)
                .map(|s| Value::String(s.to_owned()))
                .collect(),
        );
        Some(Extracted::new(value, first))
    }

    fn form(&self, parameter: &Parameter) -> Result<Option<Extracted>, String> {
        let reserved = parameter.allow_reserved;
        match Shape::of(parameter) {
            Shape::Primitive => Ok(self
                .values(&parameter.name)
                .first()
                .map(|v| Extracted::new(Value::String(decode_token(v, reserved)), *v))),
            Shape::Array => Ok(self.delimited(parameter, ',')),
            Shape::Object if parameter.explode() => Ok(self.exploded_object(parameter)),
            Shape::Object => {
                let values = self.values(&parameter.name);
                let Some(first) = values.first() else {
                    return Ok(None);
                };
                Ok(Some(Extracted::new(
                    pairs_to_object(first.split(','), reserved)?,
                    *first,
                )))
            }
        }
    }

    /// `?role=admin&firstName=Alex`: the object's properties are top-level
    /// keys. Without declared properties every undeclared key belongs to it.
    fn exploded_object(&self, parameter: &Parameter) -> Option<Extracted> {
        let properties: Vec<String> = parameter
            .schema()
            .map(|s| s.properties.keys().cloned().collect())
            .unwrap_or_default();
        let mut map = Map::new();
        let mut raw = Vec::new();
        for (key, value) in &self.pairs {
            let member = if properties.is_empty() {
                !self.declared.contains(key)
            } else {
                properties.contains(key)
            };
            if member && !map.contains_key(key) {
                map.insert(
                    key.clone(),
                    Value::String(decode_token(value, parameter.allow_reserved)),
                );
                raw.push(format!("{}={}", key, value));
            }
        }
        (!map.is_empty()).then(|| Extracted::new(Value::Object(map), raw.join("&")))
    }

    /// `?id[role]=admin&id[firstName]=Alex`
    fn deep_object(&self, parameter: &Parameter) -> Result<Option<Extracted>, String> {
        let prefix = format!("{}[", parameter.name);
        let mut root = Map::new();
        let mut raw = Vec::new();
        for (key, value) in &self.pairs {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let path = deep_path(rest).ok_or_else(|| format!("invalid deepObject key '{}'", key))?;
            insert_deep(
                &mut root,
                &path,
                Value::String(decode_token(value, parameter.allow_reserved)),
            )?;
            raw.push(format!("{}={}", key, value));
        }
        if root.is_empty() {
            return Ok(None);
        }
        Ok(Some(Extracted::new(Value::Object(root), raw.join("&"))))
    }
}

/// `role]` or `address][city]` into its property names.
fn deep_path(rest: &str) -> Option<Vec<&str>> {
    let inner = rest.strip_suffix(']')?;
    let parts: Vec<&str> = inner.split("][").collect();
    (!parts.iter().any(|p| p.is_empty() || p.contains('[') || p.contains(']'))).then_some(parts)
}

fn insert_deep(map: &mut Map<String, Value>, path: &[&str], value: Value) -> Result<(), String> {
    let Some((head, tail)) = path.split_first() else {
        return Ok(());
    };
    if tail.is_empty() {
        map.entry(head.to_string()).or_insert(value);
        return Ok(());
    }
    let child = map
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match child {
        Value::Object(inner) => insert_deep(inner, tail, value),
        _ => Err(format!("property '{}' is both a value and an object", head)),
    }
}

impl Extractor for QueryExtractor {
    fn location(&self) -> ParameterLocation {
        ParameterLocation::Query
    }

    fn extract(&self, parameter: &Parameter) -> Result<Option<Extracted>, String> {
        match parameter.style() {
            Style::DeepObject => self.deep_object(parameter),
            Style::SpaceDelimited => Ok(self.delimited(parameter, ' ')),
            Style::PipeDelimited => Ok(self.delimited(parameter, '|')),
            _ => self.form(parameter),
        }
    }
}

/// Hands the whole query string to a parameter declared `in: querystring`,
/// decoded through its single content entry.
pub(crate) struct QueryStringExtractor<'a> {
    query: Option<&'a str>,
}

impl<'a> QueryStringExtractor<'a> {
    pub(crate) fn new(query: Option<&'a str>) -> Self {
        QueryStringExtractor { query }
    }
}

impl Extractor for QueryStringExtractor<'_> {
    fn location(&self) -> ParameterLocation {
        ParameterLocation::QueryString
    }

    fn extract(&self, parameter: &Parameter) -> Result<Option<Extracted>, String> {
        let Some(query) = self.query.filter(|q| !q.is_empty()) else {
            return Ok(None);
        };
        let media_type = parameter.content.iter().next();
        let value = match media_type.map(|m| &m.content_type) {
            Some(ct) if ct.is_json() => {
                let decoded = decode_token(query, false);
                serde_json::from_str(&decoded).map_err(|e| format!("invalid json: {}", e))?
            }
            Some(ct) if ct.is_form_urlencoded() => {
                let mut map = Map::new();
                for (key, value) in query_pairs(query) {
                    let value = Value::String(decode_token(&value, false));
                    match map.get_mut(&key) {
                        Some(Value::Array(list)) => list.push(value),
                        Some(existing) => {
                            let first = existing.take();
                            *existing = Value::Array(vec![first, value]);
                        }
                        None => {
                            map.insert(key, value);
                        }
                    }
                }
                Value::Object(map)
            }
            _ => Value::String(decode_token(query, false)),
        };
        Ok(Some(Extracted::new(value, query)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use serde_json::json;

    fn parameters(value: Value) -> Vec<Arc<Parameter>> {
        let list: Vec<Parameter> = decode_from_value(&value).unwrap();
        list.into_iter().map(Arc::new).collect()
    }

    fn extract(query: &str, declared: Value) -> Vec<Option<Value>> {
        let params = parameters(declared);
        let extractor = QueryExtractor::new(Some(query), &params);
        params
            .iter()
            .map(|p| extractor.extract(p).unwrap().map(|e| e.value))
            .collect()
    }

    #[test]
    fn test_form_styles() {
        let values = extract(
            "ids=1&ids=2&tags=a,b&name=Rex+the%20dog&color=R,100,G,200",
            json!([
                {"name": "ids", "in": "query", "schema": {"type": "array"}},
                {"name": "tags", "in": "query", "explode": false, "schema": {"type": "array"}},
                {"name": "name", "in": "query", "schema": {"type": "string"}},
                {"name": "color", "in": "query", "explode": false, "schema": {"type": "object"}},
                {"name": "missing", "in": "query", "schema": {"type": "string"}}
            ]),
        );
        assert_eq!(values[0], Some(json!(["1", "2"])));
        assert_eq!(values[1], Some(json!(["a", "b"])));
        assert_eq!(values[2], Some(json!("Rex the dog")));
        assert_eq!(values[3], Some(json!({"R": "100", "G": "200"})));
        assert_eq!(values[4], None);
    }

    #[test]
    fn test_delimited() {
        let values = extract(
            "a=1%202%203&b=x|y",
            json!([
                {"name": "a", "in": "query", "style": "spaceDelimited", "explode": false,
                 "schema": {"type": "array"}},
                {"name": "b", "in": "query", "style": "pipeDelimited", "explode": false,
                 "schema": {"type": "array"}}
            ]),
        );
        assert_eq!(values[0], Some(json!(["1", "2", "3"])));
        assert_eq!(values[1], Some(json!(["x", "y"])));
    }

    #[test]
    fn test_exploded_object() {
        let values = extract(
            "limit=5&role=admin&firstName=Alex",
            json!([
                {"name": "limit", "in": "query", "schema": {"type": "integer"}},
                {"name": "filter", "in": "query", "schema": {"type": "object"}}
            ]),
        );
        assert_eq!(values[1], Some(json!({"role": "admin", "firstName": "Alex"})));
    }

    #[test]
    fn test_deep_object_nested() {
        let values = extract(
            "user[name]=Alex&user[address][city]=Berlin",
            json!([
                {"name": "user", "in": "query", "style": "deepObject", "explode": true,
                 "schema": {"type": "object"}}
            ]),
        );
        assert_eq!(
            values[0],
            Some(json!({"name": "Alex", "address": {"city": "Berlin"}}))
        );
    }

    #[test]
    fn test_query_string_json() {
        let params = parameters(json!([
            {"name": "q", "in": "querystring",
             "content": {"application/json": {"schema": {"type": "object"}}}}
        ]));
        let extractor = QueryStringExtractor::new(Some("%7B%22a%22%3A1%7D"));
        let extracted = extractor.extract(&params[0]).unwrap().unwrap();
        assert_eq!(extracted.value, json!({"a": 1}));
    }
}
