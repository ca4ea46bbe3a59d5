//! `{{ dotted.path }}` substitution. Sections, partials and escaping are not
//! part of this dialect.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const SELF_PATH: &str = ".";

#[derive(Debug, Error)]
pub enum MustacheError {
    #[error("undefined field '{0}'")]
    UndefinedField(String),
    #[error("null reference: can not resolve '{0}'")]
    NullReference(String),
    #[error("unclosed tag at offset {0}")]
    Unclosed(usize),
    #[error("encode scope failed: {0}")]
    Scope(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    /// Path tokens; empty for `{{.}}`.
    Lookup(Vec<String>),
}

/// A parsed template, reusable across scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Template, MustacheError> {
        let mut parts = Vec::new();
        let mut rest = source;
        let mut offset = 0;
        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                parts.push(Part::Text(rest[..start].to_owned()));
            }
            let inner = &rest[start + OPEN.len()..];
            let end = inner.find(CLOSE).ok_or(MustacheError::Unclosed(offset + start))?;
            let path = inner[..end].trim();
            let tokens = if path == SELF_PATH {
                Vec::new()
            } else {
                path.split('.').map(|t| t.trim().to_owned()).collect()
            };
            parts.push(Part::Lookup(tokens));
            let consumed = start + OPEN.len() + end + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_owned()));
        }
        Ok(Template { parts })
    }

    pub fn render<S: Serialize + ?Sized>(&self, scope: &S) -> Result<String, MustacheError> {
        let scope = serde_json::to_value(scope)?;
        self.render_value(&scope)
    }

    pub fn render_value(&self, scope: &Value) -> Result<String, MustacheError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Lookup(tokens) => write_value(&mut out, resolve(scope, tokens)?),
            }
        }
        Ok(out)
    }
}

/// Parses and renders in one step.
pub fn render<S: Serialize + ?Sized>(source: &str, scope: &S) -> Result<String, MustacheError> {
    Template::parse(source)?.render(scope)
}

fn resolve<'v>(scope: &'v Value, tokens: &[String]) -> Result<&'v Value, MustacheError> {
    let mut current = scope;
    for token in tokens {
        current = match current {
            Value::Null => return Err(MustacheError::NullReference(token.clone())),
            Value::Object(map) => map
                .get(token)
                .ok_or_else(|| MustacheError::UndefinedField(token.clone()))?,
            Value::Array(items) => token
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .ok_or_else(|| MustacheError::UndefinedField(token.clone()))?,
            _ => return Err(MustacheError::UndefinedField(token.clone())),
        };
    }
    Ok(current)
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    #[derive(Serialize)]
    struct Request {
        method: String,
        path: IndexMap<String, Value>,
        body: Option<Value>,
    }

    #[test]
    fn test_render_struct_scope() {
        let mut path = IndexMap::new();
        path.insert("petId".to_owned(), json!(42));
        let request = Request {
            method: "GET".into(),
            path,
            body: None,
        };
        let out = render("{{ method }} pet {{path.petId}}!", &request).unwrap();
        assert_eq!(out, "GET pet 42!");

        let err = render("{{ body.name }}", &request).unwrap_err();
        assert_eq!(err.to_string(), "null reference: can not resolve 'name'");
        let err = render("{{ verb }}", &request).unwrap_err();
        assert_eq!(err.to_string(), "undefined field 'verb'");
    }

    #[test]
    fn test_arrays_and_self() {
        let scope = json!({"tags": ["a", {"name": "b"}], "n": 1.5});
        assert_eq!(render("{{tags.1.name}}-{{tags.0}}", &scope).unwrap(), "b-a");
        assert_eq!(render("{{ . }}", &json!("me")).unwrap(), "me");
        assert_eq!(render("{{.}}", &json!({"a": [1, 2]})).unwrap(), r#"{"a":[1,2]}"#);
        assert_eq!(render("{{n}}", &scope).unwrap(), "1.5");
        assert!(matches!(
            render("{{tags.7}}", &scope),
            Err(MustacheError::UndefinedField(t)) if t == "7"
        ));
    }

    #[test]
    fn test_parse() {
        let template = Template::parse("plain text").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "plain text");
        assert!(matches!(Template::parse("a {{ b"), Err(MustacheError::Unclosed(2))));
    }
}
