use crate::openapi::parameter::Parameter;
use crate::parameter::{Extracted, Extractor, Shape, decode_token, pairs_to_object, to_array};
use crate::types::ParameterLocation;
use http::HeaderMap;
use http::header::COOKIE;
use serde_json::Value;

pub(crate) struct CookieExtractor {
    cookies: Vec<(String, String)>,
}

impl CookieExtractor {
    pub(crate) fn new(headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.trim().to_owned(), value.trim().to_owned()))
            })
            .collect();
        CookieExtractor { cookies }
    }
}

impl Extractor for CookieExtractor {
    fn location(&self) -> ParameterLocation {
        ParameterLocation::Cookie
    }

    fn extract(&self, parameter: &Parameter) -> Result<Option<Extracted>, String> {
        let values: Vec<&str> = self
            .cookies
            .iter()
            .filter(|(name, _)| *name == parameter.name)
            .map(|(_, v)| v.as_str())
            .collect();
        let Some(first) = values.first() else {
            return Ok(None);
        };
        let reserved = parameter.allow_reserved;
        let value = match Shape::of(parameter) {
            Shape::Primitive => Value::String(decode_token(first, reserved)),
            Shape::Array if parameter.explode() => to_array(values.iter().copied(), reserved),
            Shape::Array => to_array(first.split(','), reserved),
            Shape::Object => pairs_to_object(first.split(','), reserved)?,
        };
        Ok(Some(Extracted::new(value, values.join(","))))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_cookie_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("session=abc%3D; prefs=theme,dark,lang,en"),
        );
        let extractor = CookieExtractor::new(&headers);

        let session: Parameter =
            decode_from_value(&json!({"name": "session", "in": "cookie"})).unwrap();
        let extracted = extractor.extract(&session).unwrap().unwrap();
        assert_eq!(extracted.value, json!("abc="));
        assert_eq!(extracted.raw, "abc%3D");

        let prefs: Parameter = decode_from_value(&json!({
            "name": "prefs", "in": "cookie", "explode": false, "schema": {"type": "object"}
        }))
        .unwrap();
        let extracted = extractor.extract(&prefs).unwrap().unwrap();
        assert_eq!(extracted.value, json!({"theme": "dark", "lang": "en"}));

        let missing: Parameter =
            decode_from_value(&json!({"name": "other", "in": "cookie"})).unwrap();
        assert!(extractor.extract(&missing).unwrap().is_none());
    }
}
