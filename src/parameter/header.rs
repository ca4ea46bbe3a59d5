use crate::openapi::parameter::Parameter;
use crate::parameter::{Extracted, Extractor, simple};
use crate::types::ParameterLocation;
use http::HeaderMap;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};

pub(crate) struct HeaderExtractor<'a> {
    headers: &'a HeaderMap,
}

impl<'a> HeaderExtractor<'a> {
    pub(crate) fn new(headers: &'a HeaderMap) -> Self {
        HeaderExtractor { headers }
    }
}

impl Extractor for HeaderExtractor<'_> {
    fn location(&self) -> ParameterLocation {
        ParameterLocation::Header
    }

    fn ignores(&self, parameter: &Parameter) -> bool {
        [ACCEPT, CONTENT_TYPE, AUTHORIZATION]
            .iter()
            .any(|h| h.as_str().eq_ignore_ascii_case(&parameter.name))
    }

    fn extract(&self, parameter: &Parameter) -> Result<Option<Extracted>, String> {
        let name = parameter.name.to_ascii_lowercase();
        let values: Vec<&str> = self
            .headers
            .get_all(name.as_str())
            .iter()
            .map(|v| v.to_str().map(str::trim))
            .collect::<Result<_, _>>()
            .map_err(|_| "header value is not visible ascii".to_owned())?;
        if values.is_empty() {
            return Ok(None);
        }
        let raw = values.join(",");
        Ok(Some(Extracted::new(simple(parameter, &raw)?, raw)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_header_values() {
        let mut headers = HeaderMap::new();
        headers.append("x-ids", HeaderValue::from_static("1,2"));
        headers.append("x-ids", HeaderValue::from_static("3"));
        headers.insert("accept", HeaderValue::from_static("text/plain"));
        let extractor = HeaderExtractor::new(&headers);

        let ids: Parameter = decode_from_value(&json!({
            "name": "X-Ids", "in": "header", "schema": {"type": "array"}
        }))
        .unwrap();
        let extracted = extractor.extract(&ids).unwrap().unwrap();
        assert_eq!(extracted.value, json!(["1", "2", "3"]));
        assert_eq!(extracted.raw, "1,2,3");

        let accept: Parameter =
            decode_from_value(&json!({"name": "Accept", "in": "header", "required": true}))
                .unwrap();
        assert!(extractor.ignores(&accept));
    }
}
