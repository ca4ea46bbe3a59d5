use crate::error::RequestError;
use crate::openapi::Components;
use crate::openapi::security::{SecurityRequirement, SecurityScheme};
use crate::parameter::query_pairs;
use crate::types::ParameterLocation;
use http::header::{AUTHORIZATION, COOKIE};
use http::{HeaderMap, StatusCode};

/// The parts of a request credentials can travel in.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub headers: &'a HeaderMap,
    pub query: Option<&'a str>,
}

/// Checks `requirements` against a request.
///
/// Alternatives are tried in order and the first one fully satisfied wins;
/// an empty requirement object allows anonymous access. Schemes of an
/// unsupported kind are logged and treated as satisfied.
pub fn verify(
    requirements: &[SecurityRequirement],
    components: &Components,
    credentials: &Credentials<'_>,
) -> Result<(), RequestError> {
    if requirements.is_empty() {
        return Ok(());
    }
    let mut first_failure = None;
    for requirement in requirements {
        match verify_requirement(requirement, components, credentials) {
            Ok(()) => return Ok(()),
            Err(reason) => {
                first_failure.get_or_insert(reason);
            }
        }
    }
    let reason = first_failure.unwrap_or_else(|| "no security requirement satisfied".to_owned());
    Err(RequestError::new(StatusCode::FORBIDDEN, reason))
}

fn verify_requirement(
    requirement: &SecurityRequirement,
    components: &Components,
    credentials: &Credentials<'_>,
) -> Result<(), String> {
    for name in requirement.schemes() {
        let Some(scheme) = components.security_scheme(name) else {
            return Err(format!("security scheme '{}' is not defined", name));
        };
        verify_scheme(name, &scheme, credentials)?;
    }
    Ok(())
}

fn verify_scheme(
    name: &str,
    scheme: &SecurityScheme,
    credentials: &Credentials<'_>,
) -> Result<(), String> {
    match scheme {
        SecurityScheme::Http { scheme, .. } => {
            let expected = match scheme.as_str() {
                "basic" => "Basic",
                "bearer" => "Bearer",
                other => {
                    log::warn!("http security scheme '{}' of '{}' is not supported", other, name);
                    return Ok(());
                }
            };
            let authorization = credentials
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let token = authorization
                .split_once(' ')
                .filter(|(kind, _)| kind.eq_ignore_ascii_case(expected))
                .map(|(_, token)| token.trim())
                .unwrap_or_default();
            if token.is_empty() {
                return Err(format!(
                    "missing {} authorization for security scheme '{}'",
                    scheme, name
                ));
            }
            Ok(())
        }
        SecurityScheme::ApiKey { name: key, location, .. } => {
            let present = match location {
                ParameterLocation::Query => credentials
                    .query
                    .map(query_pairs)
                    .unwrap_or_default()
                    .iter()
                    .any(|(k, v)| k == key && !v.is_empty()),
                ParameterLocation::Cookie => credentials
                    .headers
                    .get_all(COOKIE)
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .flat_map(|v| v.split(';'))
                    .filter_map(|pair| pair.trim().split_once('='))
                    .any(|(k, v)| k == key && !v.is_empty()),
                _ => credentials
                    .headers
                    .get(key.to_ascii_lowercase().as_str())
                    .is_some_and(|v| !v.is_empty()),
            };
            if !present {
                return Err(format!(
                    "missing api key '{}' in {} for security scheme '{}'",
                    key, location, name
                ));
            }
            Ok(())
        }
        SecurityScheme::NotSupported { kind } => {
            log::warn!("security scheme '{}' of type '{}' is not supported", name, kind);
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use http::HeaderValue;
    use serde_json::{Value, json};

    fn components() -> Components {
        decode_from_value(&json!({
            "securitySchemes": {
                "bearer": {"type": "http", "scheme": "bearer"},
                "basic": {"type": "http", "scheme": "basic"},
                "key": {"type": "apiKey", "name": "api_key", "in": "query"},
                "oauth": {"type": "oauth2", "flows": {}}
            }
        }))
        .unwrap()
    }

    fn requirements(value: Value) -> Vec<SecurityRequirement> {
        decode_from_value(&value).unwrap()
    }

    #[test]
    fn test_bearer() {
        let components = components();
        let required = requirements(json!([{"bearer": []}]));
        let mut headers = HeaderMap::new();
        let credentials = Credentials {
            headers: &headers,
            query: None,
        };
        let err = verify(&required, &components, &credentials).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(
            err.message,
            "missing bearer authorization for security scheme 'bearer'"
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        let credentials = Credentials {
            headers: &headers,
            query: None,
        };
        assert!(verify(&required, &components, &credentials).is_ok());
        let basic = requirements(json!([{"basic": []}]));
        assert!(verify(&basic, &components, &credentials).is_err());
    }

    #[test]
    fn test_alternatives_and_api_key() {
        let components = components();
        let required = requirements(json!([{"bearer": []}, {"key": []}]));
        let headers = HeaderMap::new();
        let credentials = Credentials {
            headers: &headers,
            query: Some("api_key=secret"),
        };
        assert!(verify(&required, &components, &credentials).is_ok());

        let anonymous = requirements(json!([{"bearer": []}, {}]));
        let credentials = Credentials {
            headers: &headers,
            query: None,
        };
        assert!(verify(&anonymous, &components, &credentials).is_ok());
    }

    #[test]
    fn test_unsupported_scheme_passes() {
        let components = components();
        let required = requirements(json!([{"oauth": ["read"]}]));
        let headers = HeaderMap::new();
        let credentials = Credentials {
            headers: &headers,
            query: None,
        };
        assert!(verify(&required, &components, &credentials).is_ok());
    }
}
