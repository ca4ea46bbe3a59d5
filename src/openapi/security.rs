use crate::codec::{Decode, DecodeError, Node};
use crate::error::SpecError;
use crate::openapi::patch::{Patch, patch_list};
use crate::openapi::reference::{Resolve, Resolver};
use crate::types::ParameterLocation;
use crate::{DESCRIPTION_FIELD, IN_FIELD, NAME_FIELD, TYPE_FIELD};
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A security scheme, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScheme {
    Http {
        scheme: String,
        bearer_format: Option<String>,
        description: Option<String>,
    },
    ApiKey {
        name: String,
        location: ParameterLocation,
        description: Option<String>,
    },
    /// Recognized by type only; requests are never rejected on its behalf.
    NotSupported { kind: String },
}

impl Serialize for SecurityScheme {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(TYPE_FIELD, self.kind())?;
        match self {
            SecurityScheme::Http {
                scheme,
                bearer_format,
                description,
            } => {
                map.serialize_entry("scheme", scheme)?;
                if let Some(format) = bearer_format {
                    map.serialize_entry("bearerFormat", format)?;
                }
                if let Some(description) = description {
                    map.serialize_entry(DESCRIPTION_FIELD, description)?;
                }
            }
            SecurityScheme::ApiKey {
                name,
                location,
                description,
            } => {
                map.serialize_entry(NAME_FIELD, name)?;
                map.serialize_entry(IN_FIELD, location)?;
                if let Some(description) = description {
                    map.serialize_entry(DESCRIPTION_FIELD, description)?;
                }
            }
            SecurityScheme::NotSupported { .. } => {}
        }
        map.end()
    }
}

impl SecurityScheme {
    pub fn kind(&self) -> &str {
        match self {
            SecurityScheme::Http { .. } => "http",
            SecurityScheme::ApiKey { .. } => "apiKey",
            SecurityScheme::NotSupported { kind } => kind,
        }
    }
}

impl Default for SecurityScheme {
    fn default() -> Self {
        SecurityScheme::NotSupported {
            kind: String::new(),
        }
    }
}

impl Decode for SecurityScheme {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        let kind = match node.get(TYPE_FIELD) {
            Some(kind) => kind.require_str()?,
            None => return Err(node.error("security scheme type is required")),
        };
        let description = node.get_as_str(DESCRIPTION_FIELD)?;
        match kind {
            "http" => Ok(SecurityScheme::Http {
                scheme: node
                    .get_as_str("scheme")?
                    .unwrap_or_default()
                    .to_ascii_lowercase(),
                bearer_format: node.get_as_str("bearerFormat")?,
                description,
            }),
            "apiKey" => {
                let location = match node.decode::<ParameterLocation>(IN_FIELD)? {
                    Some(
                        location @ (ParameterLocation::Header
                        | ParameterLocation::Query
                        | ParameterLocation::Cookie),
                    ) => location,
                    Some(other) => {
                        return Err(node.error(format!(
                            "unsupported api key location '{}'",
                            other
                        )));
                    }
                    None => ParameterLocation::Header,
                };
                Ok(SecurityScheme::ApiKey {
                    name: node.get_as_str(NAME_FIELD)?.unwrap_or_default(),
                    location,
                    description,
                })
            }
            other => Ok(SecurityScheme::NotSupported {
                kind: other.to_owned(),
            }),
        }
    }
}

impl Resolve for SecurityScheme {
    fn resolve(&mut self, _resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        Ok(())
    }
}

impl Patch for SecurityScheme {
    fn patch(&mut self, other: &Self) {
        *self = other.clone();
    }
}

/// Scheme names mapped to the scopes they require. All entries must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SecurityRequirement(pub IndexMap<String, Vec<String>>);

impl SecurityRequirement {
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl Decode for SecurityRequirement {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        Ok(SecurityRequirement(IndexMap::decode(node)?))
    }
}

impl Patch for SecurityRequirement {
    fn patch(&mut self, other: &Self) {
        for (name, scopes) in &other.0 {
            patch_list(self.0.entry(name.clone()).or_default(), scopes);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use serde_json::json;

    #[test]
    fn test_decode_schemes() {
        let bearer: SecurityScheme =
            decode_from_value(&json!({"type": "http", "scheme": "Bearer", "bearerFormat": "JWT"}))
                .unwrap();
        assert_eq!(
            bearer,
            SecurityScheme::Http {
                scheme: "bearer".into(),
                bearer_format: Some("JWT".into()),
                description: None,
            }
        );

        let key: SecurityScheme =
            decode_from_value(&json!({"type": "apiKey", "name": "api_key", "in": "query"})).unwrap();
        assert!(matches!(
            key,
            SecurityScheme::ApiKey { location: ParameterLocation::Query, .. }
        ));

        let oauth: SecurityScheme = decode_from_value(&json!({"type": "oauth2"})).unwrap();
        assert_eq!(oauth.kind(), "oauth2");
    }

    #[test]
    fn test_missing_type() {
        let err = decode_from_value::<SecurityScheme>(&json!({"scheme": "basic"})).unwrap_err();
        assert_eq!(err.message, "security scheme type is required");
    }

    #[test]
    fn test_serialize_not_supported() {
        let oauth = SecurityScheme::NotSupported {
            kind: "oauth2".into(),
        };
        assert_eq!(serde_json::to_value(&oauth).unwrap(), json!({"type": "oauth2"}));
    }
}
