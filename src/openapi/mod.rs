pub mod example;
pub mod header;
pub mod media_type;
pub mod operation;
pub mod parameter;
pub mod patch;
pub mod path;
pub mod reference;
pub mod request_body;
pub mod response;
pub mod security;

use crate::codec::{Decode, DecodeError, Format, Node, decode_value};
use crate::error::{SpecError, SpecResultExt};
use crate::openapi::example::Example;
use crate::openapi::header::Header;
use crate::openapi::parameter::Parameter;
use crate::openapi::patch::{Patch, patch_list, patch_set, patch_string};
use crate::openapi::path::{PathItem, Paths};
use crate::openapi::reference::{Reader, Ref, References, Resolve, Resolver};
use crate::openapi::request_body::RequestBody;
use crate::openapi::response::Response;
use crate::openapi::security::{SecurityRequirement, SecurityScheme};
use crate::schema::SchemaRef;
use crate::types::json_path::JsonPath;
use crate::types::version::Version;
use crate::{DESCRIPTION_FIELD, NAME_FIELD, SECURITY_FIELD};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

pub use crate::openapi::media_type::{Content, ContentType, MediaType};
pub use crate::openapi::operation::Operation;
pub use crate::openapi::response::{Responses, StatusKey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Decode for Contact {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Contact {
            name: node.get_as_str(NAME_FIELD)?,
            url: node.get_as_str("url")?,
            email: node.get_as_str("email")?,
        })
    }
}

impl Patch for Contact {
    fn patch(&mut self, other: &Self) {
        patch_string(&mut self.name, &other.name);
        patch_string(&mut self.url, &other.url);
        patch_string(&mut self.email, &other.email);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct License {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Decode for License {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(License {
            name: node.get_as_str(NAME_FIELD)?.unwrap_or_default(),
            url: node.get_as_str("url")?,
        })
    }
}

impl Patch for License {
    fn patch(&mut self, other: &Self) {
        self.name.patch(&other.name);
        patch_string(&mut self.url, &other.url);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Info {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

impl Decode for Info {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Info {
            title: node.get_as_str("title")?.unwrap_or_default(),
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            version: node.get_as_str("version")?.unwrap_or_default(),
            contact: node.decode("contact")?,
            license: node.decode("license")?,
        })
    }
}

impl Patch for Info {
    fn patch(&mut self, other: &Self) {
        self.title.patch(&other.title);
        patch_string(&mut self.description, &other.description);
        self.version.patch(&other.version);
        self.contact.patch(&other.contact);
        self.license.patch(&other.license);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerVariable {
    pub default: String,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enumeration: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Decode for ServerVariable {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(ServerVariable {
            default: node.get_as_str("default")?.unwrap_or_default(),
            enumeration: node.decode_list("enum")?,
            description: node.get_as_str(DESCRIPTION_FIELD)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Server {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, ServerVariable>,
}

impl Server {
    pub fn new(url: impl Into<String>) -> Self {
        Server {
            url: url.into(),
            ..Default::default()
        }
    }

    /// The url with every `{variable}` replaced by its default.
    pub fn expanded_url(&self) -> String {
        let mut url = self.url.clone();
        for (name, variable) in &self.variables {
            url = url.replace(&format!("{{{}}}", name), &variable.default);
        }
        url
    }

    /// Path component of the url without a trailing slash; empty for root.
    pub fn base_path(&self) -> String {
        let url = self.expanded_url();
        let path = if url.starts_with('/') {
            url
        } else {
            match Url::parse(&url) {
                Ok(parsed) => parsed.path().to_owned(),
                Err(_) => String::new(),
            }
        };
        path.trim_end_matches('/').to_owned()
    }
}

impl Decode for Server {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Server {
            url: node.get_as_str("url")?.unwrap_or_default(),
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            variables: node.decode_map("variables")?,
        })
    }
}

/// Reusable objects, addressable as `#/components/<kind>/<name>`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub schemas: IndexMap<String, SchemaRef>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub responses: IndexMap<String, Ref<Response>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Ref<Parameter>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub examples: IndexMap<String, Ref<Example>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub request_bodies: IndexMap<String, Ref<RequestBody>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, Ref<Header>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub security_schemes: IndexMap<String, Ref<SecurityScheme>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub path_items: IndexMap<String, Ref<PathItem>>,
}

impl Components {
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
            && self.responses.is_empty()
            && self.parameters.is_empty()
            && self.examples.is_empty()
            && self.request_bodies.is_empty()
            && self.headers.is_empty()
            && self.security_schemes.is_empty()
            && self.path_items.is_empty()
    }

    pub fn security_scheme(&self, name: &str) -> Option<Arc<SecurityScheme>> {
        self.security_schemes.get(name).and_then(Ref::value)
    }

    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        resolve_components(resolver, "schemas", "schema", &mut self.schemas)?;
        resolve_components(resolver, "examples", "example", &mut self.examples)?;
        resolve_components(resolver, "headers", "header", &mut self.headers)?;
        resolve_components(resolver, "parameters", "parameter", &mut self.parameters)?;
        resolve_components(resolver, "requestBodies", "request body", &mut self.request_bodies)?;
        resolve_components(resolver, "responses", "response", &mut self.responses)?;
        resolve_components(
            resolver,
            "securitySchemes",
            "security scheme",
            &mut self.security_schemes,
        )?;
        resolve_components(resolver, "pathItems", "path item", &mut self.path_items)
    }
}

fn resolve_components<T: Resolve>(
    resolver: &mut Resolver<'_>,
    kind: &str,
    label: &str,
    components: &mut IndexMap<String, Ref<T>>,
) -> Result<(), SpecError> {
    for (name, component) in components.iter_mut() {
        let mut pointer = JsonPath::new();
        pointer.add("components").add(kind).add(name);
        resolver
            .resolve_component(&pointer, component)
            .context(|| format!("parse {} '{}' failed", label, name))?;
    }
    Ok(())
}

impl Decode for Components {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Components {
            schemas: node.decode_map("schemas")?,
            responses: node.decode_map("responses")?,
            parameters: node.decode_map("parameters")?,
            examples: node.decode_map("examples")?,
            request_bodies: node.decode_map("requestBodies")?,
            headers: node.decode_map("headers")?,
            security_schemes: node.decode_map("securitySchemes")?,
            path_items: node.decode_map("pathItems")?,
        })
    }
}

impl Patch for Components {
    fn patch(&mut self, other: &Self) {
        self.schemas.patch(&other.schemas);
        self.responses.patch(&other.responses);
        self.parameters.patch(&other.parameters);
        self.examples.patch(&other.examples);
        self.request_bodies.patch(&other.request_bodies);
        self.headers.patch(&other.headers);
        self.security_schemes.patch(&other.security_schemes);
        self.path_items.patch(&other.path_items);
    }
}

/// A complete API description.
///
/// A config is decoded, optionally patched with further documents of the
/// same API, then parsed once. Parsing installs every reference and keeps
/// the table of referenced nodes alive for as long as the config lives.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    pub openapi: Version,
    pub info: Info,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    #[serde(skip_serializing_if = "Paths::is_empty")]
    pub paths: Paths,
    #[serde(skip_serializing_if = "Components::is_empty")]
    pub components: Components,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security: Vec<SecurityRequirement>,
    /// Top-level `x-` members, kept so references into them still resolve.
    #[serde(flatten)]
    pub extensions: IndexMap<String, Value>,
    #[serde(skip)]
    references: Arc<References>,
}

impl Decode for Config {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        let openapi = match node.get("openapi") {
            Some(version) => Version::from_str(version.require_str()?)
                .map_err(|e| version.error(e.to_string()))?,
            None => return Err(node.error("missing openapi version")),
        };
        let extensions = node
            .entries()?
            .into_iter()
            .filter(|(key, _)| key.starts_with("x-"))
            .map(|(key, child)| (key.to_owned(), child.value().clone()))
            .collect();
        Ok(Config {
            openapi,
            info: node.decode_or_default("info")?,
            servers: node.decode_list("servers")?,
            paths: node.decode_or_default("paths")?,
            components: node.decode_or_default("components")?,
            security: node.decode_list(SECURITY_FIELD)?,
            extensions,
            references: Arc::default(),
        })
    }
}

impl Config {
    /// Decodes an OpenAPI 3 or Swagger 2.0 document. `name` picks the
    /// syntax when it carries a `.json`/`.yaml` extension.
    pub fn decode_document(name: &str, bytes: &[u8]) -> Result<Config, SpecError> {
        let format = Format::detect(name, bytes);
        let document = decode_value(bytes, format)?;
        if crate::swagger::is_swagger(&document) {
            return crate::swagger::convert_to_config(&document);
        }
        Config::decode(&Node::root(&document))
            .map_err(|e| SpecError::from(e.locate(bytes, format)))
    }

    /// Installs every reference. `url` is the location relative references
    /// are resolved against.
    pub fn parse(&mut self, url: &Url, reader: &dyn Reader) -> Result<(), SpecError> {
        let root = serde_json::to_value(&*self)
            .map_err(|e| SpecError::invalid(format!("encode document failed: {}", e)))?;
        let mut resolver = Resolver::new(reader, url.clone(), root);
        self.components.resolve(&mut resolver)?;
        self.paths.resolve(&mut resolver)?;
        self.references = Arc::new(resolver.into_references());
        self.validate()
    }

    /// Number of distinct nodes reached through references.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Path of the first server url, without a trailing slash.
    pub fn base_path(&self) -> String {
        self.servers
            .first()
            .map(Server::base_path)
            .unwrap_or_default()
    }

    fn validate(&self) -> Result<(), SpecError> {
        for requirement in &self.security {
            self.check_requirement(requirement)?;
        }
        let mut operation_ids: HashMap<String, String> = HashMap::new();
        for (template, item) in self.paths.iter() {
            let Some(item) = item.value() else {
                continue;
            };
            for (method, operation) in item.operations() {
                let label = format!("{} {}", method.to_ascii_uppercase(), template);
                for requirement in operation.security.iter().flatten() {
                    self.check_requirement(requirement)
                        .context(|| format!("parse operation '{}' failed", label))?;
                }
                let Some(id) = operation.operation_id.as_deref() else {
                    continue;
                };
                if let Some(previous) = operation_ids.get(id) {
                    return Err(SpecError::invalid(format!(
                        "duplicate operationId '{}' on '{}' and '{}'",
                        id, previous, label
                    )));
                }
                operation_ids.insert(id.to_owned(), label);
            }
        }
        Ok(())
    }

    fn check_requirement(&self, requirement: &SecurityRequirement) -> Result<(), SpecError> {
        for scheme in requirement.schemes() {
            if !self.components.security_schemes.contains_key(scheme) {
                return Err(SpecError::invalid(format!(
                    "security scheme '{}' is not defined in components",
                    scheme
                )));
            }
        }
        Ok(())
    }
}

impl Patch for Config {
    fn patch(&mut self, other: &Self) {
        self.info.patch(&other.info);
        patch_set(&mut self.servers, &other.servers);
        self.paths.patch(&other.paths);
        self.components.patch(&other.components);
        patch_list(&mut self.security, &other.security);
        self.extensions.patch(&other.extensions);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use crate::openapi::reference::MemoryReader;
    use http::Method;
    use serde_json::json;

    fn url() -> Url {
        Url::parse("file:///specs/petstore.json").unwrap()
    }

    fn parse(value: Value) -> Result<Config, SpecError> {
        let mut config: Config = decode_from_value(&value).unwrap();
        config.parse(&url(), &MemoryReader::new())?;
        Ok(config)
    }

    #[test]
    fn test_parse_shares_component_schema() {
        let config = parse(json!({
            "openapi": "3.0.3",
            "info": {"title": "Petstore", "version": "1.0"},
            "paths": {
                "/pets": {
                    "get": {
                        "responses": {
                            "200": {
                                "description": "ok",
                                "content": {
                                    "application/json": {
                                        "schema": {"$ref": "#/components/schemas/Pet"}
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Pet": {
                        "type": "object",
                        "properties": {"parent": {"$ref": "#/components/schemas/Pet"}}
                    }
                }
            }
        }))
        .unwrap();

        let item = config.paths.get("/pets").unwrap().value().unwrap();
        let operation = item.operation(&Method::GET).unwrap();
        let response = operation.responses.get(200).unwrap();
        let media = response.content.iter().next().unwrap();
        let schema = media.schema.as_ref().unwrap().value().unwrap();
        let component = config.components.schemas["Pet"].value().unwrap();
        assert!(Arc::ptr_eq(&schema, &component));
        let parent = component.property("parent").unwrap();
        assert!(Arc::ptr_eq(&parent, &component));
    }

    #[test]
    fn test_parse_error_is_chained() {
        let err = parse(json!({
            "openapi": "3.0.3",
            "info": {"title": "Petstore", "version": "1.0"},
            "paths": {
                "/foo": {
                    "get": {
                        "responses": {
                            "200": {"$ref": "#/components/responses/Missing"}
                        }
                    }
                }
            }
        }))
        .unwrap_err();
        let message = err.to_string();
        assert!(
            message.starts_with(
                "parse path '/foo' failed: parse operation 'GET' failed: parse response '200' failed: "
            ),
            "{}",
            message
        );
        assert!(matches!(err.root_cause(), SpecError::Reference(_)));
    }

    #[test]
    fn test_duplicate_operation_id() {
        let err = parse(json!({
            "openapi": "3.1.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/a": {"get": {"operationId": "list", "responses": {}}},
                "/b": {"get": {"operationId": "list", "responses": {}}}
            }
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "duplicate operationId 'list' on 'GET /a' and 'GET /b'"
        );
    }

    #[test]
    fn test_unknown_security_scheme() {
        let err = parse(json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "security": [{"token": []}]
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "security scheme 'token' is not defined in components"
        );
    }

    #[test]
    fn test_patch_config() {
        let mut base: Config = decode_from_value(&json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1", "description": "base"},
            "paths": {"/a": {"get": {"responses": {"200": {"description": "a"}}}}}
        }))
        .unwrap();
        let other: Config = decode_from_value(&json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": ""},
            "servers": [{"url": "http://localhost/v1"}],
            "paths": {"/b": {"get": {"responses": {"200": {"description": "b"}}}}}
        }))
        .unwrap();
        base.patch(&other);
        assert_eq!(base.info.version, "1");
        assert_eq!(base.info.description.as_deref(), Some("base"));
        let templates: Vec<&String> = base.paths.iter().map(|(k, _)| k).collect();
        assert_eq!(templates, vec!["/a", "/b"]);
        assert_eq!(base.base_path(), "/v1");
    }

    #[test]
    fn test_server_variables() {
        let server: Server = decode_from_value(&json!({
            "url": "https://{host}/api/{version}/",
            "variables": {
                "host": {"default": "example.com"},
                "version": {"default": "v2", "enum": ["v1", "v2"]}
            }
        }))
        .unwrap();
        assert_eq!(server.expanded_url(), "https://example.com/api/v2/");
        assert_eq!(server.base_path(), "/api/v2");
    }

    #[test]
    fn test_decode_document() {
        let yaml = b"swagger: '2.0'\ninfo:\n  title: Pets\n  version: '1'\nhost: foo:8080\nbasePath: /bar\n";
        let config = Config::decode_document("pets.yaml", yaml).unwrap();
        assert_eq!(config.info.title, "Pets");
        assert_eq!(config.base_path(), "/bar");

        let json = br#"{"openapi": "3.0.0", "paths": {"pets": {}}}"#;
        let err = Config::decode_document("pets.json", json).unwrap_err();
        let offset = json.windows(6).position(|w| w == b"\"pets\"").unwrap();
        match err {
            SpecError::Structural(e) => {
                assert_eq!(e.message, "path 'pets' must start with '/'");
                assert_eq!(e.offset, offset);
            }
            other => panic!("unexpected error {}", other),
        }
    }
}
