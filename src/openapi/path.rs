use crate::codec::{Decode, DecodeError, Node};
use crate::error::{SpecError, SpecResultExt};
use crate::openapi::Server;
use crate::openapi::operation::Operation;
use crate::openapi::parameter::{Parameter, patch_parameters, resolve_parameters};
use crate::openapi::patch::{Patch, patch_list, patch_string};
use crate::openapi::reference::{Ref, Resolve, Resolver};
use crate::{DESCRIPTION_FIELD, PARAMETERS_FIELD, SUMMARY_FIELD};
use http::Method;
use indexmap::IndexMap;
use serde::Serialize;

const METHODS: [&str; 9] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace", "query",
];

/// The operations available on one path template.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Keyed by lower-case method name, in declaration order.
    #[serde(flatten)]
    pub operations: IndexMap<String, Operation>,
    /// Operations for methods outside the fixed set, keyed as declared.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub additional_operations: IndexMap<String, Operation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Ref<Parameter>>,
}

impl PathItem {
    pub fn operation(&self, method: &Method) -> Option<&Operation> {
        let name = method.as_str();
        self.operations
            .get(&name.to_ascii_lowercase())
            .or_else(|| self.additional_operations.get(name))
            .or_else(|| {
                self.additional_operations
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, o)| o)
            })
    }

    /// Every operation with its method name as written in the document.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &Operation)> {
        self.operations
            .iter()
            .chain(self.additional_operations.iter())
            .map(|(k, o)| (k.as_str(), o))
    }

    /// Upper-case names of the methods this item answers.
    pub fn allowed_methods(&self) -> Vec<String> {
        self.operations()
            .map(|(name, _)| name.to_ascii_uppercase())
            .collect()
    }
}

impl Decode for PathItem {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        let mut operations = IndexMap::new();
        for (key, child) in node.entries()? {
            if METHODS.contains(&key) {
                operations.insert(key.to_owned(), Operation::decode(&child)?);
            }
        }
        Ok(PathItem {
            summary: node.get_as_str(SUMMARY_FIELD)?,
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            operations,
            additional_operations: node.decode_map("additionalOperations")?,
            servers: node.decode_list("servers")?,
            parameters: node.decode_list(PARAMETERS_FIELD)?,
        })
    }
}

impl Resolve for PathItem {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        resolve_parameters(resolver, &mut self.parameters)?;
        for (method, operation) in self
            .operations
            .iter_mut()
            .chain(self.additional_operations.iter_mut())
        {
            operation
                .resolve(resolver)
                .context(|| format!("parse operation '{}' failed", method.to_ascii_uppercase()))?;
        }
        Ok(())
    }
}

impl Patch for PathItem {
    fn patch(&mut self, other: &Self) {
        patch_string(&mut self.summary, &other.summary);
        patch_string(&mut self.description, &other.description);
        self.operations.patch(&other.operations);
        self.additional_operations.patch(&other.additional_operations);
        patch_list(&mut self.servers, &other.servers);
        patch_parameters(&mut self.parameters, &other.parameters);
    }
}

/// Path templates in declaration order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Paths(pub IndexMap<String, Ref<PathItem>>);

impl Paths {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Ref<PathItem>)> {
        self.0.iter()
    }

    pub fn get(&self, template: &str) -> Option<&Ref<PathItem>> {
        self.0.get(template)
    }
}

impl Decode for Paths {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        let mut paths = IndexMap::new();
        for (key, child) in node.entries()? {
            if key.starts_with("x-") {
                continue;
            }
            if !key.starts_with('/') {
                return Err(child.key_error(format!("path '{}' must start with '/'", key)));
            }
            paths.insert(key.to_owned(), Ref::decode(&child)?);
        }
        Ok(Paths(paths))
    }
}

impl Paths {
    pub(crate) fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        for (template, item) in self.0.iter_mut() {
            resolver
                .resolve(item)
                .context(|| format!("parse path '{}' failed", template))?;
        }
        Ok(())
    }
}

impl Patch for Paths {
    fn patch(&mut self, other: &Self) {
        self.0.patch(&other.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use serde_json::json;

    #[test]
    fn test_operation_lookup() {
        let item: PathItem = decode_from_value(&json!({
            "get": {"responses": {"200": {"description": "ok"}}},
            "query": {"responses": {"200": {"description": "search"}}},
            "additionalOperations": {
                "PURGE": {"responses": {"204": {"description": "purged"}}}
            }
        }))
        .unwrap();
        assert!(item.operation(&Method::GET).is_some());
        assert!(item.operation(&Method::POST).is_none());
        let query = Method::from_bytes(b"QUERY").unwrap();
        assert!(item.operation(&query).is_some());
        let purge = Method::from_bytes(b"PURGE").unwrap();
        assert!(item.operation(&purge).is_some());
        assert_eq!(item.allowed_methods(), vec!["GET", "QUERY", "PURGE"]);
    }

    #[test]
    fn test_path_must_start_with_slash() {
        let err = decode_from_value::<Paths>(&json!({"pets": {}})).unwrap_err();
        assert_eq!(err.message, "path 'pets' must start with '/'");
        assert!(err.key);
    }
}
