use crate::codec::{Decode, DecodeError, Node};
use crate::error::{SpecError, SpecResultExt};
use crate::openapi::parameter::{Parameter, patch_parameters, resolve_parameters};
use crate::openapi::patch::{Patch, patch_list, patch_set, patch_string};
use crate::openapi::reference::{Ref, Resolver};
use crate::openapi::request_body::RequestBody;
use crate::openapi::response::Responses;
use crate::openapi::security::SecurityRequirement;
use crate::{
    DEPRECATED_FIELD, DESCRIPTION_FIELD, PARAMETERS_FIELD, REQUEST_BODY_FIELD, RESPONSES_FIELD,
    SECURITY_FIELD, SUMMARY_FIELD,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Ref<Parameter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Ref<RequestBody>>,
    pub responses: Responses,
    /// `None` inherits the document requirements; an empty list disables
    /// them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<SecurityRequirement>>,
}

impl Operation {
    /// Path-level parameters overridden by operation parameters with the
    /// same name and location.
    pub fn merged_parameters(&self, shared: &[Ref<Parameter>]) -> Vec<Arc<Parameter>> {
        let own: Vec<Arc<Parameter>> = self.parameters.iter().filter_map(Ref::value).collect();
        let mut merged: Vec<Arc<Parameter>> = shared
            .iter()
            .filter_map(Ref::value)
            .filter(|p| {
                !own.iter()
                    .any(|o| o.name == p.name && o.location == p.location)
            })
            .collect();
        merged.extend(own);
        merged
    }

    pub fn request_body(&self) -> Option<Arc<RequestBody>> {
        self.request_body.as_ref().and_then(Ref::value)
    }
}

impl Decode for Operation {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Operation {
            tags: node.decode_list("tags")?,
            summary: node.get_as_str(SUMMARY_FIELD)?,
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            operation_id: node.get_as_str("operationId")?,
            deprecated: node.get_as_bool(DEPRECATED_FIELD)?.unwrap_or(false),
            parameters: node.decode_list(PARAMETERS_FIELD)?,
            request_body: node.decode(REQUEST_BODY_FIELD)?,
            responses: node.decode_or_default(RESPONSES_FIELD)?,
            security: node.decode(SECURITY_FIELD)?,
        })
    }
}

impl Operation {
    pub(crate) fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        resolve_parameters(resolver, &mut self.parameters)?;
        if let Some(body) = &mut self.request_body {
            resolver
                .resolve(body)
                .context(|| "parse request body failed")?;
        }
        self.responses.resolve(resolver)
    }
}

impl Patch for Operation {
    fn patch(&mut self, other: &Self) {
        patch_set(&mut self.tags, &other.tags);
        patch_string(&mut self.summary, &other.summary);
        patch_string(&mut self.description, &other.description);
        patch_string(&mut self.operation_id, &other.operation_id);
        self.deprecated = other.deprecated;
        patch_parameters(&mut self.parameters, &other.parameters);
        self.request_body.patch(&other.request_body);
        self.responses.patch(&other.responses);
        match (&mut self.security, &other.security) {
            (Some(base), Some(other)) => patch_list(base, other),
            (None, Some(other)) => self.security = Some(other.clone()),
            _ => {}
        }
    }
}
