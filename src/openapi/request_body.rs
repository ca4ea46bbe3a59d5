use crate::codec::{Decode, DecodeError, Node};
use crate::error::SpecError;
use crate::openapi::media_type::Content;
use crate::openapi::patch::{Patch, patch_string};
use crate::openapi::reference::{Resolve, Resolver};
use crate::{CONTENT_FIELD, DESCRIPTION_FIELD, REQUIRED_FIELD};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    pub content: Content,
}

impl Decode for RequestBody {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(RequestBody {
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            required: node.get_as_bool(REQUIRED_FIELD)?.unwrap_or(false),
            content: node.decode_or_default(CONTENT_FIELD)?,
        })
    }
}

impl Resolve for RequestBody {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        self.content.resolve(resolver)
    }
}

impl Patch for RequestBody {
    fn patch(&mut self, other: &Self) {
        patch_string(&mut self.description, &other.description);
        self.required = other.required;
        self.content.patch(&other.content);
    }
}
