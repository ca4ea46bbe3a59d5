use crate::codec::{Decode, DecodeError, Node};
use crate::error::SpecError;
use crate::openapi::patch::{Patch, patch_scalar, patch_string};
use crate::openapi::reference::{Ref, Resolve, Resolver};
use crate::{DESCRIPTION_FIELD, SUMMARY_FIELD};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Example {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_value: Option<String>,
}

impl Decode for Example {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Example {
            summary: node.get_as_str(SUMMARY_FIELD)?,
            description: node.get_as_str(DESCRIPTION_FIELD)?,
            value: node.get_raw("value"),
            external_value: node.get_as_str("externalValue")?,
        })
    }
}

impl Resolve for Example {
    fn resolve(&mut self, _resolver: &mut Resolver<'_>) -> Result<(), SpecError> {
        Ok(())
    }
}

impl Patch for Example {
    fn patch(&mut self, other: &Self) {
        patch_string(&mut self.summary, &other.summary);
        patch_string(&mut self.description, &other.description);
        patch_scalar(&mut self.value, &other.value);
        patch_string(&mut self.external_value, &other.external_value);
    }
}

/// `example` wins; otherwise the first entry of `examples` that carries a
/// value.
pub(crate) fn select_example(
    example: Option<&Value>,
    examples: &IndexMap<String, Ref<Example>>,
) -> Option<Value> {
    if let Some(example) = example {
        return Some(example.clone());
    }
    examples
        .values()
        .filter_map(|e| e.value())
        .find_map(|e| e.value.clone())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_example() {
        let mut examples = IndexMap::new();
        examples.insert("empty".to_string(), Ref::new(Example::default()));
        examples.insert(
            "first".to_string(),
            Ref::new(Example {
                value: Some(json!({"id": 1})),
                ..Default::default()
            }),
        );
        assert_eq!(select_example(None, &examples), Some(json!({"id": 1})));
        assert_eq!(select_example(Some(&json!(2)), &examples), Some(json!(2)));
        assert_eq!(select_example(None, &IndexMap::new()), None);
    }
}
