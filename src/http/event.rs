//! The request/response pair handed to the scripting layer.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventUrl {
    pub scheme: String,
    pub host: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// The matched request as scripts see it. Only declared parameters are
/// included, not every header of the request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    /// The matched path template.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub method: String,
    pub url: EventUrl,
    pub path: IndexMap<String, Value>,
    pub query: IndexMap<String, Value>,
    pub header: IndexMap<String, Value>,
    pub cookie: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// The response under construction. Handlers may change any field.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub status_code: u16,
    pub headers: IndexMap<String, String>,
    /// Written as is when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Marshalled through the response media type when `body` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Raw payload; its type is sniffed when the media type is a wildcard.
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
}

impl EventResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any value under a differently cased name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_owned(), value.into());
    }
}

/// What one event handler did, as recorded in the request log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Action {
    pub event: String,
    pub name: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub tags: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The scripting boundary. Implementations run every handler registered
/// for `event` and may change `response`.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(
        &self,
        event: &str,
        request: &EventRequest,
        response: &mut EventResponse,
    ) -> Vec<Action>;
}

/// Emitter without handlers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

#[async_trait]
impl EventEmitter for NoopEmitter {
    async fn emit(&self, _: &str, _: &EventRequest, _: &mut EventResponse) -> Vec<Action> {
        Vec::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_header_replaces_case_insensitive() {
        let mut response = EventResponse::default();
        response.set_header("Content-Type", "application/json");
        response.set_header("content-type", "text/plain");
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/plain"));
    }
}
