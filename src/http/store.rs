//! Per-request log records and the store they are pushed into.

use crate::http::event::Action;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Bodies longer than this are cut in log records.
pub const MAX_BODY_PREVIEW: usize = 10 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub location: String,
    /// JSON text of the parsed value.
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestLog {
    pub method: String,
    pub url: String,
    pub parameters: Vec<HttpParameter>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseLog {
    pub status_code: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
    pub size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpLog {
    pub request: HttpRequestLog,
    pub response: HttpResponseLog,
    /// Milliseconds from routing to the written response.
    pub duration: u64,
    pub deprecated: bool,
    pub actions: Vec<Action>,
}

/// Cuts a body to [`MAX_BODY_PREVIEW`] bytes on a char boundary.
pub fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_BODY_PREVIEW {
        return text.into_owned();
    }
    let mut end = MAX_BODY_PREVIEW;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Where a record belongs: a namespace plus free-form tags such as the
/// service name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Traits {
    pub namespace: String,
    pub tags: IndexMap<String, String>,
}

impl Traits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Receives request records. The store decides retention.
pub trait EventStore: Send + Sync {
    fn push_event(&self, record: Value, traits: &Traits);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventStore;

impl EventStore for NoopEventStore {
    fn push_event(&self, _: Value, _: &Traits) {}
}

/// Keeps every record in memory, oldest first.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<(Traits, Value)>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self, namespace: &str) -> Vec<(Traits, Value)> {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| t.namespace == namespace)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventStore for MemoryEventStore {
    fn push_event(&self, record: Value, traits: &Traits) {
        self.events.lock().push((traits.clone(), record));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_namespaces() {
        let store = MemoryEventStore::new();
        let http = Traits::new().with_namespace("http").with("name", "Petstore");
        store.push_event(json!({"a": 1}), &http);
        store.push_event(json!({"b": 2}), &Traits::new().with_namespace("ldap"));
        let events = store.events("http");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0.get("name"), Some("Petstore"));
        assert_eq!(events[0].1, json!({"a": 1}));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_log_serialization() {
        let log = HttpLog {
            request: HttpRequestLog {
                method: "GET".into(),
                url: "http://localhost/pet/42".into(),
                parameters: vec![HttpParameter {
                    name: "petId".into(),
                    location: "path".into(),
                    value: "42".into(),
                    raw: Some("42".into()),
                }],
                ..Default::default()
            },
            response: HttpResponseLog {
                status_code: 200,
                ..Default::default()
            },
            ..Default::default()
        };
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(
            value["request"]["parameters"][0],
            json!({"name": "petId", "type": "path", "value": "42", "raw": "42"})
        );
        assert_eq!(value["response"]["statusCode"], json!(200));
        assert!(value["request"].get("contentType").is_none());
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        let body = "é".repeat(MAX_BODY_PREVIEW);
        let cut = preview(body.as_bytes());
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= MAX_BODY_PREVIEW + 3);
    }
}
