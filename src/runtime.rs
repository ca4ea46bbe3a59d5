//! Registry of the mocked APIs. Documents are stored per URL and grouped
//! into one service per API title.

use crate::error::{RequestError, SpecError};
use crate::http::ServicePath;
use crate::http::body::RequestBody;
use crate::http::builder::{BuilderError, HandlerBuilder};
use crate::http::event::{EventEmitter, NoopEmitter};
use crate::http::handler::{Handler, error_response};
use crate::http::metrics::{Metrics, NoopMetrics};
use crate::http::store::{EventStore, NoopEventStore};
use crate::openapi::Config;
use crate::openapi::patch::Patch;
use crate::openapi::reference::{FileReader, Reader};
use crate::parameter::strip_base_path;
use crate::schema::{DataGenerator, RandomGenerator};
use bytes::Bytes;
use dashmap::DashMap;
use http::{Request, Response, StatusCode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid document url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("document '{0}' not found")]
    DocumentNotFound(String),
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}

/// A decoded, not yet parsed document.
struct Document {
    title: String,
    config: Config,
}

/// Serves every API known to it. Services are keyed by `info.title`; all
/// documents sharing a title are patched together in URL order.
pub struct Runtime {
    documents: DashMap<String, Document>,
    services: DashMap<String, Arc<Handler>>,
    reader: Arc<dyn Reader>,
    emitter: Arc<dyn EventEmitter>,
    metrics: Arc<dyn Metrics>,
    store: Arc<dyn EventStore>,
    generator: Arc<dyn DataGenerator>,
    free_form: bool,
    event_timeout: Option<Duration>,
    // serializes rebuilds so two updates of one title cannot interleave
    update: Mutex<()>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            documents: DashMap::new(),
            services: DashMap::new(),
            reader: Arc::new(FileReader),
            emitter: Arc::new(NoopEmitter),
            metrics: Arc::new(NoopMetrics),
            store: Arc::new(NoopEventStore),
            generator: Arc::new(RandomGenerator::new()),
            free_form: true,
            event_timeout: None,
            update: Mutex::new(()),
        }
    }

    pub fn reader(mut self, reader: Arc<dyn Reader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = store;
        self
    }

    pub fn generator(mut self, generator: Arc<dyn DataGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn free_form(mut self, free_form: bool) -> Self {
        self.free_form = free_form;
        self
    }

    pub fn event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = Some(timeout);
        self
    }

    /// Stores a document and republishes the service of its API. A document
    /// that fails to parse is dropped again and the running service is left
    /// untouched.
    pub fn add_document(&self, url: &str, bytes: &[u8]) -> Result<Arc<Handler>, RuntimeError> {
        let parsed = parse_url(url)?;
        let config = Config::decode_document(parsed.path(), bytes)
            .map_err(|e| e.context(format!("decode '{}'", url)))?;
        let title = config.info.title.clone();
        if title.is_empty() {
            return Err(SpecError::invalid(format!("document '{}' has no info.title", url)).into());
        }

        let _guard = self.update.lock();
        let previous = self.documents.insert(
            parsed.to_string(),
            Document {
                title: title.clone(),
                config,
            },
        );
        match self.rebuild(&title) {
            Ok(Some(handler)) => {
                log::info!("document '{}' applied to service '{}'", url, title);
                if let Some(previous) = previous.filter(|p| p.title != title) {
                    self.rebuild(&previous.title)?;
                }
                Ok(handler)
            }
            Ok(None) => Err(RuntimeError::DocumentNotFound(url.to_owned())),
            Err(e) => {
                match previous {
                    Some(previous) => {
                        self.documents.insert(parsed.to_string(), previous);
                    }
                    None => {
                        self.documents.remove(parsed.as_str());
                    }
                }
                Err(e)
            }
        }
    }

    /// Forgets a document. Its service is rebuilt from the remaining
    /// documents, or removed when none is left.
    pub fn remove_document(&self, url: &str) -> Result<(), RuntimeError> {
        let parsed = parse_url(url)?;
        let _guard = self.update.lock();
        let (_, document) = self
            .documents
            .remove(parsed.as_str())
            .ok_or_else(|| RuntimeError::DocumentNotFound(url.to_owned()))?;
        self.rebuild(&document.title)?;
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<Arc<Handler>> {
        self.services.get(name).map(|h| Arc::clone(h.value()))
    }

    /// Service names, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Dispatches to the service mounted under the longest base path that
    /// prefixes the request path. Between services sharing that base path,
    /// one with a matching path template wins.
    pub async fn serve<B: RequestBody>(&self, request: Request<B>) -> Response<Bytes> {
        let path = request.uri().path().to_owned();
        let mounted = request
            .extensions()
            .get::<ServicePath>()
            .map(|ServicePath(p)| p.clone());
        match self.select(&path, mounted.as_deref()) {
            Some(handler) => handler.serve(request).await,
            None => {
                let err = RequestError::new(
                    StatusCode::NOT_FOUND,
                    format!("no matching endpoint found: {} {}", request.method(), request.uri()),
                );
                log::info!("{}", err.message);
                error_response(&err)
            }
        }
    }

    fn select(&self, path: &str, mounted: Option<&str>) -> Option<Arc<Handler>> {
        let mut candidates: Vec<(String, String, Arc<Handler>)> = self
            .services
            .iter()
            .filter_map(|entry| {
                let handler = Arc::clone(entry.value());
                let base = mounted.map(str::to_owned).unwrap_or_else(|| handler.base_path());
                strip_base_path(path, &base)?;
                Some((base, entry.key().clone(), handler))
            })
            .collect();
        candidates.sort_by(|(a, a_name, _), (b, b_name, _)| {
            b.trim_end_matches('/')
                .len()
                .cmp(&a.trim_end_matches('/').len())
                .then_with(|| a_name.cmp(b_name))
        });
        let longest = candidates.first()?.0.trim_end_matches('/').len();
        let fallback = Arc::clone(&candidates.first()?.2);
        candidates
            .into_iter()
            .take_while(|(base, _, _)| base.trim_end_matches('/').len() == longest)
            .find(|(base, _, handler)| handler.routes(path, base))
            .map(|(_, _, handler)| handler)
            .or(Some(fallback))
    }

    /// Patches every document of `title` in URL order, parses the result and
    /// publishes it. `None` when no document of that title is left.
    fn rebuild(&self, title: &str) -> Result<Option<Arc<Handler>>, RuntimeError> {
        let mut documents: Vec<(String, Config)> = self
            .documents
            .iter()
            .filter(|entry| entry.value().title == title)
            .map(|entry| (entry.key().clone(), entry.value().config.clone()))
            .collect();
        if documents.is_empty() {
            if self.services.remove(title).is_some() {
                log::info!("service '{}' removed", title);
            }
            return Ok(None);
        }
        documents.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut documents = documents.into_iter();
        let Some((url, mut config)) = documents.next() else {
            return Ok(None);
        };
        for (_, other) in documents {
            config.patch(&other);
        }
        let url = parse_url(&url)?;
        config
            .parse(&url, self.reader.as_ref())
            .map_err(|e| e.context(format!("parse service '{}'", title)))?;

        if let Some(handler) = self.service(title) {
            handler.apply_config(config);
            return Ok(Some(handler));
        }
        let mut builder = HandlerBuilder::new()
            .config(config)
            .name(title)
            .emitter(Arc::clone(&self.emitter))
            .metrics(Arc::clone(&self.metrics))
            .store(Arc::clone(&self.store))
            .generator(Arc::clone(&self.generator))
            .free_form(self.free_form);
        if let Some(timeout) = self.event_timeout {
            builder = builder.event_timeout(timeout);
        }
        let handler = Arc::new(builder.build()?);
        self.services.insert(title.to_owned(), Arc::clone(&handler));
        log::info!("service '{}' created", title);
        Ok(Some(handler))
    }
}

fn parse_url(url: &str) -> Result<Url, RuntimeError> {
    Url::parse(url).map_err(|e| RuntimeError::InvalidUrl {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::http::metrics::{Counter, HttpMetrics, Labels};
    use crate::openapi::reference::MemoryReader;
    use serde_json::{Value, json};

    const PETS: &str = r#"
openapi: 3.0.3
info:
  title: Petstore
  version: "1.0"
servers:
  - url: http://localhost/v1
paths:
  /pets:
    get:
      responses:
        '200':
          description: ok
          content:
            application/json:
              example: [{"name": "Rex"}]
"#;

    const PETS_PATCH: &str = r#"
openapi: 3.0.3
info:
  title: Petstore
  version: "1.1"
paths:
  /pets/{id}:
    get:
      parameters:
        - $ref: 'common.yaml#/components/parameters/id'
      responses:
        '200':
          description: ok
          content:
            application/json:
              example: {"name": "Rex"}
"#;

    const COMMON: &str = r#"
components:
  parameters:
    id:
      name: id
      in: path
      required: true
      schema:
        type: integer
"#;

    const USERS: &str = r#"{
  "openapi": "3.1.0",
  "info": {"title": "Users", "version": "1"},
  "servers": [{"url": "http://localhost/v1/users"}],
  "paths": {"/": {"get": {"responses": {"204": {"description": "none"}}}}}
}"#;

    fn runtime() -> Runtime {
        let reader = MemoryReader::new().with("file:///mocks/common.yaml", COMMON);
        Runtime::new().reader(Arc::new(reader))
    }

    fn json_body(response: &Response<Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_add_and_patch_documents() {
        let runtime = runtime();
        let handler = runtime
            .add_document("file:///mocks/pets.yaml", PETS.as_bytes())
            .unwrap();
        assert_eq!(handler.name(), "Petstore");
        assert_eq!(runtime.len(), 1);

        let response = runtime.serve(Request::get("/v1/pets/7").body(()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let patched = runtime
            .add_document("file:///mocks/pets_patch.yaml", PETS_PATCH.as_bytes())
            .unwrap();
        assert!(Arc::ptr_eq(&handler, &patched));
        assert_eq!(handler.config().info.version, "1.1");
        assert_eq!(handler.config().servers.len(), 1);

        let response = runtime.serve(Request::get("/v1/pets/7").body(()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(&response), json!({"name": "Rex"}));

        let response = runtime.serve(Request::get("/v1/pets/x").body(()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_longest_base_path_wins() {
        let metrics = Arc::new(HttpMetrics::new());
        let runtime = runtime().metrics(metrics.clone());
        runtime.add_document("file:///mocks/pets.yaml", PETS.as_bytes()).unwrap();
        runtime.add_document("file:///mocks/users.json", USERS.as_bytes()).unwrap();
        assert_eq!(runtime.services(), vec!["Petstore", "Users"]);

        let response = runtime.serve(Request::get("/v1/users").body(()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = runtime.serve(Request::get("/v1/pets").body(()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(&response), json!([{"name": "Rex"}]));

        let response = runtime.serve(Request::get("/v2/pets").body(()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.body().as_ref(),
            b"no matching endpoint found: GET /v2/pets"
        );
        assert_eq!(
            metrics.counter(Counter::Request, &Labels::new("Users", "/")),
            1
        );
    }

    #[tokio::test]
    async fn test_mounted_service_path() {
        let runtime = runtime();
        runtime.add_document("file:///mocks/pets.yaml", PETS.as_bytes()).unwrap();
        let request = Request::get("/pets")
            .extension(ServicePath(String::new()))
            .body(())
            .unwrap();
        let response = runtime.serve(request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_remove_document() {
        let runtime = runtime();
        let handler = runtime.add_document("file:///mocks/pets.yaml", PETS.as_bytes()).unwrap();
        runtime
            .add_document("file:///mocks/pets_patch.yaml", PETS_PATCH.as_bytes())
            .unwrap();

        runtime.remove_document("file:///mocks/pets_patch.yaml").unwrap();
        assert_eq!(handler.config().info.version, "1.0");
        assert!(handler.config().paths.get("/pets/{id}").is_none());

        runtime.remove_document("file:///mocks/pets.yaml").unwrap();
        assert!(runtime.is_empty());
        assert!(matches!(
            runtime.remove_document("file:///mocks/pets.yaml"),
            Err(RuntimeError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_failed_document_keeps_service() {
        let runtime = Runtime::new();
        let handler = runtime.add_document("file:///mocks/pets.yaml", PETS.as_bytes()).unwrap();
        // the external reference cannot be read without the memory reader
        let err = runtime
            .add_document("file:///mocks/pets_patch.yaml", PETS_PATCH.as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("parse service 'Petstore'"), "{}", err);
        assert!(handler.config().paths.get("/pets/{id}").is_none());

        runtime.remove_document("file:///mocks/pets.yaml").unwrap();
        assert!(runtime.is_empty());
    }

    #[test]
    fn test_invalid_documents() {
        let runtime = Runtime::new();
        assert!(matches!(
            runtime.add_document("pets.yaml", PETS.as_bytes()),
            Err(RuntimeError::InvalidUrl { .. })
        ));
        let err = runtime
            .add_document("file:///mocks/a.json", br#"{"openapi": "3.0.0", "info": {}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("no info.title"), "{}", err);
        assert!(runtime.is_empty());
    }
}
