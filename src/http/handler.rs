use crate::error::RequestError;
use crate::http::ServicePath;
use crate::http::body::RequestBody;
use crate::http::decode::decode_body;
use crate::http::event::{Action, EventEmitter, EventRequest, EventResponse, EventUrl};
use crate::http::metrics::{Labels, Metrics};
use crate::http::security::{Credentials, verify};
use crate::http::sniff::sniff;
use crate::http::store::{
    EventStore, HttpLog, HttpParameter, HttpRequestLog, HttpResponseLog, Traits, preview,
};
use crate::openapi::Config;
use crate::openapi::media_type::{ContentType, MediaType};
use crate::openapi::operation::Operation;
use crate::openapi::path::PathItem;
use crate::openapi::request_body::RequestBody as RequestBodySpec;
use crate::openapi::response::Response as ResponseSpec;
use crate::parameter::{
    ParameterSource, RequestParameters, match_template, parse_parameters, strip_base_path,
};
use crate::schema::DataGenerator;
use crate::schema::marshal::{marshal, marshal_media};
use crate::DEFAULT_CONTENT_TYPE;
use bytes::Bytes;
use http::header::{ACCEPT, ALLOW, CONTENT_TYPE, HOST};
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const EVENT_NAME: &str = "http";

/// Serves requests for one API from a snapshot of its configuration.
///
/// The snapshot is swapped wholesale by [`Handler::apply_config`]; a
/// request keeps the snapshot it started with.
pub struct Handler {
    name: String,
    config: RwLock<Arc<Config>>,
    base_path: Option<String>,
    emitter: Arc<dyn EventEmitter>,
    metrics: Arc<dyn Metrics>,
    store: Arc<dyn EventStore>,
    generator: Arc<dyn DataGenerator>,
    free_form: bool,
    event_timeout: Option<Duration>,
}

/// Everything the builder hands over.
pub(crate) struct HandlerParts {
    pub name: String,
    pub config: Arc<Config>,
    pub base_path: Option<String>,
    pub emitter: Arc<dyn EventEmitter>,
    pub metrics: Arc<dyn Metrics>,
    pub store: Arc<dyn EventStore>,
    pub generator: Arc<dyn DataGenerator>,
    pub free_form: bool,
    pub event_timeout: Option<Duration>,
}

struct Matched {
    template: String,
    item: Arc<PathItem>,
    parameters: RequestParameters,
}

impl Matched {
    fn operation(&self, method: &Method) -> Result<&Operation, RequestError> {
        self.item.operation(method).ok_or_else(|| {
            RequestError::internal(format!("operation {} of '{}' vanished", method, self.template))
        })
    }
}

/// The response chosen for a status, with the content entry to write.
struct Selected<'r> {
    response: &'r ResponseSpec,
    media: Option<(ContentType, &'r MediaType)>,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("base_path", &self.base_path)
            .field("free_form", &self.free_form)
            .field("event_timeout", &self.event_timeout)
            .finish_non_exhaustive()
    }
}

impl Handler {
    pub(crate) fn from_parts(parts: HandlerParts) -> Self {
        Handler {
            name: parts.name,
            config: RwLock::new(parts.config),
            base_path: parts.base_path,
            emitter: parts.emitter,
            metrics: parts.metrics,
            store: parts.store,
            generator: parts.generator,
            free_form: parts.free_form,
            event_timeout: parts.event_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current snapshot.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read())
    }

    /// Publishes a new snapshot. In-flight requests finish on the old one.
    /// The write lock covers only the pointer store; the replaced snapshot
    /// is released after the lock.
    pub fn apply_config(&self, config: impl Into<Arc<Config>>) {
        let config = config.into();
        let previous = std::mem::replace(&mut *self.config.write(), config);
        drop(previous);
    }

    /// The base path requests are matched under when no [`ServicePath`]
    /// extension says otherwise.
    pub fn base_path(&self) -> String {
        self.base_path
            .clone()
            .unwrap_or_else(|| self.config().base_path())
    }

    /// Whether a path template of the current snapshot matches `path`
    /// once `base_path` is stripped from it.
    pub fn routes(&self, path: &str, base_path: &str) -> bool {
        let Some(path) = strip_base_path(path, base_path).map(trim_trailing_slash) else {
            return false;
        };
        let segments = path.split('/').count();
        self.config().paths.iter().any(|(template, _)| {
            let template = trim_trailing_slash(template);
            template.split('/').count() == segments && match_template(template, path).is_some()
        })
    }

    pub async fn serve<B: RequestBody>(&self, request: Request<B>) -> Response<Bytes> {
        let started = Instant::now();
        let config = self.config();
        let (parts, body) = request.into_parts();
        let mut log = HttpLog {
            request: HttpRequestLog {
                method: parts.method.to_string(),
                url: parts.uri.to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        // requests matching no template share the empty path label
        let mut labels = Labels::new(&self.name, "");

        let response = match self.handle(&config, &parts, body, &mut log, &mut labels).await {
            Ok(response) => {
                self.metrics.request(&labels);
                response
            }
            Err(err) => {
                if err.status.is_server_error() {
                    log::error!("{} {}: {}", parts.method, parts.uri, err.message);
                } else {
                    log::info!("{} {}: {}", parts.method, parts.uri, err.message);
                }
                self.metrics.request_error(&labels);
                error_response(&err)
            }
        };

        log.response = HttpResponseLog {
            status_code: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect(),
            body: preview(response.body()),
            size: response.body().len(),
        };
        log.duration = started.elapsed().as_millis() as u64;
        match serde_json::to_value(&log) {
            Ok(record) => {
                let traits = Traits::new()
                    .with_namespace(EVENT_NAME)
                    .with("name", &self.name)
                    .with("path", &labels.path);
                self.store.push_event(record, &traits);
            }
            Err(e) => log::warn!("encode request log failed: {}", e),
        }
        response
    }

    async fn handle<B: RequestBody>(
        &self,
        config: &Config,
        parts: &Parts,
        body: B,
        log: &mut HttpLog,
        labels: &mut Labels,
    ) -> Result<Response<Bytes>, RequestError> {
        let base_path = match parts.extensions.get::<ServicePath>() {
            Some(ServicePath(path)) => path.clone(),
            None => self.base_path(),
        };
        let path = strip_base_path(parts.uri.path(), &base_path)
            .map(trim_trailing_slash)
            .ok_or_else(|| not_found(parts))?;
        let matched = route(config, parts, path)?;
        labels.path = matched.template.clone();
        let operation = matched.operation(&parts.method)?;
        log.deprecated = operation.deprecated;
        log.request.parameters = log_parameters(&matched.parameters);
        log::debug!(
            "{} {} matched operation '{} {}'",
            parts.method,
            parts.uri,
            parts.method,
            matched.template
        );

        let requirements = operation
            .security
            .as_deref()
            .unwrap_or(config.security.as_slice());
        let credentials = Credentials {
            headers: &parts.headers,
            query: parts.uri.query(),
        };
        verify(requirements, &config.components, &credentials)?;

        let (status, success) = operation.responses.success().ok_or_else(|| {
            RequestError::internal("no success response (HTTP 2xx) in configuration")
        })?;
        let accept = header_str(&parts.headers, &ACCEPT);
        let selected = negotiate(&success, accept)?;

        let request_body = match operation.request_body() {
            Some(spec) => self.read_body(&spec, &parts.headers, body, log).await?,
            None => None,
        };

        let event_request = event_request(parts, &matched, operation, request_body);
        let mut event_response = EventResponse {
            status_code: status,
            ..Default::default()
        };
        self.synthesize(&selected, &mut event_response);

        log.actions = self.emit(&event_request, &mut event_response).await;

        let reselected;
        let selected = if event_response.status_code == status {
            selected
        } else {
            reselected = operation
                .responses
                .get(event_response.status_code)
                .ok_or_else(|| {
                    RequestError::internal(format!(
                        "no configuration was found for HTTP status code {}",
                        event_response.status_code
                    ))
                })?;
            let media = match event_response.header(CONTENT_TYPE.as_str()) {
                Some(ct) => {
                    let ct = ContentType::parse(ct);
                    reselected.content.get(&ct).map(|m| (ct, m))
                }
                None => negotiate(&reselected, accept).ok().and_then(|s| s.media),
            };
            Selected {
                response: &reselected,
                media,
            }
        };
        write_response(selected, event_response)
    }

    async fn read_body<B: RequestBody>(
        &self,
        spec: &RequestBodySpec,
        headers: &HeaderMap,
        body: B,
        log: &mut HttpLog,
    ) -> Result<Option<Value>, RequestError> {
        let content_type = header_str(headers, &CONTENT_TYPE);
        let bytes = body.to_bytes().await.map_err(|e| {
            RequestError::internal(format!(
                "read request body '{}' failed: {}",
                content_type, e
            ))
        })?;
        log.request.content_type = content_type.to_owned();
        log.request.body = preview(&bytes);
        if bytes.is_empty() {
            if spec.required {
                return Err(RequestError::bad_request("request body is required"));
            }
            return Ok(None);
        }
        if !content_type.is_empty() {
            let ct = ContentType::parse(content_type);
            let Some(media) = spec.content.get(&ct) else {
                return Err(RequestError::new(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    format!("content type '{}' of request body is not specified", ct),
                ));
            };
            return decode_body(&bytes, &ct, media, self.free_form).map(Some);
        }
        let mut last_error = None;
        for media in spec.content.iter() {
            match decode_body(&bytes, &media.content_type, media, self.free_form) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => last_error = Some(e),
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Fills headers and data of the selected response before handlers
    /// see it.
    fn synthesize(&self, selected: &Selected<'_>, response: &mut EventResponse) {
        for (name, header) in &selected.response.headers {
            let Some(header) = header.value() else {
                continue;
            };
            let parameter = header.to_parameter(name);
            let value = parameter
                .sample()
                .or_else(|| parameter.schema().map(|s| self.generator.generate(&s)));
            if let Some(text) = value.as_ref().and_then(header_text) {
                response.set_header(name, text);
            }
        }
        let Some((content_type, media)) = &selected.media else {
            return;
        };
        response.set_header(CONTENT_TYPE.as_str(), content_type.to_string());
        let schema = media.schema.as_ref().and_then(|s| s.value());
        response.data = media
            .sample()
            .or_else(|| schema.as_ref().and_then(|s| s.example.clone()))
            .or_else(|| schema.as_ref().map(|s| self.generator.generate(s)));
    }

    async fn emit(&self, request: &EventRequest, response: &mut EventResponse) -> Vec<Action> {
        let emit = self.emitter.emit(EVENT_NAME, request, response);
        let Some(limit) = self.event_timeout else {
            return emit.await;
        };
        match tokio::time::timeout(limit, emit).await {
            Ok(actions) => actions,
            Err(_) => {
                log::warn!(
                    "event handlers for '{} {}' did not finish within {:?}",
                    request.method,
                    request.key,
                    limit
                );
                Vec::new()
            }
        }
    }
}

fn not_found(parts: &Parts) -> RequestError {
    RequestError::new(
        StatusCode::NOT_FOUND,
        format!("no matching endpoint found: {} {}", parts.method, parts.uri),
    )
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

fn literal_segments(template: &str) -> usize {
    template.split('/').filter(|s| !s.contains('{')).count()
}

/// Finds the operation for a request path. Templates with more literal
/// segments are tried first; a candidate whose parameters fail to parse
/// gives way to the next one.
fn route(config: &Config, parts: &Parts, path: &str) -> Result<Matched, RequestError> {
    let segments = path.split('/').count();
    let mut candidates: Vec<(&String, Arc<PathItem>)> = config
        .paths
        .iter()
        .filter(|(template, _)| {
            let template = trim_trailing_slash(template);
            template.split('/').count() == segments && match_template(template, path).is_some()
        })
        .filter_map(|(template, item)| item.value().map(|item| (template, item)))
        .collect();
    candidates.sort_by_key(|(template, _)| std::cmp::Reverse(literal_segments(template)));

    let mut allowed: Vec<String> = Vec::new();
    let mut failure = None;
    for (template, item) in candidates {
        let Some(operation) = item.operation(&parts.method) else {
            allowed.extend(item.allowed_methods());
            continue;
        };
        let parameters = operation.merged_parameters(&item.parameters);
        let source = ParameterSource {
            path,
            query: parts.uri.query(),
            headers: &parts.headers,
        };
        match parse_parameters(&parameters, trim_trailing_slash(template), &source) {
            Ok(parameters) => {
                return Ok(Matched {
                    template: template.clone(),
                    item,
                    parameters,
                });
            }
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    if !allowed.is_empty() {
        allowed.dedup();
        let mut err = RequestError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method {} is not allowed for {}", parts.method, parts.uri),
        );
        if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
            err = err.with_header(ALLOW, value);
        }
        return Err(err);
    }
    Err(not_found(parts))
}

fn negotiate<'r>(response: &'r ResponseSpec, accept: &str) -> Result<Selected<'r>, RequestError> {
    if response.content.is_empty() {
        return Ok(Selected {
            response,
            media: None,
        });
    }
    let negotiated = response.content.negotiate(accept).ok_or_else(|| {
        RequestError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("none of requests content type(s) are supported: {}", accept),
        )
    })?;
    Ok(Selected {
        response,
        media: Some((negotiated.content_type, negotiated.media_type)),
    })
}

fn header_str<'h>(headers: &'h HeaderMap, name: &HeaderName) -> &'h str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim()
}

/// Renders a synthesized header value the way `simple` style does.
fn header_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(header_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(map) => Some(
            map.iter()
                .filter_map(|(k, v)| header_text(v).map(|v| format!("{},{}", k, v)))
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

fn event_request(
    parts: &Parts,
    matched: &Matched,
    operation: &Operation,
    body: Option<Value>,
) -> EventRequest {
    let values = |map: &IndexMap<String, crate::parameter::RequestParameter>| {
        map.iter()
            .map(|(k, p)| (k.clone(), p.value.clone()))
            .collect::<IndexMap<_, _>>()
    };
    let host = parts
        .uri
        .authority()
        .map(|a| a.to_string())
        .unwrap_or_else(|| header_str(&parts.headers, &HOST).to_owned());
    EventRequest {
        key: matched.template.clone(),
        operation_id: operation.operation_id.clone(),
        method: parts.method.to_string(),
        url: EventUrl {
            scheme: parts.uri.scheme_str().unwrap_or("http").to_owned(),
            host,
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
        },
        path: values(&matched.parameters.path),
        query: values(&matched.parameters.query),
        header: values(&matched.parameters.header),
        cookie: values(&matched.parameters.cookie),
        query_string: matched.parameters.query_string.as_ref().map(|p| p.value.clone()),
        body,
    }
}

fn log_parameters(parameters: &RequestParameters) -> Vec<HttpParameter> {
    parameters
        .iter()
        .map(|(location, name, parameter)| HttpParameter {
            name: name.to_owned(),
            location: location.to_string(),
            value: serde_json::to_string(&parameter.value).unwrap_or_default(),
            raw: parameter.raw.clone(),
        })
        .collect()
}

fn write_response(
    selected: Selected<'_>,
    mut response: EventResponse,
) -> Result<Response<Bytes>, RequestError> {
    let status = StatusCode::from_u16(response.status_code).map_err(|_| {
        RequestError::internal(format!("invalid status code {}", response.status_code))
    })?;
    let declared = response.header(CONTENT_TYPE.as_str()).map(ContentType::parse);

    let body = if let Some(body) = response.body.take() {
        Bytes::from(body)
    } else if let Some(bytes) = response.bytes.take() {
        if declared.as_ref().is_none_or(ContentType::is_wildcard) {
            response.set_header(CONTENT_TYPE.as_str(), sniff(&bytes));
        }
        Bytes::from(bytes)
    } else if let Some(data) = response
        .data
        .take()
        .filter(|_| !selected.response.content.is_empty())
    {
        let encoded = match (&declared, &selected.media) {
            (Some(ct), Some((_, media))) if !ct.is_wildcard() => marshal_media(&data, ct, media),
            (Some(ct), None) if !ct.is_wildcard() => marshal(&data, None, ct, &IndexMap::new()),
            _ => {
                let json = ContentType::parse(DEFAULT_CONTENT_TYPE);
                response.set_header(CONTENT_TYPE.as_str(), DEFAULT_CONTENT_TYPE);
                let schema = selected.media.as_ref().and_then(|(_, m)| m.schema.as_ref());
                marshal(&data, schema, &json, &IndexMap::new())
            }
        };
        Bytes::from(encoded.map_err(|e| {
            RequestError::internal(format!("encode response body failed: {}", e))
        })?)
    } else {
        Bytes::new()
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => log::warn!("skipping invalid response header '{}'", name),
        }
    }
    builder
        .body(body)
        .map_err(|e| RequestError::internal(format!("build response failed: {}", e)))
}

/// Renders a failure as a plain text response.
pub fn error_response(err: &RequestError) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(err.message.clone()));
    *response.status_mut() = err.status;
    let headers = response.headers_mut();
    headers.extend(err.headers.clone());
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::HandlerBuilder;
    use crate::http::metrics::{Counter, HttpMetrics};
    use crate::http::store::MemoryEventStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn petstore() -> String {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Petstore", "version": "1.0"},
            "servers": [{"url": "http://localhost/v1"}],
            "paths": {
                "/pet/{petId}": {
                    "get": {
                        "operationId": "getPet",
                        "parameters": [{"name": "petId", "in": "path", "required": true,
                            "schema": {"type": "integer", "format": "int64"}}],
                        "responses": {"200": {"description": "ok", "content": {
                            "application/json": {"example": {"id": 1, "name": "Rex"}},
                            "text/plain": {"example": "Rex"}
                        }}}
                    },
                    "delete": {
                        "security": [{"bearer": []}],
                        "responses": {"204": {"description": "deleted"}}
                    }
                },
                "/pet/findByStatus": {
                    "get": {
                        "deprecated": true,
                        "parameters": [{"name": "status", "in": "query",
                            "schema": {"type": "string", "default": "available"}}],
                        "responses": {
                            "200": {"description": "ok", "content": {"application/json": {
                                "schema": {"type": "array", "items": {"type": "string"}},
                                "example": ["Rex"]
                            }}},
                            "404": {"description": "gone", "content": {"application/json": {
                                "example": {"message": "not found"}
                            }}}
                        }
                    }
                },
                "/pet": {
                    "post": {
                        "requestBody": {"required": true, "content": {"application/json": {
                            "schema": {"type": "object", "required": ["name"],
                                "properties": {"name": {"type": "string"}}}
                        }}},
                        "responses": {"201": {"description": "created",
                            "headers": {"X-Rate-Limit": {"schema": {"type": "integer"}, "example": 10}},
                            "content": {"application/json": {"example": {"id": 7}}}}}
                    }
                }
            },
            "components": {"securitySchemes": {"bearer": {"type": "http", "scheme": "bearer"}}}
        })
        .to_string()
    }

    fn builder() -> HandlerBuilder {
        HandlerBuilder::new().load_from_bytes("file:///petstore.json", petstore())
    }

    fn get(uri: &str) -> Request<()> {
        Request::get(uri).body(()).unwrap()
    }

    #[tokio::test]
    async fn test_accept_negotiation() {
        let handler = builder().build().unwrap();
        let request = Request::get("http://localhost/v1/pet/42")
            .header(ACCEPT, "text/plain,application/json")
            .body(())
            .unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.body().as_ref(), b"Rex");

        let response = handler.serve(get("http://localhost/v1/pet/42")).await;
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"id": 1, "name": "Rex"}));

        let request = Request::get("/v1/pet/42")
            .header(ACCEPT, "application/xml")
            .body(())
            .unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(
            response.body().as_ref(),
            b"none of requests content type(s) are supported: application/xml"
        );
    }

    #[tokio::test]
    async fn test_routing() {
        let handler = builder().build().unwrap();
        let response = handler.serve(get("/v1/pet/findByStatus")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), br#"["Rex"]"#);

        let response = handler.serve(get("/v1/pet/abc")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            String::from_utf8_lossy(response.body())
                .starts_with("parse path parameter 'petId' failed: ")
        );

        let response = handler.serve(get("/v1/store/order")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.body().as_ref(),
            b"no matching endpoint found: GET /v1/store/order"
        );
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");

        let request = Request::put("/v1/pet/42").body(()).unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key(ALLOW));

        let request = Request::get("/pet/42")
            .extension(ServicePath(String::new()))
            .body(())
            .unwrap();
        assert_eq!(handler.serve(request).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unmatched_requests_share_labels() {
        let metrics = Arc::new(HttpMetrics::new());
        let store = Arc::new(MemoryEventStore::new());
        let handler = builder()
            .metrics(metrics.clone())
            .store(store.clone())
            .build()
            .unwrap();
        for path in ["/v1/random/1", "/v1/random/2", "/elsewhere"] {
            let response = handler.serve(get(path)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
        let labels = Labels::new("Petstore", "");
        assert_eq!(metrics.counter(Counter::RequestError, &labels), 3);
        assert_eq!(
            metrics.counter(Counter::RequestError, &Labels::new("Petstore", "/v1/random/1")),
            0
        );
        let events = store.events(EVENT_NAME);
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|(traits, _)| traits.get("path") == Some("")));
    }

    #[tokio::test]
    async fn test_security_and_empty_response() {
        let handler = builder().build().unwrap();
        let request = Request::delete("/v1/pet/42").body(()).unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = Request::delete("/v1/pet/42")
            .header(http::header::AUTHORIZATION, "Bearer token")
            .body(())
            .unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn test_request_body() {
        let handler = builder().build().unwrap();
        let request = Request::post("/v1/pet")
            .header(CONTENT_TYPE, "application/json")
            .body(r#"{"name": "Rex"}"#)
            .unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-rate-limit"], "10");

        let request = Request::post("/v1/pet").body(()).unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body().as_ref(), b"request body is required");

        let request = Request::post("/v1/pet")
            .header(CONTENT_TYPE, "text/csv")
            .body("a,b")
            .unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let request = Request::post("/v1/pet").body(r#"{"name": 1}"#).unwrap();
        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    struct NotFoundEmitter;

    #[async_trait]
    impl EventEmitter for NotFoundEmitter {
        async fn emit(
            &self,
            event: &str,
            request: &EventRequest,
            response: &mut EventResponse,
        ) -> Vec<Action> {
            if request.query.get("status") == Some(&json!("sold")) {
                response.status_code = 404;
                response.data = Some(json!({"message": "sold out"}));
            } else if request.query.get("status") == Some(&json!("missing")) {
                response.status_code = 418;
            }
            vec![Action {
                event: event.to_owned(),
                name: "status".to_owned(),
                ..Default::default()
            }]
        }
    }

    #[tokio::test]
    async fn test_emitter_changes_status() {
        let store = Arc::new(MemoryEventStore::new());
        let metrics = Arc::new(HttpMetrics::new());
        let handler = builder()
            .emitter(Arc::new(NotFoundEmitter))
            .store(store.clone())
            .metrics(metrics.clone())
            .build()
            .unwrap();

        let response = handler.serve(get("/v1/pet/findByStatus?status=sold")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"message": "sold out"}));

        let response = handler.serve(get("/v1/pet/findByStatus?status=missing")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.body().as_ref(),
            b"no configuration was found for HTTP status code 418"
        );

        let labels = Labels::new("Petstore", "/pet/findByStatus");
        assert_eq!(metrics.counter(Counter::Request, &labels), 1);
        assert_eq!(metrics.counter(Counter::RequestError, &labels), 1);

        let events = store.events(EVENT_NAME);
        assert_eq!(events.len(), 2);
        let (traits, record) = &events[0];
        assert_eq!(traits.get("name"), Some("Petstore"));
        assert_eq!(traits.get("path"), Some("/pet/findByStatus"));
        assert_eq!(record["deprecated"], json!(true));
        assert_eq!(record["response"]["statusCode"], json!(404));
        assert_eq!(record["actions"][0]["name"], json!("status"));
        assert_eq!(
            record["request"]["parameters"][0],
            json!({"name": "status", "type": "query", "value": "\"sold\"", "raw": "sold"})
        );
    }

    #[tokio::test]
    async fn test_apply_config() {
        let handler = builder().build().unwrap();
        let mut config = Config::decode_document(
            "petstore.json",
            json!({
                "openapi": "3.0.3",
                "info": {"title": "Petstore", "version": "2.0"},
                "paths": {"/ping": {"get": {"responses": {"200": {"description": "ok"}}}}}
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        config
            .parse(
                &url::Url::parse("file:///petstore.json").unwrap(),
                &crate::openapi::reference::MemoryReader::new(),
            )
            .unwrap();
        let before = handler.config();
        handler.apply_config(config);
        assert_eq!(before.info.version, "1.0");
        assert_eq!(handler.config().info.version, "2.0");
        let response = handler
            .serve(Request::get("/ping").extension(ServicePath(String::new())).body(()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
