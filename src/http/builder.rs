use crate::error::SpecError;
use crate::http::event::{EventEmitter, NoopEmitter};
use crate::http::handler::{Handler, HandlerParts};
use crate::http::metrics::{Metrics, NoopMetrics};
use crate::http::store::{EventStore, NoopEventStore};
use crate::openapi::Config;
use crate::openapi::reference::{FileReader, Reader};
use crate::schema::{DataGenerator, RandomGenerator};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("load failure: {0}")]
    LoadFailure(String),
    #[error("invalid specification: {0}")]
    InvalidSpecification(#[from] SpecError),
}

impl BuilderError {
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    pub fn load_failure(msg: impl Into<String>) -> Self {
        Self::LoadFailure(msg.into())
    }
}

enum SpecificationLoader {
    None,
    /// Already parsed; references are not resolved again.
    Config(Config),
    File(String),
    Bytes { url: String, bytes: Vec<u8> },
}

/// Assembles a [`Handler`] from a document and the adapters it reports
/// through. Every adapter defaults to a no-op.
pub struct HandlerBuilder {
    specification_loader: SpecificationLoader,
    reader: Arc<dyn Reader>,
    name: Option<String>,
    base_path: Option<String>,
    emitter: Arc<dyn EventEmitter>,
    metrics: Arc<dyn Metrics>,
    store: Arc<dyn EventStore>,
    generator: Arc<dyn DataGenerator>,
    free_form: bool,
    event_timeout: Option<Duration>,
}

impl Default for HandlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerBuilder {
    pub fn new() -> Self {
        Self {
            specification_loader: SpecificationLoader::None,
            reader: Arc::new(FileReader),
            name: None,
            base_path: None,
            emitter: Arc::new(NoopEmitter),
            metrics: Arc::new(NoopMetrics),
            store: Arc::new(NoopEventStore),
            generator: Arc::new(RandomGenerator::new()),
            free_form: true,
            event_timeout: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.specification_loader = SpecificationLoader::Config(config);
        self
    }

    pub fn load_from_file(mut self, path: impl Into<String>) -> Self {
        self.specification_loader = SpecificationLoader::File(path.into());
        self
    }

    /// Loads a document held in memory. `url` locates it for relative
    /// references and its extension selects JSON or YAML.
    pub fn load_from_bytes(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.specification_loader = SpecificationLoader::Bytes {
            url: url.into(),
            bytes: bytes.into(),
        };
        self
    }

    /// Where external references are read from.
    pub fn reader(mut self, reader: Arc<dyn Reader>) -> Self {
        self.reader = reader;
        self
    }

    /// Service name used in logs and metrics. Defaults to `info.title`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
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

    /// Whether objects without `additionalProperties` accept unknown
    /// properties in request bodies.
    pub fn free_form(mut self, free_form: bool) -> Self {
        self.free_form = free_form;
        self
    }

    /// Upper bound for event handlers; the response is written without
    /// their changes once it passes.
    pub fn event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Handler, BuilderError> {
        let config = match self.specification_loader {
            SpecificationLoader::None => {
                return Err(BuilderError::invalid_option(
                    "No specification loader provided.",
                ));
            }
            SpecificationLoader::Config(config) => config,
            SpecificationLoader::File(path) => Self::load_file_spec(&path, self.reader.as_ref())?,
            SpecificationLoader::Bytes { url, bytes } => {
                let url = Url::parse(&url)
                    .map_err(|e| BuilderError::invalid_option(format!("url '{}': {}", url, e)))?;
                Self::parse_spec(&url, &bytes, self.reader.as_ref())?
            }
        };
        if let Some(base_path) = &self.base_path {
            if !base_path.is_empty() && !base_path.starts_with('/') {
                return Err(BuilderError::invalid_option(format!(
                    "base path '{}' must start with '/'",
                    base_path
                )));
            }
        }
        let name = self.name.unwrap_or_else(|| config.info.title.clone());
        Ok(Handler::from_parts(HandlerParts {
            name,
            config: Arc::new(config),
            base_path: self.base_path.map(|p| p.trim_end_matches('/').to_owned()),
            emitter: self.emitter,
            metrics: self.metrics,
            store: self.store,
            generator: self.generator,
            free_form: self.free_form,
            event_timeout: self.event_timeout,
        }))
    }

    fn load_file_spec(path: &str, reader: &dyn Reader) -> Result<Config, BuilderError> {
        let absolute = std::fs::canonicalize(Path::new(path))
            .map_err(|e| BuilderError::load_failure(format!("{}: {}", path, e)))?;
        let bytes = std::fs::read(&absolute)
            .map_err(|e| BuilderError::load_failure(format!("{}: {}", path, e)))?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| BuilderError::load_failure(format!("{}: not an absolute path", path)))?;
        Self::parse_spec(&url, &bytes, reader)
    }

    fn parse_spec(url: &Url, bytes: &[u8], reader: &dyn Reader) -> Result<Config, BuilderError> {
        let mut config = Config::decode_document(url.path(), bytes)?;
        config.parse(url, reader)?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::openapi::reference::MemoryReader;

    const PETSTORE: &str = r#"
openapi: 3.0.3
info:
  title: Petstore
  version: "1.0"
servers:
  - url: http://localhost/v1
paths:
  /pet/{petId}:
    get:
      parameters:
        - $ref: 'common.yaml#/components/parameters/petId'
      responses:
        '200':
          description: ok
"#;

    const COMMON: &str = r#"
components:
  parameters:
    petId:
      name: petId
      in: path
      required: true
      schema:
        type: integer
"#;

    #[test]
    fn test_build_requires_a_loader() {
        let err = HandlerBuilder::new().build().err().unwrap();
        assert!(matches!(err, BuilderError::InvalidOption(_)));
    }

    #[test]
    fn test_build_from_bytes_with_external_reference() {
        let reader = MemoryReader::new().with("file:///specs/common.yaml", COMMON);
        let handler = HandlerBuilder::new()
            .load_from_bytes("file:///specs/petstore.yaml", PETSTORE)
            .reader(Arc::new(reader))
            .build()
            .unwrap();
        assert_eq!(handler.name(), "Petstore");
        assert_eq!(handler.base_path(), "/v1");
        let config = handler.config();
        let item = config.paths.get("/pet/{petId}").and_then(|r| r.value()).unwrap();
        let operation = item.operation(&http::Method::GET).unwrap();
        let parameters = operation.merged_parameters(&item.parameters);
        assert_eq!(parameters[0].name, "petId");
    }

    #[test]
    fn test_build_reports_missing_file() {
        let err = HandlerBuilder::new()
            .load_from_file("/definitely/not/here.yaml")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuilderError::LoadFailure(_)));
    }

    #[test]
    fn test_base_path_option() {
        let err = HandlerBuilder::new()
            .load_from_bytes("file:///petstore.yaml", PETSTORE)
            .base_path("api")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuilderError::InvalidOption(_)));

        let handler = HandlerBuilder::new()
            .load_from_bytes("file:///petstore.yaml", PETSTORE)
            .reader(Arc::new(MemoryReader::new().with("file:///common.yaml", COMMON)))
            .base_path("/api/")
            .name("pets")
            .build()
            .unwrap();
        assert_eq!(handler.base_path(), "/api");
        assert_eq!(handler.name(), "pets");
    }
}
