use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// A decode failure with its location inside the source document.
///
/// `offset` is a byte offset into the decoded bytes. For a value of the wrong
/// shape it points at the opening token of that value; for an invalid map key
/// it points at the key itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (offset {offset})")]
pub struct StructuralError {
    pub offset: usize,
    pub path: Vec<String>,
    pub message: String,
}

impl StructuralError {
    pub fn new(offset: usize, path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            offset,
            path,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceErrorKind {
    /// The reader returned no data for the referenced document.
    #[error("{0}")]
    Unresolved(String),

    #[error("path '{0}' not found")]
    NotFound(String),

    #[error("invalid reference format: {0}")]
    Format(String),

    #[error("cyclic reference chain")]
    Cycle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("resolve reference '{reference}' failed: {kind}")]
pub struct ReferenceError {
    pub reference: String,
    pub kind: ReferenceErrorKind,
}

impl ReferenceError {
    pub(crate) fn unresolved(reference: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            kind: ReferenceErrorKind::Unresolved(cause.into()),
        }
    }

    pub(crate) fn not_found(reference: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            kind: ReferenceErrorKind::NotFound(pointer.into()),
        }
    }

    pub(crate) fn format(reference: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            kind: ReferenceErrorKind::Format(cause.into()),
        }
    }

    pub(crate) fn cycle(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            kind: ReferenceErrorKind::Cycle,
        }
    }
}

/// Chained failure produced while parsing a specification.
///
/// Every level of the model wraps the failure of its child with a short
/// context such as `parse path '/foo' failed`, so the rendered message reads
/// from the outermost entity down to the root cause.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("{0}")]
    Invalid(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<SpecError>,
    },
}

impl SpecError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SpecError::Invalid(message.into())
    }

    pub fn context(self, context: impl Into<String>) -> Self {
        SpecError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error of a chain.
    pub fn root_cause(&self) -> &SpecError {
        match self {
            SpecError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub(crate) trait SpecResultExt<T> {
    fn context<F, C>(self, context: F) -> Result<T, SpecError>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E> SpecResultExt<T> for Result<T, E>
where
    E: Into<SpecError>,
{
    fn context<F, C>(self, context: F) -> Result<T, SpecError>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(e.into().context(context())),
        }
    }
}

/// A failure raised while serving an HTTP request, carrying the status that
/// is written back to the client.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RequestError {
    pub status: StatusCode,
    pub message: String,
    pub headers: HeaderMap,
}

impl RequestError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// One leaf failure of a schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFailure {
    pub pointer: String,
    pub reason: String,
}

/// Every failure collected while validating one value against a schema, in
/// the order they were found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaErrors(pub Vec<SchemaFailure>);

impl SchemaErrors {
    pub fn new() -> Self {
        SchemaErrors(Vec::new())
    }

    pub fn single(pointer: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut errors = SchemaErrors::new();
        errors.push(pointer, reason);
        errors
    }

    pub fn push(&mut self, pointer: impl Into<String>, reason: impl Into<String>) {
        self.0.push(SchemaFailure {
            pointer: pointer.into(),
            reason: reason.into(),
        });
    }

    pub fn append(&mut self, other: SchemaErrors) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaFailure> {
        self.0.iter()
    }
}

impl Display for SchemaErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "error count {}:", self.0.len())?;
        for failure in &self.0 {
            write!(f, "\n- {}: {}", failure.pointer, failure.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaErrors {}

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error(transparent)]
    Schema(#[from] SchemaErrors),

    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    #[error("marshal '{content_type}' failed: {message}")]
    Encode {
        content_type: String,
        message: String,
    },
}

impl MarshalError {
    pub(crate) fn encode(content_type: impl Display, message: impl Display) -> Self {
        MarshalError::Encode {
            content_type: content_type.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_spec_error_chain_message() {
        let error = SpecError::from(ReferenceError::not_found(
            "#/components/schemas/Foo",
            "/components/schemas/Foo",
        ))
        .context("parse response '200' failed")
        .context("parse operation 'GET' failed")
        .context("parse path '/foo' failed");
        assert_eq!(
            error.to_string(),
            "parse path '/foo' failed: parse operation 'GET' failed: parse response '200' failed: \
             resolve reference '#/components/schemas/Foo' failed: path '/components/schemas/Foo' not found"
        );
        assert!(matches!(error.root_cause(), SpecError::Reference(_)));
    }

    #[test]
    fn test_schema_errors_rendering() {
        let mut errors = SchemaErrors::new();
        errors.push("#/properties/foo/type", "invalid type, expected integer but got string");
        errors.push("#/required", "missing required property 'bar'");
        assert_eq!(
            errors.to_string(),
            "error count 2:\n- #/properties/foo/type: invalid type, expected integer but got string\n- #/required: missing required property 'bar'"
        );
    }

    #[test]
    fn test_context_ext() {
        let result: Result<(), SpecError> = Err(SpecError::invalid("boom"));
        let result = result.context(|| "parse info failed");
        assert_eq!(result.unwrap_err().to_string(), "parse info failed: boom");
    }
}
