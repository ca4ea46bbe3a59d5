pub mod codec;
pub mod error;
pub mod http;
pub mod ldap;
pub mod mustache;
pub mod openapi;
pub mod parameter;
pub mod runtime;
pub mod schema;
pub mod swagger;
pub mod types;

pub use crate::error::{
    MarshalError, ReferenceError, RequestError, SchemaErrors, SpecError, StructuralError,
};
pub use crate::http::builder::HandlerBuilder;
pub use crate::http::handler::Handler;
pub use crate::openapi::Config;
pub use crate::runtime::Runtime;

const REF_FIELD: &str = "$ref";
const CONTENT_FIELD: &str = "content";
const SCHEMA_FIELD: &str = "schema";
const PARAMETERS_FIELD: &str = "parameters";
const REQUEST_BODY_FIELD: &str = "requestBody";
const RESPONSES_FIELD: &str = "responses";
const SECURITY_FIELD: &str = "security";
const HEADERS_FIELD: &str = "headers";
const EXAMPLE_FIELD: &str = "example";
const EXAMPLES_FIELD: &str = "examples";
const DESCRIPTION_FIELD: &str = "description";
const SUMMARY_FIELD: &str = "summary";
const REQUIRED_FIELD: &str = "required";
const DEPRECATED_FIELD: &str = "deprecated";
const NAME_FIELD: &str = "name";
const IN_FIELD: &str = "in";
const TYPE_FIELD: &str = "type";
const FORMAT_FIELD: &str = "format";
const STYLE_FIELD: &str = "style";
const EXPLODE_FIELD: &str = "explode";
const ALLOW_RESERVED_FIELD: &str = "allowReserved";
const ITEMS_FIELD: &str = "items";
const PROPERTIES_FIELD: &str = "properties";

const PATH_SEPARATOR: &str = "/";
const TILDE: &str = "~";
const ENCODED_BACKSLASH: &str = "~1";
const ENCODED_TILDE: &str = "~0";

/// Media type used when a document does not say otherwise.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
