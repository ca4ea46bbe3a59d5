use crate::error::SpecError;
use crate::swagger::media_types;
use crate::swagger::schema::{convert_schema, rewrite_ref};
use crate::{
    DEFAULT_CONTENT_TYPE, DESCRIPTION_FIELD, EXAMPLES_FIELD, EXPLODE_FIELD, HEADERS_FIELD,
    IN_FIELD, NAME_FIELD, PARAMETERS_FIELD, REF_FIELD, REQUEST_BODY_FIELD, REQUIRED_FIELD,
    RESPONSES_FIELD, SCHEMA_FIELD, STYLE_FIELD, TYPE_FIELD,
};
use serde_json::{Map, Value, json};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

const METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

const OPERATION_FIELDS: [&str; 7] = [
    "tags",
    "summary",
    DESCRIPTION_FIELD,
    "operationId",
    "deprecated",
    "security",
    "externalDocs",
];

/// Members that move from a 2.0 non-body parameter into its 3.0 schema.
const SCHEMA_KEYWORDS: [&str; 16] = [
    TYPE_FIELD,
    "format",
    "items",
    "default",
    "enum",
    "maximum",
    "exclusiveMaximum",
    "minimum",
    "exclusiveMinimum",
    "maxLength",
    "minLength",
    "pattern",
    "maxItems",
    "minItems",
    "uniqueItems",
    "multipleOf",
];

/// Document-level values operations fall back to.
pub(crate) struct Defaults {
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    pub parameters: Map<String, Value>,
}

/// Operation media types, else the document's, else JSON.
fn media_types_or(own: Option<&Value>, fallback: &[String]) -> Vec<String> {
    let own = media_types(own);
    if !own.is_empty() {
        own
    } else if !fallback.is_empty() {
        fallback.to_vec()
    } else {
        vec![DEFAULT_CONTENT_TYPE.to_owned()]
    }
}

impl Defaults {
    /// Follows a local `#/parameters/` reference so body and form
    /// parameters can be recognized.
    fn expand<'v>(&'v self, parameter: &'v Value) -> &'v Value {
        let target = parameter
            .get(REF_FIELD)
            .and_then(Value::as_str)
            .and_then(|r| r.strip_prefix("#/parameters/"))
            .and_then(|name| self.parameters.get(name));
        match target {
            Some(t) if is_payload(t) => t,
            _ => parameter,
        }
    }
}

fn location(parameter: &Value) -> Option<&str> {
    parameter.get(IN_FIELD).and_then(Value::as_str)
}

fn is_payload(parameter: &Value) -> bool {
    matches!(location(parameter), Some("body" | "formData"))
}

fn copy_extensions(from: &Map<String, Value>, to: &mut Map<String, Value>) {
    for (key, value) in from.iter().filter(|(k, _)| k.starts_with("x-")) {
        to.insert(key.clone(), value.clone());
    }
}

pub(crate) fn convert_path_item(item: &Value, defaults: &Defaults) -> Result<Value, SpecError> {
    let Some(source) = item.as_object() else {
        return Ok(item.clone());
    };
    let mut out = Map::new();
    if let Some(reference) = source.get(REF_FIELD).and_then(Value::as_str) {
        out.insert(REF_FIELD.to_owned(), json!(rewrite_ref(reference)));
    }

    let shared: Vec<&Value> = source
        .get(PARAMETERS_FIELD)
        .and_then(Value::as_array)
        .map(|l| l.iter().map(|p| defaults.expand(p)).collect())
        .unwrap_or_default();
    let (shared_payload, shared_plain): (Vec<&Value>, Vec<&Value>) =
        shared.into_iter().partition(|p| is_payload(p));

    for method in METHODS {
        if let Some(operation) = source.get(method) {
            out.insert(
                method.to_owned(),
                convert_operation(operation, &shared_payload, defaults).map_err(|e| {
                    e.context(format!(
                        "convert operation '{}' failed",
                        method.to_ascii_uppercase()
                    ))
                })?,
            );
        }
    }
    if !shared_plain.is_empty() {
        let parameters = shared_plain
            .into_iter()
            .map(convert_parameter)
            .collect::<Result<Vec<_>, _>>()?;
        out.insert(PARAMETERS_FIELD.to_owned(), Value::Array(parameters));
    }
    copy_extensions(source, &mut out);
    Ok(Value::Object(out))
}

fn convert_operation(
    operation: &Value,
    shared_payload: &[&Value],
    defaults: &Defaults,
) -> Result<Value, SpecError> {
    let Some(source) = operation.as_object() else {
        return Err(SpecError::invalid("operation must be an object"));
    };
    let consumes = media_types_or(source.get("consumes"), &defaults.consumes);
    let produces = media_types_or(source.get("produces"), &defaults.produces);

    let mut out = Map::new();
    for field in OPERATION_FIELDS {
        if let Some(value) = source.get(field) {
            out.insert(field.to_owned(), value.clone());
        }
    }

    let mut body: Option<&Value> = None;
    let mut form: Vec<&Value> = Vec::new();
    let mut parameters = Vec::new();
    let own = source
        .get(PARAMETERS_FIELD)
        .and_then(Value::as_array)
        .map(|l| l.iter().map(|p| defaults.expand(p)).collect::<Vec<_>>())
        .unwrap_or_default();
    for parameter in own {
        match location(parameter) {
            Some("body") => body = Some(parameter),
            Some("formData") => form.push(parameter),
            _ => parameters.push(convert_parameter(parameter)?),
        }
    }
    for &parameter in shared_payload {
        match location(parameter) {
            Some("body") if body.is_none() => body = Some(parameter),
            Some("formData") if !form.iter().any(|f| same_name(f, parameter)) => {
                form.push(parameter)
            }
            _ => {}
        }
    }
    if !parameters.is_empty() {
        out.insert(PARAMETERS_FIELD.to_owned(), Value::Array(parameters));
    }
    if let Some(body) = body {
        out.insert(REQUEST_BODY_FIELD.to_owned(), body_request(body, &consumes));
    } else if !form.is_empty() {
        out.insert(REQUEST_BODY_FIELD.to_owned(), form_request(&form, &consumes));
    }

    let mut responses = Map::new();
    if let Some(source_responses) = source.get(RESPONSES_FIELD).and_then(Value::as_object) {
        for (status, response) in source_responses {
            if status.starts_with("x-") {
                continue;
            }
            responses.insert(status.clone(), convert_response(response, &produces));
        }
    }
    out.insert(RESPONSES_FIELD.to_owned(), Value::Object(responses));
    copy_extensions(source, &mut out);
    Ok(Value::Object(out))
}

fn same_name(a: &Value, b: &Value) -> bool {
    a.get(NAME_FIELD) == b.get(NAME_FIELD)
}

fn body_request(body: &Value, consumes: &[String]) -> Value {
    let schema = body.get(SCHEMA_FIELD).map(convert_schema);
    let content: Map<String, Value> = consumes
        .iter()
        .map(|ct| {
            let mut media_type = Map::new();
            if let Some(schema) = &schema {
                media_type.insert(SCHEMA_FIELD.to_owned(), schema.clone());
            }
            (ct.clone(), Value::Object(media_type))
        })
        .collect();
    let mut request = Map::new();
    if let Some(description) = body.get(DESCRIPTION_FIELD) {
        request.insert(DESCRIPTION_FIELD.to_owned(), description.clone());
    }
    if let Some(required) = body.get(REQUIRED_FIELD) {
        request.insert(REQUIRED_FIELD.to_owned(), required.clone());
    }
    request.insert("content".to_owned(), Value::Object(content));
    Value::Object(request)
}

/// Collects `formData` parameters into one object schema.
fn form_request(form: &[&Value], consumes: &[String]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for parameter in form {
        let Some(name) = parameter.get(NAME_FIELD).and_then(Value::as_str) else {
            continue;
        };
        let mut schema = parameter_schema(parameter);
        if let (Some(description), Some(map)) =
            (parameter.get(DESCRIPTION_FIELD), schema.as_object_mut())
        {
            map.insert(DESCRIPTION_FIELD.to_owned(), description.clone());
        }
        properties.insert(name.to_owned(), schema);
        if parameter.get(REQUIRED_FIELD).and_then(Value::as_bool) == Some(true) {
            required.push(json!(name));
        }
    }
    let mut schema = json!({"type": "object", "properties": properties});
    if !required.is_empty() {
        schema[REQUIRED_FIELD] = Value::Array(required);
    }

    let mut types: Vec<&str> = consumes
        .iter()
        .map(String::as_str)
        .filter(|ct| ct.starts_with(MULTIPART) || ct.starts_with(FORM_URLENCODED))
        .collect();
    if types.is_empty() {
        types.push(FORM_URLENCODED);
    }
    let content: Map<String, Value> = types
        .into_iter()
        .map(|ct| (ct.to_owned(), json!({"schema": schema})))
        .collect();
    json!({"content": content})
}

fn parameter_schema(parameter: &Value) -> Value {
    let mut schema = Map::new();
    for keyword in SCHEMA_KEYWORDS {
        if let Some(value) = parameter.get(keyword) {
            schema.insert(keyword.to_owned(), value.clone());
        }
    }
    convert_schema(&Value::Object(schema))
}

/// Converts a path, query, header or cookie parameter.
pub(crate) fn convert_parameter(parameter: &Value) -> Result<Value, SpecError> {
    let Some(source) = parameter.as_object() else {
        return Err(SpecError::invalid("parameter must be an object"));
    };
    if let Some(reference) = source.get(REF_FIELD).and_then(Value::as_str) {
        return Ok(json!({"$ref": rewrite_ref(reference)}));
    }
    let mut out = Map::new();
    for field in [NAME_FIELD, IN_FIELD, DESCRIPTION_FIELD, REQUIRED_FIELD, "allowEmptyValue"] {
        if let Some(value) = source.get(field) {
            out.insert(field.to_owned(), value.clone());
        }
    }
    out.insert(SCHEMA_FIELD.to_owned(), parameter_schema(parameter));

    let is_array = source.get(TYPE_FIELD).and_then(Value::as_str) == Some("array");
    if is_array {
        let format = source
            .get("collectionFormat")
            .and_then(Value::as_str)
            .unwrap_or("csv");
        let in_query = location(parameter) == Some("query");
        let (style, explode) = match format {
            "multi" => ("form", true),
            "ssv" => ("spaceDelimited", false),
            "pipes" => ("pipeDelimited", false),
            "csv" if in_query => ("form", false),
            "csv" => ("simple", false),
            other => {
                log::warn!(
                    "collectionFormat '{}' of parameter {:?} has no equivalent, using csv",
                    other,
                    source.get(NAME_FIELD)
                );
                (if in_query { "form" } else { "simple" }, false)
            }
        };
        out.insert(STYLE_FIELD.to_owned(), json!(style));
        out.insert(EXPLODE_FIELD.to_owned(), json!(explode));
    }
    copy_extensions(source, &mut out);
    Ok(Value::Object(out))
}

pub(crate) fn convert_response(response: &Value, produces: &[String]) -> Value {
    let Some(source) = response.as_object() else {
        return response.clone();
    };
    if let Some(reference) = source.get(REF_FIELD).and_then(Value::as_str) {
        return json!({"$ref": rewrite_ref(reference)});
    }
    let mut out = Map::new();
    out.insert(
        DESCRIPTION_FIELD.to_owned(),
        source.get(DESCRIPTION_FIELD).cloned().unwrap_or_else(|| json!("")),
    );

    if let Some(headers) = source.get(HEADERS_FIELD).and_then(Value::as_object) {
        let converted: Map<String, Value> = headers
            .iter()
            .map(|(name, header)| {
                let mut h = Map::new();
                if let Some(description) = header.get(DESCRIPTION_FIELD) {
                    h.insert(DESCRIPTION_FIELD.to_owned(), description.clone());
                }
                h.insert(SCHEMA_FIELD.to_owned(), parameter_schema(header));
                (name.clone(), Value::Object(h))
            })
            .collect();
        out.insert(HEADERS_FIELD.to_owned(), Value::Object(converted));
    }

    let examples = source.get(EXAMPLES_FIELD).and_then(Value::as_object);
    let mut content = Map::new();
    if let Some(schema) = source.get(SCHEMA_FIELD).map(convert_schema) {
        for ct in produces {
            content.insert(ct.clone(), json!({"schema": schema}));
        }
    }
    for (ct, example) in examples.into_iter().flatten() {
        let entry = content.entry(ct.clone()).or_insert_with(|| json!({}));
        if let Some(map) = entry.as_object_mut() {
            map.insert("example".to_owned(), example.clone());
        }
    }
    if !content.is_empty() {
        out.insert("content".to_owned(), Value::Object(content));
    }
    Value::Object(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::swagger::convert;

    fn defaults() -> Defaults {
        Defaults {
            consumes: Vec::new(),
            produces: Vec::new(),
            parameters: Map::new(),
        }
    }

    #[test]
    fn test_body_parameter() {
        let converted = convert_operation(
            &json!({
                "consumes": ["application/json", "application/xml"],
                "parameters": [
                    {"name": "pet", "in": "body", "required": true,
                     "schema": {"$ref": "#/definitions/Pet"}},
                    {"name": "dryRun", "in": "query", "type": "boolean"}
                ],
                "responses": {"200": {"description": "ok"}}
            }),
            &[],
            &defaults(),
        )
        .unwrap();
        assert_eq!(
            converted["requestBody"],
            json!({
                "required": true,
                "content": {
                    "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}},
                    "application/xml": {"schema": {"$ref": "#/components/schemas/Pet"}}
                }
            })
        );
        assert_eq!(
            converted["parameters"],
            json!([{"name": "dryRun", "in": "query", "schema": {"type": "boolean"}}])
        );
    }

    #[test]
    fn test_form_data() {
        let converted = convert_operation(
            &json!({
                "consumes": ["multipart/form-data"],
                "parameters": [
                    {"name": "file", "in": "formData", "type": "file", "required": true},
                    {"name": "note", "in": "formData", "type": "string"}
                ],
                "responses": {}
            }),
            &[],
            &defaults(),
        )
        .unwrap();
        assert_eq!(
            converted["requestBody"]["content"]["multipart/form-data"]["schema"],
            json!({
                "type": "object",
                "properties": {
                    "file": {"type": "string", "format": "binary"},
                    "note": {"type": "string"}
                },
                "required": ["file"]
            })
        );
    }

    #[test]
    fn test_collection_format() {
        let p = convert_parameter(&json!({
            "name": "ids", "in": "query", "type": "array", "items": {"type": "integer"}
        }))
        .unwrap();
        assert_eq!(p["style"], json!("form"));
        assert_eq!(p["explode"], json!(false));
        assert_eq!(p["schema"]["items"], json!({"type": "integer", "format": "int32"}));

        let p = convert_parameter(&json!({
            "name": "tags", "in": "query", "type": "array", "collectionFormat": "pipes"
        }))
        .unwrap();
        assert_eq!(p["style"], json!("pipeDelimited"));
    }

    #[test]
    fn test_responses_follow_produces() {
        let converted = convert(&json!({
            "swagger": "2.0",
            "produces": ["application/json"],
            "paths": {
                "/pets": {
                    "get": {
                        "produces": ["application/xml", "application/json"],
                        "responses": {
                            "200": {
                                "description": "pets",
                                "schema": {"type": "array", "items": {"$ref": "#/definitions/Pet"}},
                                "headers": {"X-Rate": {"type": "integer"}},
                                "examples": {"application/json": [{"name": "Rex"}]}
                            },
                            "default": {"$ref": "#/responses/Error"}
                        }
                    }
                }
            }
        }))
        .unwrap();
        let responses = &converted["paths"]["/pets"]["get"]["responses"];
        let content = responses["200"]["content"].as_object().unwrap();
        assert_eq!(
            content.keys().collect::<Vec<_>>(),
            vec!["application/xml", "application/json"]
        );
        assert_eq!(content["application/json"]["example"], json!([{"name": "Rex"}]));
        assert_eq!(
            responses["200"]["headers"]["X-Rate"]["schema"],
            json!({"type": "integer", "format": "int32"})
        );
        assert_eq!(responses["default"], json!({"$ref": "#/components/responses/Error"}));
    }

    #[test]
    fn test_shared_body_parameter() {
        let mut defaults = defaults();
        defaults.parameters.insert(
            "pet".to_owned(),
            json!({"name": "pet", "in": "body", "schema": {"type": "object"}}),
        );
        let converted = convert_path_item(
            &json!({
                "parameters": [{"$ref": "#/parameters/pet"}],
                "put": {"responses": {"204": {"description": "saved"}}}
            }),
            &defaults,
        )
        .unwrap();
        assert_eq!(
            converted["put"]["requestBody"]["content"]["application/json"]["schema"],
            json!({"type": "object"})
        );
        assert!(converted.get("parameters").is_none());
    }
}
