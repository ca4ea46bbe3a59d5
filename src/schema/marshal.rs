use crate::error::MarshalError;
use crate::openapi::media_type::{ContentType, Encoding, MediaType};
use crate::openapi::parameter::Style;
use crate::schema::{Parser, Schema, SchemaRef, Xml};
use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Characters escaped in form values.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Form value escaping that keeps RFC 3986 reserved characters.
const FORM_RESERVED: &AsciiSet = &FORM_VALUE
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'#')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';');

const DEFAULT_XML_ROOT: &str = "root";

/// Validates `value` against the media type's schema and encodes it as
/// `content_type`.
pub fn marshal_media(
    value: &Value,
    content_type: &ContentType,
    media_type: &MediaType,
) -> Result<Vec<u8>, MarshalError> {
    marshal(
        value,
        media_type.schema.as_ref(),
        content_type,
        &media_type.encoding,
    )
}

pub fn marshal(
    value: &Value,
    schema: Option<&SchemaRef>,
    content_type: &ContentType,
    encoding: &IndexMap<String, Encoding>,
) -> Result<Vec<u8>, MarshalError> {
    let resolved = schema.and_then(SchemaRef::value);
    let value = match &resolved {
        Some(schema) => Parser::new().parse_schema(value, schema)?,
        None => value.clone(),
    };

    if content_type.is_json() {
        return serde_json::to_vec(&value).map_err(|e| MarshalError::encode(content_type, e));
    }
    if content_type.is_xml() {
        let root = root_name(schema, resolved.as_deref());
        let mut writer = XmlWriter::default();
        writer.element(&root, &value, resolved.as_deref());
        return Ok(writer.out.into_bytes());
    }
    if content_type.is_form_urlencoded() {
        return form_urlencoded(&value, encoding, content_type);
    }
    match &value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Null => Ok(Vec::new()),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string().into_bytes()),
        Value::Array(_) | Value::Object(_) if content_type.is_text() => {
            serde_json::to_vec(&value).map_err(|e| MarshalError::encode(content_type, e))
        }
        _ => Err(MarshalError::UnsupportedContentType(content_type.to_string())),
    }
}

fn root_name(reference: Option<&SchemaRef>, schema: Option<&Schema>) -> String {
    if let Some(name) = schema.and_then(|s| s.xml.as_ref()).and_then(|x| x.name.clone()) {
        return name;
    }
    reference
        .and_then(|r| r.reference.as_deref())
        .and_then(|r| r.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| DEFAULT_XML_ROOT.to_owned())
}

#[derive(Default)]
struct XmlWriter {
    out: String,
}

impl XmlWriter {
    fn element(&mut self, name: &str, value: &Value, schema: Option<&Schema>) {
        let xml = schema.and_then(|s| s.xml.as_ref());
        let name = qualified(name, xml);
        match value {
            Value::Array(items) => {
                let item_schema = schema.and_then(Schema::items);
                let wrapped = xml.is_some_and(|x| x.wrapped);
                let item_name = item_schema
                    .as_deref()
                    .and_then(|s| s.xml.as_ref())
                    .and_then(|x| x.name.clone())
                    .unwrap_or_else(|| name.clone());
                if wrapped {
                    self.open(&name, xml, &[]);
                }
                for item in items {
                    self.element(&item_name, item, item_schema.as_deref());
                }
                if wrapped {
                    self.close(&name);
                }
            }
            Value::Object(map) => {
                let (attributes, children) = split_attributes(map, schema);
                if children.is_empty() {
                    self.open_empty(&name, xml, &attributes);
                    return;
                }
                self.open(&name, xml, &attributes);
                for (key, child, child_schema) in children {
                    let child_name = child_schema
                        .as_deref()
                        .and_then(|s| s.xml.as_ref())
                        .and_then(|x| x.name.clone())
                        .unwrap_or_else(|| key.to_owned());
                    self.element(&child_name, child, child_schema.as_deref());
                }
                self.close(&name);
            }
            Value::Null => self.open_empty(&name, xml, &[]),
            scalar => {
                self.open(&name, xml, &[]);
                self.out.push_str(&escape(&scalar_text(scalar)));
                self.close(&name);
            }
        }
    }

    fn open(&mut self, name: &str, xml: Option<&Xml>, attributes: &[(String, String)]) {
        self.start(name, xml, attributes);
        self.out.push('>');
    }

    fn open_empty(&mut self, name: &str, xml: Option<&Xml>, attributes: &[(String, String)]) {
        self.start(name, xml, attributes);
        self.out.push_str("/>");
    }

    fn start(&mut self, name: &str, xml: Option<&Xml>, attributes: &[(String, String)]) {
        self.out.push('<');
        self.out.push_str(name);
        if let Some(namespace) = xml.and_then(|x| x.namespace.as_deref()) {
            match xml.and_then(|x| x.prefix.as_deref()) {
                Some(prefix) => self.attribute(&format!("xmlns:{}", prefix), namespace),
                None => self.attribute("xmlns", namespace),
            }
        }
        for (key, value) in attributes {
            self.attribute(key, value);
        }
    }

    fn attribute(&mut self, key: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(key);
        self.out.push_str("=\"");
        self.out.push_str(&escape(value));
        self.out.push('"');
    }

    fn close(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }
}

type XmlChild<'v> = (&'v str, &'v Value, Option<Arc<Schema>>);

fn split_attributes<'v>(
    map: &'v Map<String, Value>,
    schema: Option<&Schema>,
) -> (Vec<(String, String)>, Vec<XmlChild<'v>>) {
    let mut attributes = Vec::new();
    let mut children = Vec::new();
    for (key, value) in map {
        let property = schema.and_then(|s| s.property(key));
        let xml = property.as_deref().and_then(|p| p.xml.as_ref());
        if xml.is_some_and(|x| x.attribute) && !value.is_object() && !value.is_array() {
            let name = xml.and_then(|x| x.name.clone()).unwrap_or_else(|| key.clone());
            attributes.push((qualified(&name, xml), scalar_text(value)));
        } else {
            children.push((key.as_str(), value, property));
        }
    }
    (attributes, children)
}

fn qualified(name: &str, xml: Option<&Xml>) -> String {
    match xml.and_then(|x| x.prefix.as_deref()) {
        Some(prefix) if !name.contains(':') => format!("{}:{}", prefix, name),
        _ => name.to_owned(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn form_urlencoded(
    value: &Value,
    encoding: &IndexMap<String, Encoding>,
    content_type: &ContentType,
) -> Result<Vec<u8>, MarshalError> {
    let Value::Object(map) = value else {
        return Err(MarshalError::encode(
            content_type,
            "form data must be an object",
        ));
    };
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (key, field) in map {
        let options = encoding.get(key);
        let style = options.map(Encoding::style).unwrap_or(Style::Form);
        let explode = options.map(Encoding::explode).unwrap_or(true);
        let reserved = options.is_some_and(|e| e.allow_reserved);
        let encode = |s: &str| -> String {
            let set = if reserved { FORM_RESERVED } else { FORM_VALUE };
            utf8_percent_encode(s, set).to_string()
        };
        match field {
            Value::Array(items) => {
                let texts: Vec<String> = items.iter().map(|v| encode(&scalar_text(v))).collect();
                if explode && style == Style::Form {
                    for text in texts {
                        pairs.push((encode(key), text));
                    }
                } else {
                    let separator = match style {
                        Style::SpaceDelimited => "%20",
                        Style::PipeDelimited => "|",
                        _ => ",",
                    };
                    pairs.push((encode(key), texts.join(separator)));
                }
            }
            Value::Object(properties) => match (style, explode) {
                (Style::DeepObject, _) => {
                    for (name, v) in properties {
                        pairs.push((encode(&format!("{}[{}]", key, name)), encode(&scalar_text(v))));
                    }
                }
                (_, true) => {
                    for (name, v) in properties {
                        pairs.push((encode(name), encode(&scalar_text(v))));
                    }
                }
                _ => {
                    let flat: Vec<String> = properties
                        .iter()
                        .flat_map(|(name, v)| [encode(name), encode(&scalar_text(v))])
                        .collect();
                    pairs.push((encode(key), flat.join(",")));
                }
            },
            scalar => pairs.push((encode(key), encode(&scalar_text(scalar)))),
        }
    }
    let body = pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    Ok(body.into_bytes())
}
