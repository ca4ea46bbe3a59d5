use crate::{FORMAT_FIELD, ITEMS_FIELD, PROPERTIES_FIELD, REF_FIELD, TYPE_FIELD};
use serde_json::{Map, Value, json};

const REF_PREFIXES: [(&str, &str); 3] = [
    ("#/definitions/", "#/components/schemas/"),
    ("#/responses/", "#/components/responses/"),
    ("#/parameters/", "#/components/parameters/"),
];

/// Points a 2.0 reference at the matching 3.0 component. External parts
/// of a reference are kept.
pub fn rewrite_ref(reference: &str) -> String {
    let (document, fragment) = match reference.find('#') {
        Some(i) => reference.split_at(i),
        None => return reference.to_owned(),
    };
    for (old, new) in REF_PREFIXES {
        if let Some(rest) = fragment.strip_prefix(old) {
            return format!("{}{}{}", document, new, rest);
        }
    }
    reference.to_owned()
}

/// Members of a 2.0 schema whose value is itself a schema.
const SCHEMA_MEMBERS: [&str; 2] = [ITEMS_FIELD, "additionalProperties"];
const SCHEMA_LIST_MEMBERS: [&str; 3] = ["allOf", "anyOf", "oneOf"];

/// Converts a 2.0 schema into its 3.0 form.
pub fn convert_schema(schema: &Value) -> Value {
    let Some(object) = schema.as_object() else {
        return schema.clone();
    };
    let mut out = Map::new();
    for (key, value) in object {
        match key.as_str() {
            REF_FIELD => {
                let target = value.as_str().map(rewrite_ref).map(Value::String);
                out.insert(key.clone(), target.unwrap_or_else(|| value.clone()));
            }
            PROPERTIES_FIELD => {
                let properties = value
                    .as_object()
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, s)| (name.clone(), convert_schema(s)))
                            .collect::<Map<_, _>>()
                    })
                    .map(Value::Object);
                out.insert(key.clone(), properties.unwrap_or_else(|| value.clone()));
            }
            k if SCHEMA_MEMBERS.contains(&k) => {
                out.insert(key.clone(), convert_schema(value));
            }
            k if SCHEMA_LIST_MEMBERS.contains(&k) => {
                let list = value
                    .as_array()
                    .map(|l| l.iter().map(convert_schema).collect())
                    .map(Value::Array);
                out.insert(key.clone(), list.unwrap_or_else(|| value.clone()));
            }
            "x-nullable" => {
                out.insert("nullable".to_owned(), value.clone());
            }
            "discriminator" => {
                let discriminator = match value {
                    Value::String(name) => json!({"propertyName": name}),
                    other => other.clone(),
                };
                out.insert(key.clone(), discriminator);
            }
            "collectionFormat" => {}
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    match out.get(TYPE_FIELD).and_then(Value::as_str) {
        Some("integer") if !out.contains_key(FORMAT_FIELD) => {
            out.insert(FORMAT_FIELD.to_owned(), json!("int32"));
        }
        Some("file") => {
            out.insert(TYPE_FIELD.to_owned(), json!("string"));
            out.insert(FORMAT_FIELD.to_owned(), json!("binary"));
        }
        _ => {}
    }
    Value::Object(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rewrite_ref() {
        assert_eq!(rewrite_ref("#/definitions/Pet"), "#/components/schemas/Pet");
        assert_eq!(
            rewrite_ref("common.json#/parameters/limit"),
            "common.json#/components/parameters/limit"
        );
        assert_eq!(rewrite_ref("pet.json"), "pet.json");
        assert_eq!(rewrite_ref("#/paths/~1pets"), "#/paths/~1pets");
    }

    #[test]
    fn test_convert_schema() {
        let converted = convert_schema(&json!({
            "type": "object",
            "discriminator": "kind",
            "properties": {
                "id": {"type": "integer"},
                "age": {"type": "integer", "format": "int64", "x-nullable": true},
                "owner": {"$ref": "#/definitions/User"},
                "tags": {"type": "array", "items": {"type": "integer"}}
            }
        }));
        assert_eq!(
            converted,
            json!({
                "type": "object",
                "discriminator": {"propertyName": "kind"},
                "properties": {
                    "id": {"type": "integer", "format": "int32"},
                    "age": {"type": "integer", "format": "int64", "nullable": true},
                    "owner": {"$ref": "#/components/schemas/User"},
                    "tags": {"type": "array", "items": {"type": "integer", "format": "int32"}}
                }
            })
        );
    }
}
