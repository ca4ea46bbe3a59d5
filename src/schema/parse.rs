use crate::error::SchemaErrors;
use crate::schema::format::{anchored_pattern, is_valid_format};
use crate::schema::{AdditionalProperties, Schema, SchemaRef};
use crate::types::json_path::JsonPath;
use crate::types::primitive::OpenApiPrimitives;
use serde_json::{Map, Number, Value};

/// Validates values against a schema and coerces them to the declared
/// kinds.
#[derive(Debug, Clone, Copy)]
pub struct Parser {
    /// Accept strings for numeric and boolean schemas when they parse.
    pub convert_strings: bool,
    /// Accept unknown object keys when a schema lists properties but does
    /// not say anything about `additionalProperties`.
    pub free_form: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Parser {
            convert_strings: false,
            free_form: true,
        }
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// The parser used for request parameters.
    pub fn for_parameters() -> Self {
        Parser {
            convert_strings: true,
            free_form: true,
        }
    }

    pub fn convert_strings(mut self, convert: bool) -> Self {
        self.convert_strings = convert;
        self
    }

    pub fn free_form(mut self, free_form: bool) -> Self {
        self.free_form = free_form;
        self
    }

    /// Validates `value`; a missing schema accepts anything.
    pub fn parse(&self, value: &Value, schema: Option<&SchemaRef>) -> Result<Value, SchemaErrors> {
        match schema.and_then(|s| s.value()) {
            Some(schema) => self.parse_schema(value, &schema),
            None => Ok(value.clone()),
        }
    }

    pub fn parse_schema(&self, value: &Value, schema: &Schema) -> Result<Value, SchemaErrors> {
        let mut errors = SchemaErrors::new();
        match self.walk(value, schema, &JsonPath::new(), &mut errors) {
            Some(parsed) if errors.is_empty() => Ok(parsed),
            _ => Err(errors),
        }
    }

    fn walk(
        &self,
        value: &Value,
        schema: &Schema,
        path: &JsonPath,
        errors: &mut SchemaErrors,
    ) -> Option<Value> {
        if value.is_null() {
            if schema.is_nullable() || schema.types.is_empty() {
                return Some(Value::Null);
            }
            errors.push(
                path.child("type").to_string(),
                format!("invalid type, expected {} but got null", schema.types),
            );
            return None;
        }

        let mut value = self.compose(value, schema, path, errors)?;

        let kind = match self.select_kind(&value, schema) {
            Ok(kind) => kind,
            Err(()) => {
                errors.push(
                    path.child("type").to_string(),
                    format!(
                        "invalid type, expected {} but got {}",
                        schema.types,
                        OpenApiPrimitives::of(&value)
                    ),
                );
                return None;
            }
        };

        let before = errors.len();
        value = match kind {
            Some(OpenApiPrimitives::String) => self.parse_string(&value, schema, path, errors),
            Some(OpenApiPrimitives::Integer) => {
                self.parse_number(&value, schema, path, errors, true)
            }
            Some(OpenApiPrimitives::Number) => {
                self.parse_number(&value, schema, path, errors, false)
            }
            Some(OpenApiPrimitives::Bool) => self.parse_bool(&value),
            Some(OpenApiPrimitives::Array) => self.parse_array(&value, schema, path, errors),
            Some(OpenApiPrimitives::Object) => self.parse_object(&value, schema, path, errors),
            Some(OpenApiPrimitives::Null) | None => Some(value),
        }?;
        if errors.len() > before {
            return None;
        }

        if !schema.enumeration.is_empty() && !schema.enumeration.iter().any(|e| same(e, &value)) {
            let allowed: Vec<String> = schema.enumeration.iter().map(Value::to_string).collect();
            errors.push(
                path.child("enum").to_string(),
                format!(
                    "value '{}' does not match one in the enumeration [{}]",
                    display(&value),
                    allowed.join(", ")
                ),
            );
            return None;
        }
        Some(value)
    }

    /// Applies `allOf`, `anyOf`, `oneOf` and `not`, returning the value the
    /// remaining keywords should see.
    fn compose(
        &self,
        value: &Value,
        schema: &Schema,
        path: &JsonPath,
        errors: &mut SchemaErrors,
    ) -> Option<Value> {
        let mut current = value.clone();

        if !schema.all_of.is_empty() {
            let mut merged: Option<Map<String, Value>> = None;
            let mut failed = false;
            for (index, branch) in schema.all_of.iter().enumerate() {
                let Some(branch) = branch.value() else { continue };
                let branch_path = path.child("allOf").child(index);
                match self.walk(&current, &branch, &branch_path, errors) {
                    Some(Value::Object(parsed)) => {
                        let target = merged.get_or_insert_with(Map::new);
                        for (key, value) in parsed {
                            target.insert(key, value);
                        }
                    }
                    Some(parsed) => current = parsed,
                    None => failed = true,
                }
            }
            if failed {
                return None;
            }
            if let (Some(merged), Value::Object(original)) = (merged, &current) {
                let mut result = original.clone();
                for (key, value) in merged {
                    result.insert(key, value);
                }
                current = Value::Object(result);
            }
        }

        if !schema.any_of.is_empty() {
            let matched = schema.any_of.iter().find_map(|branch| {
                let branch = branch.value()?;
                self.try_walk(&current, &branch)
            });
            match matched {
                Some(parsed) => current = parsed,
                None => {
                    errors.push(
                        path.child("anyOf").to_string(),
                        "does not match any schemas of 'anyOf'",
                    );
                    return None;
                }
            }
        }

        if !schema.one_of.is_empty() {
            let mut matches = Vec::new();
            for (index, branch) in schema.one_of.iter().enumerate() {
                let Some(branch) = branch.value() else { continue };
                if let Some(parsed) = self.try_walk(&current, &branch) {
                    matches.push((index, parsed));
                }
            }
            match matches.len() {
                0 => {
                    errors.push(
                        path.child("oneOf").to_string(),
                        "valid against no schemas from 'oneOf'",
                    );
                    return None;
                }
                1 => {
                    if let Some((_, parsed)) = matches.pop() {
                        current = parsed;
                    }
                }
                _ => {
                    let indexes: Vec<String> = matches.iter().map(|(i, _)| i.to_string()).collect();
                    errors.push(
                        path.child("oneOf").to_string(),
                        format!(
                            "valid against more than one schema from 'oneOf': [{}]",
                            indexes.join(", ")
                        ),
                    );
                    return None;
                }
            }
        }

        if let Some(not) = schema.not.as_ref().and_then(|n| n.value()) {
            if self.try_walk(&current, &not).is_some() {
                errors.push(path.child("not").to_string(), "is valid against schema from 'not'");
                return None;
            }
        }
        Some(current)
    }

    fn try_walk(&self, value: &Value, schema: &Schema) -> Option<Value> {
        let mut scratch = SchemaErrors::new();
        match self.walk(value, schema, &JsonPath::new(), &mut scratch) {
            Some(parsed) if scratch.is_empty() => Some(parsed),
            _ => None,
        }
    }

    /// Picks which declared kind handles `value`. `Ok(None)` means the
    /// schema places no type constraint.
    fn select_kind(
        &self,
        value: &Value,
        schema: &Schema,
    ) -> Result<Option<OpenApiPrimitives>, ()> {
        let types = &schema.types;
        if types.is_empty() {
            return Ok(match value {
                Value::Object(_) if !schema.properties.is_empty() || schema.additional_properties.is_some() => {
                    Some(OpenApiPrimitives::Object)
                }
                Value::Array(_) if schema.items.is_some() => Some(OpenApiPrimitives::Array),
                Value::String(_) => Some(OpenApiPrimitives::String),
                Value::Number(_) => Some(OpenApiPrimitives::Number),
                _ => None,
            });
        }
        let native = OpenApiPrimitives::of(value);
        let candidates: &[OpenApiPrimitives] = match native {
            OpenApiPrimitives::Integer => &[OpenApiPrimitives::Integer, OpenApiPrimitives::Number],
            OpenApiPrimitives::Number => &[OpenApiPrimitives::Number],
            other => match other {
                OpenApiPrimitives::String => &[OpenApiPrimitives::String],
                OpenApiPrimitives::Bool => &[OpenApiPrimitives::Bool],
                OpenApiPrimitives::Array => &[OpenApiPrimitives::Array],
                OpenApiPrimitives::Object => &[OpenApiPrimitives::Object],
                _ => &[],
            },
        };
        if let Some(kind) = candidates.iter().find(|k| types.contains(**k)) {
            return Ok(Some(*kind));
        }
        if let (true, Value::String(s)) = (self.convert_strings, value) {
            if types.contains(OpenApiPrimitives::Integer) && s.trim().parse::<i64>().is_ok() {
                return Ok(Some(OpenApiPrimitives::Integer));
            }
            if types.contains(OpenApiPrimitives::Number)
                && s.trim().parse::<f64>().is_ok_and(f64::is_finite)
            {
                return Ok(Some(OpenApiPrimitives::Number));
            }
            if types.contains(OpenApiPrimitives::Bool) && (s == "true" || s == "false") {
                return Ok(Some(OpenApiPrimitives::Bool));
            }
        }
        Err(())
    }

    fn parse_string(
        &self,
        value: &Value,
        schema: &Schema,
        path: &JsonPath,
        errors: &mut SchemaErrors,
    ) -> Option<Value> {
        let s = value.as_str()?;
        let length = s.chars().count();
        if let Some(min) = schema.min_length {
            if length < min {
                errors.push(
                    path.child("minLength").to_string(),
                    format!("string '{}' is less than minimum length of {}", s, min),
                );
            }
        }
        if let Some(max) = schema.max_length {
            if length > max {
                errors.push(
                    path.child("maxLength").to_string(),
                    format!("string '{}' exceeds maximum length of {}", s, max),
                );
            }
        }
        if let Some(pattern) = &schema.pattern {
            match anchored_pattern(pattern) {
                Ok(regex) if regex.is_match(s) => {}
                Ok(_) => errors.push(
                    path.child("pattern").to_string(),
                    format!("string '{}' does not match regex pattern '{}'", s, pattern),
                ),
                Err(e) => errors.push(
                    path.child("pattern").to_string(),
                    format!("invalid pattern '{}': {}", pattern, e),
                ),
            }
        }
        if let Some(format) = &schema.format {
            if !is_valid_format(format, s) {
                errors.push(
                    path.child("format").to_string(),
                    format!("string '{}' does not match format '{}'", s, format),
                );
            }
        }
        Some(value.clone())
    }

    fn parse_number(
        &self,
        value: &Value,
        schema: &Schema,
        path: &JsonPath,
        errors: &mut SchemaErrors,
        integer: bool,
    ) -> Option<Value> {
        let number = match value {
            Value::Number(n) => n.clone(),
            Value::String(s) if integer => Number::from(s.trim().parse::<i64>().ok()?),
            Value::String(s) => Number::from_f64(s.trim().parse::<f64>().ok()?)?,
            _ => return None,
        };
        let number = if integer && !(number.is_i64() || number.is_u64()) {
            // 1.0 is an integer
            match number.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Number::from(f as i64)
                }
                Some(f) if f.fract() == 0.0 => {
                    errors.push(
                        path.child("format").to_string(),
                        format!("integer {} is out of range for format 'int64'", number),
                    );
                    return None;
                }
                _ => return None,
            }
        } else {
            number
        };
        let n = number.as_f64()?;
        if let Some((min, exclusive)) = schema.lower_bound() {
            if exclusive && n <= min {
                errors.push(
                    path.child("exclusiveMinimum").to_string(),
                    format!("{} is less than or equal to exclusive minimum value of {}", number, min),
                );
            } else if n < min {
                errors.push(
                    path.child("minimum").to_string(),
                    format!("{} is less than minimum value of {}", number, min),
                );
            }
        }
        if let Some((max, exclusive)) = schema.upper_bound() {
            if exclusive && n >= max {
                errors.push(
                    path.child("exclusiveMaximum").to_string(),
                    format!("{} is greater than or equal to exclusive maximum value of {}", number, max),
                );
            } else if n > max {
                errors.push(
                    path.child("maximum").to_string(),
                    format!("{} exceeds maximum value of {}", number, max),
                );
            }
        }
        if let Some(multiple) = schema.multiple_of {
            if multiple != 0.0 && ((n / multiple).fract()).abs() > f64::EPSILON {
                errors.push(
                    path.child("multipleOf").to_string(),
                    format!("{} is not a multiple of {}", number, multiple),
                );
            }
        }
        if integer && schema.format.as_deref() == Some("int32") {
            if n < i32::MIN as f64 || n > i32::MAX as f64 {
                errors.push(
                    path.child("format").to_string(),
                    format!("integer {} is out of range for format 'int32'", number),
                );
            }
        }
        if !integer && schema.format.as_deref() == Some("float") && n.abs() > f32::MAX as f64 {
            errors.push(
                path.child("format").to_string(),
                format!("number {} is out of range for format 'float'", number),
            );
        }
        Some(Value::Number(number))
    }

    fn parse_bool(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => Some(Value::Bool(s == "true")),
            _ => None,
        }
    }

    fn parse_array(
        &self,
        value: &Value,
        schema: &Schema,
        path: &JsonPath,
        errors: &mut SchemaErrors,
    ) -> Option<Value> {
        let list = value.as_array()?;
        if let Some(min) = schema.min_items {
            if list.len() < min {
                errors.push(
                    path.child("minItems").to_string(),
                    format!("item count {} is less than minimum count of {}", list.len(), min),
                );
            }
        }
        if let Some(max) = schema.max_items {
            if list.len() > max {
                errors.push(
                    path.child("maxItems").to_string(),
                    format!("item count {} exceeds maximum count of {}", list.len(), max),
                );
            }
        }
        let items = schema.items();
        let mut parsed = Vec::with_capacity(list.len());
        for (index, item) in list.iter().enumerate() {
            match &items {
                Some(items) => {
                    let item_path = path.child("items").child(index);
                    if let Some(item) = self.walk(item, items, &item_path, errors) {
                        parsed.push(item);
                    }
                }
                None => parsed.push(item.clone()),
            }
        }
        if schema.unique_items {
            for (index, item) in parsed.iter().enumerate() {
                if parsed[..index].iter().any(|other| same(other, item)) {
                    errors.push(
                        path.child("uniqueItems").to_string(),
                        format!("non-unique array item at index {}", index),
                    );
                    break;
                }
            }
        }
        Some(Value::Array(parsed))
    }

    fn parse_object(
        &self,
        value: &Value,
        schema: &Schema,
        path: &JsonPath,
        errors: &mut SchemaErrors,
    ) -> Option<Value> {
        let object = value.as_object()?;
        let mut parsed = Map::new();

        for name in &schema.required {
            if !object.contains_key(name) {
                errors.push(
                    path.child("required").to_string(),
                    format!("missing required property '{}'", name),
                );
            }
        }

        for (name, property) in &schema.properties {
            let Some(item) = object.get(name) else { continue };
            let Some(property) = property.value() else {
                parsed.insert(name.clone(), item.clone());
                continue;
            };
            let property_path = path.child("properties").child(name);
            if let Some(item) = self.walk(item, &property, &property_path, errors) {
                parsed.insert(name.clone(), item);
            }
        }

        for (name, item) in object {
            if schema.properties.contains_key(name) {
                continue;
            }
            match &schema.additional_properties {
                Some(AdditionalProperties::Schema(additional)) => {
                    match additional.value() {
                        Some(additional) => {
                            let item_path = path.child("additionalProperties").child(name);
                            if let Some(item) = self.walk(item, &additional, &item_path, errors) {
                                parsed.insert(name.clone(), item);
                            }
                        }
                        None => {
                            parsed.insert(name.clone(), item.clone());
                        }
                    }
                }
                Some(AdditionalProperties::Allowed(false)) => {
                    errors.push(
                        path.child("additionalProperties").to_string(),
                        format!("property '{}' not defined in schema", name),
                    );
                }
                None if !self.free_form && !schema.properties.is_empty() => {
                    errors.push(
                        path.child("additionalProperties").to_string(),
                        format!("property '{}' not defined in schema", name),
                    );
                }
                _ => {
                    parsed.insert(name.clone(), item.clone());
                }
            }
        }

        if let Some(min) = schema.min_properties {
            if object.len() < min {
                errors.push(
                    path.child("minProperties").to_string(),
                    format!("property count {} is less than minimum count of {}", object.len(), min),
                );
            }
        }
        if let Some(max) = schema.max_properties {
            if object.len() > max {
                errors.push(
                    path.child("maxProperties").to_string(),
                    format!("property count {} exceeds maximum count of {}", object.len(), max),
                );
            }
        }
        Some(Value::Object(parsed))
    }
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub(crate) fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| same(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| same(v, w)))
        }
        _ => a == b,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
