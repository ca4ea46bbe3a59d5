use crate::schema::format::anchored_pattern;
use crate::schema::parse::same;
use crate::schema::{AdditionalProperties, Schema};
use crate::types::primitive::OpenApiPrimitives;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Number, Value};

/// Produces sample data for a schema when a document carries no example.
pub trait DataGenerator: Send + Sync {
    fn generate(&self, schema: &Schema) -> Value;
}

const WORDS: [&str; 16] = [
    "alpha", "bravo", "cedar", "delta", "ember", "falcon", "garnet", "harbor", "iris", "juniper",
    "kestrel", "lumen", "maple", "nova", "orchid", "pebble",
];

const DEFAULT_MAX_DEPTH: usize = 6;

/// Schema-driven random data.
///
/// Examples and enums are preferred over invented values. Recursion stops at
/// `max_depth`, where arrays come out empty and objects keep no properties.
pub struct RandomGenerator {
    rng: Mutex<fastrand::Rng>,
    max_depth: usize,
}

impl Default for RandomGenerator {
    fn default() -> Self {
        RandomGenerator {
            rng: Mutex::new(fastrand::Rng::new()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        RandomGenerator {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn value(&self, schema: &Schema, depth: usize) -> Value {
        if let Some(example) = schema.example.as_ref().or(schema.examples.first()) {
            return example.clone();
        }
        if !schema.enumeration.is_empty() {
            let index = self.rng.lock().usize(..schema.enumeration.len());
            return schema.enumeration[index].clone();
        }
        if !schema.all_of.is_empty() {
            return self.all_of(schema, depth);
        }
        let branch = if !schema.one_of.is_empty() {
            Some(&schema.one_of)
        } else if !schema.any_of.is_empty() {
            Some(&schema.any_of)
        } else {
            None
        };
        if let Some(branches) = branch {
            let index = self.rng.lock().usize(..branches.len());
            if let Some(chosen) = branches[index].value() {
                return self.value(&chosen, depth);
            }
        }
        if let Some(default) = &schema.default {
            return default.clone();
        }

        match kind_of(schema) {
            OpenApiPrimitives::Null => Value::Null,
            OpenApiPrimitives::Bool => Value::Bool(self.rng.lock().bool()),
            OpenApiPrimitives::Integer => self.integer(schema),
            OpenApiPrimitives::Number => self.number(schema),
            OpenApiPrimitives::String => Value::String(self.string(schema)),
            OpenApiPrimitives::Array => self.array(schema, depth),
            OpenApiPrimitives::Object => self.object(schema, depth),
        }
    }

    fn all_of(&self, schema: &Schema, depth: usize) -> Value {
        let mut merged = Map::new();
        let mut last = Value::Null;
        for part in schema.all_of.iter().filter_map(|s| s.value()) {
            match self.value(&part, depth) {
                Value::Object(map) => merged.extend(map),
                other => last = other,
            }
        }
        if let Value::Object(own) = self.object(schema, depth) {
            merged.extend(own);
        }
        if merged.is_empty() && !last.is_null() {
            return last;
        }
        Value::Object(merged)
    }

    fn integer(&self, schema: &Schema) -> Value {
        let (low, high) = integer_range(schema);
        let mut rng = self.rng.lock();
        let mut n = rng.i64(low..=high);
        if let Some(step) = schema.multiple_of.filter(|m| *m >= 1.0) {
            let step = step as i64;
            n -= n.rem_euclid(step);
            if n < low {
                n += step;
            }
        }
        Value::Number(Number::from(n))
    }

    fn number(&self, schema: &Schema) -> Value {
        let low = schema.lower_bound().map(|(b, _)| b).unwrap_or(0.0);
        let high = schema
            .upper_bound()
            .map(|(b, _)| b)
            .unwrap_or(low.max(0.0) + 1000.0);
        let raw = low + self.rng.lock().f64() * (high - low);
        let mut n = (raw * 100.0).round() / 100.0;
        if let Some((bound, exclusive)) = schema.lower_bound() {
            if n < bound || (exclusive && n == bound) {
                n = bound + (high - bound) / 2.0;
            }
        }
        if let Some((bound, exclusive)) = schema.upper_bound() {
            if n > bound || (exclusive && n == bound) {
                n = low + (bound - low) / 2.0;
            }
        }
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }

    fn string(&self, schema: &Schema) -> String {
        let mut rng = self.rng.lock();
        if let Some(format) = schema.format.as_deref() {
            if let Some(value) = formatted(format, &mut rng) {
                return value;
            }
        }
        if let Some(pattern) = schema.pattern.as_deref() {
            if let Some(value) = pattern_candidate(pattern, &mut rng) {
                return value;
            }
        }
        let min = schema.min_length.unwrap_or(0);
        let max = schema.max_length.unwrap_or(min.max(12)).max(min);
        let mut text = String::new();
        while text.len() < min {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(WORDS[rng.usize(..WORDS.len())]);
        }
        if text.is_empty() {
            text.push_str(WORDS[rng.usize(..WORDS.len())]);
        }
        text.truncate(max.max(min));
        text
    }

    fn array(&self, schema: &Schema, depth: usize) -> Value {
        if depth >= self.max_depth {
            return Value::Array(Vec::new());
        }
        let Some(items) = schema.items() else {
            return Value::Array(Vec::new());
        };
        let min = schema.min_items.unwrap_or(1);
        let max = schema.max_items.unwrap_or(min + 2).max(min);
        let count = self.rng.lock().usize(min..=max);
        let mut list: Vec<Value> = Vec::with_capacity(count);
        let mut attempts = 0;
        while list.len() < count && attempts < count * 5 {
            attempts += 1;
            let item = self.value(&items, depth + 1);
            if schema.unique_items && list.iter().any(|v| same(v, &item)) {
                continue;
            }
            list.push(item);
        }
        Value::Array(list)
    }

    fn object(&self, schema: &Schema, depth: usize) -> Value {
        let mut map = Map::new();
        if depth >= self.max_depth {
            return Value::Object(map);
        }
        for (name, property) in &schema.properties {
            let Some(property) = property.value() else {
                continue;
            };
            if property.write_only {
                continue;
            }
            map.insert(name.clone(), self.value(&property, depth + 1));
        }
        if let Some(AdditionalProperties::Schema(extra)) = &schema.additional_properties {
            if let Some(extra) = extra.value() {
                let min = schema.min_properties.unwrap_or(0);
                let mut index = 0;
                while map.len() < min.max(1) {
                    index += 1;
                    map.insert(format!("key{}", index), self.value(&extra, depth + 1));
                }
            }
        }
        Value::Object(map)
    }
}

impl DataGenerator for RandomGenerator {
    fn generate(&self, schema: &Schema) -> Value {
        self.value(schema, 0)
    }
}

fn kind_of(schema: &Schema) -> OpenApiPrimitives {
    if let Some(kind) = schema.types.primary() {
        return kind;
    }
    if !schema.properties.is_empty() || schema.additional_properties.is_some() {
        OpenApiPrimitives::Object
    } else if schema.items.is_some() {
        OpenApiPrimitives::Array
    } else if schema.minimum.is_some() || schema.maximum.is_some() {
        OpenApiPrimitives::Number
    } else {
        OpenApiPrimitives::String
    }
}

fn integer_range(schema: &Schema) -> (i64, i64) {
    let (type_min, type_max) = match schema.format.as_deref() {
        Some("int32") => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    };
    let low = match schema.lower_bound() {
        Some((bound, true)) => bound.floor() as i64 + 1,
        Some((bound, false)) => bound.ceil() as i64,
        None => 0,
    };
    let high = match schema.upper_bound() {
        Some((bound, true)) => bound.ceil() as i64 - 1,
        Some((bound, false)) => bound.floor() as i64,
        None => low.saturating_add(1000),
    };
    let low = low.clamp(type_min, type_max);
    let high = high.clamp(low, type_max);
    (low, high)
}

fn formatted(format: &str, rng: &mut fastrand::Rng) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(2020, 1, 1)?;
    let value = match format {
        "date" => (epoch + Duration::days(rng.i64(0..2000)))
            .format("%Y-%m-%d")
            .to_string(),
        "date-time" => {
            let seconds = rng.i64(1_577_836_800..1_777_836_800);
            Utc.timestamp_opt(seconds, 0)
                .single()?
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        }
        "time" => format!(
            "{:02}:{:02}:{:02}",
            rng.u8(0..24),
            rng.u8(0..60),
            rng.u8(0..60)
        ),
        "email" => format!("{}@example.com", WORDS[rng.usize(..WORDS.len())]),
        "uuid" => uuid(rng),
        "uri" | "url" => format!("https://example.com/{}", WORDS[rng.usize(..WORDS.len())]),
        "hostname" => format!("{}.example.com", WORDS[rng.usize(..WORDS.len())]),
        "ipv4" => format!(
            "{}.{}.{}.{}",
            rng.u8(1..=254),
            rng.u8(..),
            rng.u8(..),
            rng.u8(1..=254)
        ),
        "ipv6" => (0..8)
            .map(|_| format!("{:x}", rng.u16(..)))
            .collect::<Vec<_>>()
            .join(":"),
        "byte" => "c2FtcGxl".to_owned(),
        _ => return None,
    };
    Some(value)
}

fn uuid(rng: &mut fastrand::Rng) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Tries a handful of simple shapes against `pattern`.
fn pattern_candidate(pattern: &str, rng: &mut fastrand::Rng) -> Option<String> {
    let regex = anchored_pattern(pattern).ok()?;
    let word = WORDS[rng.usize(..WORDS.len())];
    let digits = rng.u32(100..100_000).to_string();
    let candidates = [
        word.to_owned(),
        digits.clone(),
        word.to_ascii_uppercase(),
        format!("{}{}", word, digits),
        format!("{}-{}", word, digits),
        word[..1].to_ascii_uppercase() + &word[1..],
    ];
    candidates.into_iter().find(|c| regex.is_match(c))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_from_value;
    use crate::schema::Parser;
    use serde_json::json;

    fn schema(value: Value) -> Schema {
        decode_from_value(&value).unwrap()
    }

    #[test]
    fn test_generated_values_validate() {
        let generator = RandomGenerator::with_seed(7);
        let schema = schema(json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": {"type": "integer", "format": "int64", "minimum": 1, "maximum": 10},
                "name": {"type": "string", "minLength": 3, "maxLength": 20},
                "email": {"type": "string", "format": "email"},
                "created": {"type": "string", "format": "date-time"},
                "ref": {"type": "string", "format": "uuid"},
                "score": {"type": "number", "minimum": 0, "maximum": 5},
                "tags": {"type": "array", "items": {"type": "string"}, "minItems": 2, "uniqueItems": true},
                "status": {"type": "string", "enum": ["available", "sold"]}
            }
        }));
        for _ in 0..20 {
            let value = generator.generate(&schema);
            Parser::new()
                .parse_schema(&value, &schema)
                .unwrap_or_else(|e| panic!("{} for {}", e, value));
        }
    }

    #[test]
    fn test_example_wins() {
        let generator = RandomGenerator::new();
        let schema = schema(json!({"type": "string", "example": "fixed"}));
        assert_eq!(generator.generate(&schema), json!("fixed"));
    }

    #[test]
    fn test_all_of_merges_objects() {
        let generator = RandomGenerator::with_seed(1);
        let schema = schema(json!({
            "allOf": [
                {"type": "object", "properties": {"a": {"type": "integer"}}},
                {"type": "object", "properties": {"b": {"type": "boolean"}}}
            ]
        }));
        let value = generator.generate(&schema);
        assert!(value.get("a").is_some_and(Value::is_i64));
        assert!(value.get("b").is_some_and(Value::is_boolean));
    }

    #[test]
    fn test_depth_limit() {
        let generator = RandomGenerator::with_seed(3).max_depth(1);
        let schema = schema(json!({
            "type": "object",
            "properties": {"child": {"type": "object", "properties": {"x": {"type": "string"}}}}
        }));
        assert_eq!(generator.generate(&schema), json!({"child": {}}));
    }

    #[test]
    fn test_integer_range_respects_exclusive_bounds() {
        let schema = schema(json!({"type": "integer", "minimum": 1, "exclusiveMinimum": true, "maximum": 3}));
        assert_eq!(integer_range(&schema), (2, 3));
    }
}
