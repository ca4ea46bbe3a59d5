use dashmap::{DashMap, Entry};
use jsonschema::{Draft, Validator};
use regex::Regex;
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};

/// String formats checked by the schema engine. Others are accepted as is.
const CHECKED_FORMATS: &[&str] = &[
    "date",
    "date-time",
    "time",
    "email",
    "uuid",
    "ipv4",
    "ipv6",
    "hostname",
    "uri",
    "uri-reference",
];

fn format_validators() -> &'static DashMap<String, Arc<Validator>> {
    static VALIDATORS: OnceLock<DashMap<String, Arc<Validator>>> = OnceLock::new();
    VALIDATORS.get_or_init(DashMap::new)
}

fn patterns() -> &'static DashMap<String, Arc<Regex>> {
    static PATTERNS: OnceLock<DashMap<String, Arc<Regex>>> = OnceLock::new();
    PATTERNS.get_or_init(DashMap::new)
}

fn format_validator(format: &str) -> Option<Arc<Validator>> {
    match format_validators().entry(format.to_owned()) {
        Entry::Occupied(e) => Some(Arc::clone(e.get())),
        Entry::Vacant(e) => {
            let validator = match Validator::options()
                .with_draft(Draft::Draft202012)
                .should_validate_formats(true)
                .build(&json!({"format": format}))
            {
                Ok(validator) => Arc::new(validator),
                Err(err) => {
                    log::warn!("unable to build validator for format '{}': {}", format, err);
                    return None;
                }
            };
            e.insert(Arc::clone(&validator));
            Some(validator)
        }
    }
}

/// Checks a string against a known format. Unknown formats pass.
pub fn is_valid_format(format: &str, value: &str) -> bool {
    if !CHECKED_FORMATS.contains(&format) {
        return true;
    }
    match format_validator(format) {
        Some(validator) => validator.is_valid(&Value::String(value.to_owned())),
        None => true,
    }
}

/// Compiles an anchored pattern once and caches it.
pub fn anchored_pattern(pattern: &str) -> Result<Arc<Regex>, regex::Error> {
    if let Some(regex) = patterns().get(pattern) {
        return Ok(Arc::clone(regex.value()));
    }
    let regex = Arc::new(Regex::new(&format!("^(?:{})$", pattern))?);
    patterns().insert(pattern.to_owned(), Arc::clone(&regex));
    Ok(regex)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_formats() {
        assert!(is_valid_format("email", "alice@example.com"));
        assert!(!is_valid_format("email", "alice"));
        assert!(is_valid_format("uuid", "f81d4fae-7dec-11d0-a765-00a0c91e6bf6"));
        assert!(!is_valid_format("uuid", "nope"));
        assert!(is_valid_format("date", "2024-02-29"));
        assert!(!is_valid_format("date", "2024-13-01"));
        assert!(is_valid_format("ipv4", "127.0.0.1"));
        assert!(is_valid_format("unknown-format", "anything"));
    }

    #[test]
    fn test_anchored_pattern() {
        let regex = anchored_pattern("[a-z]+").unwrap();
        assert!(regex.is_match("abc"));
        assert!(!regex.is_match("abc1"));
        assert!(anchored_pattern("(").is_err());
    }
}
