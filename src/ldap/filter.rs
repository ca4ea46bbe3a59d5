//! Search filters (RFC 4511 section 4.5.1) and their evaluation.

use crate::ldap::Entry;
use crate::ldap::ber::{BerError, Class, Packet};
use thiserror::Error;

pub const FILTER_AND: u32 = 0;
pub const FILTER_OR: u32 = 1;
pub const FILTER_NOT: u32 = 2;
pub const FILTER_EQUALITY_MATCH: u32 = 3;
pub const FILTER_SUBSTRINGS: u32 = 4;
pub const FILTER_GREATER_OR_EQUAL: u32 = 5;
pub const FILTER_LESS_OR_EQUAL: u32 = 6;
pub const FILTER_PRESENT: u32 = 7;
pub const FILTER_APPROX_MATCH: u32 = 8;

const SUBSTRING_INITIAL: u32 = 0;
const SUBSTRING_ANY: u32 = 1;
const SUBSTRING_FINAL: u32 = 2;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter {0} is not supported")]
    NotSupported(&'static str),
    #[error("invalid filter: {0}")]
    Invalid(#[from] BerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substring {
    Initial(String),
    Any(String),
    Final(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    EqualityMatch { attribute: String, value: String },
    Substrings { attribute: String, substrings: Vec<Substring> },
    GreaterOrEqual { attribute: String, value: String },
    LessOrEqual { attribute: String, value: String },
    Present(String),
    ApproxMatch { attribute: String, value: String },
}

impl Filter {
    pub fn decode(packet: &Packet) -> Result<Filter, FilterError> {
        if packet.class != Class::Context {
            return Err(BerError::invalid("filter", format!("class {:?}", packet.class)).into());
        }
        let filter = match packet.tag {
            FILTER_AND => Filter::And(Self::decode_all(packet)?),
            FILTER_OR => Filter::Or(Self::decode_all(packet)?),
            FILTER_NOT => Filter::Not(Box::new(Filter::decode(packet.child(0)?)?)),
            FILTER_EQUALITY_MATCH => {
                let (attribute, value) = assertion(packet)?;
                Filter::EqualityMatch { attribute, value }
            }
            FILTER_SUBSTRINGS => {
                let attribute = packet.child(0)?.as_str()?;
                let substrings = packet
                    .child(1)?
                    .children
                    .iter()
                    .map(|part| {
                        let text = part.as_str()?;
                        match part.tag {
                            SUBSTRING_INITIAL => Ok(Substring::Initial(text)),
                            SUBSTRING_ANY => Ok(Substring::Any(text)),
                            SUBSTRING_FINAL => Ok(Substring::Final(text)),
                            other => Err(BerError::invalid("substring", format!("tag {}", other))),
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Filter::Substrings {
                    attribute,
                    substrings,
                }
            }
            FILTER_GREATER_OR_EQUAL => {
                let (attribute, value) = assertion(packet)?;
                Filter::GreaterOrEqual { attribute, value }
            }
            FILTER_LESS_OR_EQUAL => {
                let (attribute, value) = assertion(packet)?;
                Filter::LessOrEqual { attribute, value }
            }
            FILTER_PRESENT => Filter::Present(packet.as_str()?),
            FILTER_APPROX_MATCH => {
                let (attribute, value) = assertion(packet)?;
                Filter::ApproxMatch { attribute, value }
            }
            _ => return Err(FilterError::NotSupported("extensible match")),
        };
        Ok(filter)
    }

    fn decode_all(packet: &Packet) -> Result<Vec<Filter>, FilterError> {
        packet.children.iter().map(Filter::decode).collect()
    }

    pub fn encode(&self) -> Packet {
        let context = |tag, children| Packet::constructed(Class::Context, tag, children);
        let pair = |attribute: &str, value: &str| {
            vec![Packet::octet_string(attribute), Packet::octet_string(value)]
        };
        match self {
            Filter::And(filters) => context(FILTER_AND, filters.iter().map(Filter::encode).collect()),
            Filter::Or(filters) => context(FILTER_OR, filters.iter().map(Filter::encode).collect()),
            Filter::Not(filter) => context(FILTER_NOT, vec![filter.encode()]),
            Filter::EqualityMatch { attribute, value } => {
                context(FILTER_EQUALITY_MATCH, pair(attribute, value))
            }
            Filter::Substrings {
                attribute,
                substrings,
            } => {
                let parts = substrings
                    .iter()
                    .map(|s| match s {
                        Substring::Initial(v) => (SUBSTRING_INITIAL, v),
                        Substring::Any(v) => (SUBSTRING_ANY, v),
                        Substring::Final(v) => (SUBSTRING_FINAL, v),
                    })
                    .map(|(tag, v)| Packet::primitive(Class::Context, tag, v.as_bytes().to_vec()))
                    .collect();
                context(
                    FILTER_SUBSTRINGS,
                    vec![Packet::octet_string(attribute), Packet::sequence(parts)],
                )
            }
            Filter::GreaterOrEqual { attribute, value } => {
                context(FILTER_GREATER_OR_EQUAL, pair(attribute, value))
            }
            Filter::LessOrEqual { attribute, value } => {
                context(FILTER_LESS_OR_EQUAL, pair(attribute, value))
            }
            Filter::Present(attribute) => {
                Packet::primitive(Class::Context, FILTER_PRESENT, attribute.as_bytes().to_vec())
            }
            Filter::ApproxMatch { attribute, value } => {
                context(FILTER_APPROX_MATCH, pair(attribute, value))
            }
        }
    }

    /// Evaluates the filter against one entry. Ordering and approximate
    /// matches are refused.
    pub fn matches(&self, entry: &Entry) -> Result<bool, FilterError> {
        match self {
            Filter::And(filters) => {
                for filter in filters {
                    if !filter.matches(entry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(filters) => {
                for filter in filters {
                    if filter.matches(entry)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(filter) => Ok(!filter.matches(entry)?),
            Filter::EqualityMatch { attribute, value } => Ok(entry
                .attribute(attribute)
                .unwrap_or_default()
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value))),
            Filter::Substrings {
                attribute,
                substrings,
            } => Ok(entry
                .attribute(attribute)
                .unwrap_or_default()
                .iter()
                .any(|v| matches_substrings(v, substrings))),
            Filter::Present(attribute) => Ok(entry.attribute(attribute).is_some()),
            Filter::GreaterOrEqual { .. } => Err(FilterError::NotSupported("greaterOrEqual")),
            Filter::LessOrEqual { .. } => Err(FilterError::NotSupported("lessOrEqual")),
            Filter::ApproxMatch { .. } => Err(FilterError::NotSupported("approxMatch")),
        }
    }
}

fn assertion(packet: &Packet) -> Result<(String, String), BerError> {
    Ok((packet.child(0)?.as_str()?, packet.child(1)?.as_str()?))
}

/// Matches the parts in order: `initial` anchors the start, `final` the
/// end, each `any` must follow the previous match.
fn matches_substrings(value: &str, substrings: &[Substring]) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();
    for substring in substrings {
        match substring {
            Substring::Initial(prefix) => match rest.strip_prefix(prefix.to_lowercase().as_str()) {
                Some(remaining) => rest = remaining,
                None => return false,
            },
            Substring::Any(part) => {
                let part = part.to_lowercase();
                match rest.find(part.as_str()) {
                    Some(index) => rest = &rest[index + part.len()..],
                    None => return false,
                }
            }
            Substring::Final(suffix) => {
                if !rest.ends_with(suffix.to_lowercase().as_str()) {
                    return false;
                }
                rest = "";
            }
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;

    fn user() -> Entry {
        Entry::new("cn=user,dc=foo,dc=com")
            .with("objectClass", &["top", "person"])
            .with("cn", &["User"])
            .with("mail", &["user@foo.com", "u.ser@example.org"])
    }

    fn eq(attribute: &str, value: &str) -> Filter {
        Filter::EqualityMatch {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_boolean_combinations() {
        let entry = user();
        assert!(Filter::Present("objectclass".into()).matches(&entry).unwrap());
        assert!(!Filter::Present("uid".into()).matches(&entry).unwrap());
        assert!(eq("OBJECTCLASS", "PERSON").matches(&entry).unwrap());
        let and = Filter::And(vec![eq("cn", "user"), eq("objectClass", "group")]);
        assert!(!and.matches(&entry).unwrap());
        let or = Filter::Or(vec![eq("cn", "nobody"), eq("objectClass", "top")]);
        assert!(or.matches(&entry).unwrap());
        assert!(Filter::Not(Box::new(and)).matches(&entry).unwrap());
        assert!(Filter::And(vec![]).matches(&entry).unwrap());
        assert!(!Filter::Or(vec![]).matches(&entry).unwrap());
    }

    #[test]
    fn test_substrings() {
        let entry = user();
        let filter = |substrings| Filter::Substrings {
            attribute: "mail".into(),
            substrings,
        };
        let initial = filter(vec![Substring::Initial("U.".into())]);
        assert!(initial.matches(&entry).unwrap());
        let any_final = filter(vec![
            Substring::Any("@".into()),
            Substring::Final(".com".into()),
        ]);
        assert!(any_final.matches(&entry).unwrap());
        let ordered = filter(vec![Substring::Any("foo".into()), Substring::Any("user".into())]);
        assert!(!ordered.matches(&entry).unwrap());
    }

    #[test]
    fn test_unsupported() {
        let filter = Filter::GreaterOrEqual {
            attribute: "uidNumber".into(),
            value: "10".into(),
        };
        let err = filter.matches(&user()).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_decode_wire_form() {
        let filter = Filter::And(vec![
            Filter::Present("objectClass".into()),
            Filter::Not(Box::new(eq("cn", "admin"))),
            Filter::Substrings {
                attribute: "mail".into(),
                substrings: vec![Substring::Initial("user".into()), Substring::Final(".com".into())],
            },
        ]);
        let bytes = filter.encode().encode();
        // (objectClass=*) alone is a primitive [7]
        assert_eq!(&Filter::Present("cn".into()).encode().encode(), &[0x87, 0x02, b'c', b'n']);
        let (packet, _) = Packet::decode(&bytes).unwrap();
        assert_eq!(Filter::decode(&packet).unwrap(), filter);
    }
}
