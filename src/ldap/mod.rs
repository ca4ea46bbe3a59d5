//! An LDAPv3 server over an in-memory directory.

pub mod ber;
pub mod filter;
pub mod server;

use crate::codec::{Decode, DecodeError, Format, Node, decode};
use crate::error::StructuralError;
use indexmap::IndexMap;

pub use crate::ldap::server::{LdapServer, ServerHandle};

/// Decoded `ldap` configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub ldap: String,
    pub info: Info,
    pub server: ServerConfig,
    pub root: EntryConfig,
    pub entries: IndexMap<String, EntryConfig>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerConfig {
    /// Listen address such as `:389` or `127.0.0.1:10389`.
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryConfig {
    pub dn: Option<String>,
    pub attributes: IndexMap<String, Vec<String>>,
}

impl Config {
    /// Decodes a JSON or YAML configuration; `name` picks the syntax.
    pub fn decode_document(name: &str, bytes: &[u8]) -> Result<Config, StructuralError> {
        decode(bytes, Format::detect(name, bytes))
    }
}

impl Decode for Config {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Config {
            ldap: node.get_as_str("ldap")?.unwrap_or_default(),
            info: node.decode_or_default("info")?,
            server: node.decode_or_default("server")?,
            root: node.decode_or_default("root")?,
            entries: node.decode_map("entries")?,
        })
    }
}

impl Decode for Info {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(Info {
            name: node.get_as_str("name")?.unwrap_or_default(),
            description: node.get_as_str("description")?,
        })
    }
}

impl Decode for ServerConfig {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        Ok(ServerConfig {
            address: node.get_as_str("address")?,
        })
    }
}

impl Decode for EntryConfig {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        node.require_object()?;
        let mut attributes = IndexMap::new();
        if let Some(map) = node.get("attributes") {
            for (name, values) in map.entries()? {
                attributes.insert(name.to_owned(), attribute_values(&values)?);
            }
        }
        Ok(EntryConfig {
            dn: node.get_as_str("dn")?,
            attributes,
        })
    }
}

/// A single scalar is shorthand for a one-element list.
fn attribute_values(node: &Node<'_>) -> Result<Vec<String>, DecodeError> {
    if node.value().is_array() {
        return node.elements()?.iter().map(scalar).collect();
    }
    Ok(vec![scalar(node)?])
}

fn scalar(node: &Node<'_>) -> Result<String, DecodeError> {
    match node.value() {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(node.type_mismatch("string")),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attributes: IndexMap<String, Vec<String>>,
}

impl Entry {
    pub fn new(dn: impl Into<String>) -> Self {
        Entry {
            dn: dn.into(),
            attributes: IndexMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, values: &[&str]) -> Self {
        self.attributes
            .insert(name.into(), values.iter().map(|v| (*v).to_owned()).collect());
        self
    }

    /// Values of an attribute, matching the name case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }
}

/// The entries served by one server: a root DSE plus entries keyed by
/// normalized DN. Frozen once built; reloads build a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    pub root: Entry,
    entries: IndexMap<String, Entry>,
}

impl Directory {
    pub fn new(root: Entry) -> Self {
        Directory {
            root,
            entries: IndexMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut directory = Directory::new(Entry {
            dn: String::new(),
            attributes: config.root.attributes.clone(),
        });
        for (key, entry) in &config.entries {
            let dn = entry.dn.clone().unwrap_or_else(|| key.clone());
            directory.insert(Entry {
                dn,
                attributes: entry.attributes.clone(),
            });
        }
        directory
    }

    pub fn insert(&mut self, entry: Entry) {
        self.entries.insert(normalize_dn(&entry.dn), entry);
    }

    pub fn get(&self, dn: &str) -> Option<&Entry> {
        self.entries.get(&normalize_dn(dn))
    }

    /// Entries with their normalized DN, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lower-cases a DN and drops blanks around its separators, so
/// `CN=User, DC=Foo` and `cn=user,dc=foo` compare equal. An escaped `\,`
/// stays inside its value.
pub fn normalize_dn(dn: &str) -> String {
    split_rdns(dn)
        .into_iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((name, value)) => format!(
                "{}={}",
                name.trim().to_ascii_lowercase(),
                value.trim().to_lowercase()
            ),
            None => rdn.trim().to_lowercase(),
        })
        .filter(|rdn| !rdn.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// The normalized DN one level up; empty for a single RDN.
pub fn parent_dn(normalized: &str) -> &str {
    separators(normalized)
        .next()
        .map(|index| &normalized[index + 1..])
        .unwrap_or("")
}

/// Byte offsets of the commas that separate RDNs.
fn separators(dn: &str) -> impl Iterator<Item = usize> + '_ {
    let mut escaped = false;
    dn.char_indices().filter_map(move |(index, c)| {
        let separator = c == ',' && !escaped;
        escaped = c == '\\' && !escaped;
        separator.then_some(index)
    })
}

fn split_rdns(dn: &str) -> Vec<&str> {
    let mut rdns = Vec::new();
    let mut start = 0;
    for index in separators(dn) {
        rdns.push(&dn[start..index]);
        start = index + 1;
    }
    rdns.push(&dn[start..]);
    rdns
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    BaseObject,
    SingleLevel,
    WholeSubtree,
}

impl Scope {
    pub fn from_code(code: i64) -> Option<Scope> {
        match code {
            0 => Some(Scope::BaseObject),
            1 => Some(Scope::SingleLevel),
            2 => Some(Scope::WholeSubtree),
            _ => None,
        }
    }

    /// Whether `dn` lies in this scope under `base`. Both are normalized.
    pub fn contains(&self, base: &str, dn: &str) -> bool {
        match self {
            Scope::BaseObject => dn == base,
            Scope::SingleLevel => !dn.is_empty() && parent_dn(dn) == base,
            Scope::WholeSubtree => {
                base.is_empty()
                    || dn == base
                    || dn.strip_suffix(base).is_some_and(|rest| {
                        separators(rest).last().is_some_and(|index| index + 1 == rest.len())
                    })
            }
        }
    }
}

/// LDAP result codes the server answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success = 0,
    ProtocolError = 2,
    TimeLimitExceeded = 3,
    SizeLimitExceeded = 4,
    AuthMethodNotSupported = 7,
    UnwillingToPerform = 53,
}

impl ResultCode {
    pub fn code(&self) -> i64 {
        *self as i64
    }
}
