use crate::REF_FIELD;
use crate::codec::{self, Decode, DecodeError, Format, Node};
use crate::error::{ReferenceError, SpecError};
use crate::openapi::patch::Patch;
use crate::types::json_path::JsonPath;
use dashmap::DashMap;
use percent_encoding::percent_decode_str;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};
use url::Url;

/// Supplies the bytes of documents named by external references.
pub trait Reader: Send + Sync {
    /// Returns `Ok(None)` when the reader has no document at `url`.
    fn read(&self, url: &Url) -> Result<Option<Vec<u8>>, std::io::Error>;
}

/// Reads `file://` URLs from the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReader;

impl Reader for FileReader {
    fn read(&self, url: &Url) -> Result<Option<Vec<u8>>, std::io::Error> {
        if url.scheme() != "file" {
            return Ok(None);
        }
        let path = match url.to_file_path() {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Serves documents registered up front, keyed by URL without fragment.
#[derive(Debug, Default)]
pub struct MemoryReader {
    documents: DashMap<String, Vec<u8>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: impl AsRef<str>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&self, url: impl AsRef<str>, bytes: impl Into<Vec<u8>>) {
        let key = match Url::parse(url.as_ref()) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => url.as_ref().to_owned(),
        };
        self.documents.insert(key, bytes.into());
    }
}

impl Reader for MemoryReader {
    fn read(&self, url: &Url) -> Result<Option<Vec<u8>>, std::io::Error> {
        Ok(self.documents.get(url.as_str()).map(|entry| entry.value().clone()))
    }
}

enum Link<T> {
    Empty,
    /// Inline value owned by the referring site.
    Owned(Arc<T>),
    /// Resolved reference pointing into the resolver table.
    Shared(Weak<T>),
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        match self {
            Link::Empty => Link::Empty,
            Link::Owned(arc) => Link::Owned(Arc::clone(arc)),
            Link::Shared(weak) => Link::Shared(Weak::clone(weak)),
        }
    }
}

/// A model slot that is either an inline value or a `$ref`.
///
/// Once resolved, every reference to the same absolute URI points at one
/// shared node, so self-referencing schemas form a cyclic graph without
/// owning themselves.
pub struct Ref<T> {
    pub reference: Option<String>,
    link: Link<T>,
}

impl<T> Ref<T> {
    pub fn new(value: T) -> Self {
        Ref {
            reference: None,
            link: Link::Owned(Arc::new(value)),
        }
    }

    pub fn to(reference: impl Into<String>) -> Self {
        Ref {
            reference: Some(reference.into()),
            link: Link::Empty,
        }
    }

    pub fn value(&self) -> Option<Arc<T>> {
        match &self.link {
            Link::Empty => None,
            Link::Owned(arc) => Some(Arc::clone(arc)),
            Link::Shared(weak) => weak.upgrade(),
        }
    }

    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self.link, Link::Empty)
    }

    /// Whether both slots point at the same node.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }
}

impl<T: Clone> Ref<T> {
    /// Mutable access to an inline value.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        match &mut self.link {
            Link::Owned(arc) => Some(Arc::make_mut(arc)),
            _ => None,
        }
    }
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Ref {
            reference: None,
            link: Link::Empty,
        }
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref {
            reference: self.reference.clone(),
            link: self.link.clone(),
        }
    }
}

impl<T: Debug> Debug for Ref<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.reference, &self.link) {
            (Some(reference), _) => write!(f, "Ref({})", reference),
            (None, Link::Owned(value)) => value.fmt(f),
            _ => write!(f, "Ref(<empty>)"),
        }
    }
}

impl<T: Serialize> Serialize for Ref<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(reference) = &self.reference {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry(REF_FIELD, reference)?;
            return map.end();
        }
        match &self.link {
            Link::Owned(value) => value.serialize(serializer),
            _ => serializer.serialize_none(),
        }
    }
}

impl<T: Decode> Decode for Ref<T> {
    fn decode(node: &Node<'_>) -> Result<Self, DecodeError> {
        if node.value().is_object() {
            if let Some(reference) = node.get_as_str(REF_FIELD)? {
                return Ok(Ref::to(reference));
            }
        }
        Ok(Ref::new(T::decode(node)?))
    }
}

impl<T: Patch + Clone> Patch for Ref<T> {
    fn patch(&mut self, other: &Self) {
        if other.reference.is_some() {
            *self = other.clone();
            return;
        }
        let Some(value) = other.value() else {
            return;
        };
        match self.get_mut() {
            Some(base) => base.patch(&value),
            None => *self = Ref::new((*value).clone()),
        }
    }
}

/// A model node that may contain references.
pub trait Resolve: Decode + Clone + Send + Sync + 'static {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<(), SpecError>;
}

enum Slot<T> {
    Pending(Weak<T>),
    Ready(Arc<T>),
}

/// Every node reached through a reference, keyed by absolute URI. A parsed
/// config keeps its table alive so the weak links stay valid.
#[derive(Default)]
pub struct References(HashMap<String, Box<dyn Any + Send + Sync>>);

impl References {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for References {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Installs resolved pointers into a freshly decoded model.
pub struct Resolver<'r> {
    reader: &'r dyn Reader,
    base: Url,
    documents: HashMap<String, Arc<Value>>,
    table: References,
}

impl<'r> Resolver<'r> {
    pub fn new(reader: &'r dyn Reader, base: Url, root: Value) -> Self {
        let mut documents = HashMap::new();
        documents.insert(document_key(&base), Arc::new(root));
        Resolver {
            reader,
            base,
            documents,
            table: References::default(),
        }
    }

    pub fn into_references(self) -> References {
        self.table
    }

    /// Fills `target` with the node its reference names, or walks into the
    /// inline value. A filled reference is never entered again.
    pub fn resolve<T: Resolve>(&mut self, target: &mut Ref<T>) -> Result<(), SpecError> {
        if let Some(reference) = target.reference.clone() {
            if target.is_resolved() {
                return Ok(());
            }
            let (url, value) = self.target(&reference)?;
            let key = url.to_string();
            if let Some(weak) = self.lookup::<T>(&key) {
                target.link = Link::Shared(weak);
                return Ok(());
            }
            let decoded = match codec::decode_from_value::<T>(&value) {
                Ok(decoded) => decoded,
                Err(e) => {
                    return Err(SpecError::from(e.unlocated())
                        .context(format!("decode reference '{}' failed", reference)));
                }
            };
            let arc = self.build(key, url, decoded)?;
            target.link = Link::Shared(Arc::downgrade(&arc));
            return Ok(());
        }
        if let Some(value) = target.get_mut() {
            value.resolve(self)?;
        }
        Ok(())
    }

    /// Resolves a named component so that references to its location share
    /// the component's own node.
    pub fn resolve_component<T: Resolve>(
        &mut self,
        pointer: &JsonPath,
        target: &mut Ref<T>,
    ) -> Result<(), SpecError> {
        if target.reference.is_some() {
            return self.resolve(target);
        }
        let mut url = self.base.clone();
        url.set_fragment(Some(&pointer.format_path()));
        let key = url.to_string();
        if let Some(Slot::Ready(arc)) = self.slot::<T>(&key) {
            target.link = Link::Owned(Arc::clone(arc));
            return Ok(());
        }
        let value = match std::mem::replace(&mut target.link, Link::Empty) {
            Link::Owned(arc) => Arc::try_unwrap(arc).unwrap_or_else(|shared| (*shared).clone()),
            other => {
                target.link = other;
                return Ok(());
            }
        };
        let base = self.base.clone();
        let arc = self.build(key, base, value)?;
        target.link = Link::Owned(arc);
        Ok(())
    }

    fn slot<T: 'static>(&self, key: &str) -> Option<&Slot<T>> {
        self.table.0.get(key)?.downcast_ref::<Slot<T>>()
    }

    fn lookup<T: 'static>(&self, key: &str) -> Option<Weak<T>> {
        match self.slot::<T>(key)? {
            Slot::Pending(weak) => Some(Weak::clone(weak)),
            Slot::Ready(arc) => Some(Arc::downgrade(arc)),
        }
    }

    fn build<T: Resolve>(&mut self, key: String, document: Url, value: T) -> Result<Arc<T>, SpecError> {
        let mut failure = None;
        let arc = Arc::new_cyclic(|weak: &Weak<T>| {
            self.table
                .0
                .insert(key.clone(), Box::new(Slot::Pending(Weak::clone(weak))));
            let base = std::mem::replace(&mut self.base, document);
            let mut value = value;
            if let Err(e) = value.resolve(self) {
                failure = Some(e);
            }
            self.base = base;
            value
        });
        if let Some(e) = failure {
            self.table.0.remove(&key);
            return Err(e);
        }
        self.table.0.insert(key, Box::new(Slot::Ready(Arc::clone(&arc))));
        Ok(arc)
    }

    /// Follows `reference` (and any reference chain it lands on) to a value.
    fn target(&mut self, reference: &str) -> Result<(Url, Value), ReferenceError> {
        let mut url = match self.base.join(reference) {
            Ok(url) => url,
            Err(e) => return Err(ReferenceError::format(reference, e.to_string())),
        };
        let mut seen = HashSet::new();
        loop {
            if !seen.insert(url.to_string()) {
                return Err(ReferenceError::cycle(reference));
            }
            let document = self.document(&url, reference)?;
            let fragment = percent_decode_str(url.fragment().unwrap_or_default())
                .decode_utf8_lossy()
                .into_owned();
            if !fragment.is_empty() && !fragment.starts_with('/') {
                return Err(ReferenceError::format(
                    reference,
                    format!("fragment '{}' is not a JSON pointer", fragment),
                ));
            }
            let node = match document.pointer(&fragment) {
                Some(node) => node,
                None => return Err(ReferenceError::not_found(reference, fragment)),
            };
            if node.is_null() {
                return Err(ReferenceError::unresolved(reference, "referenced value is null"));
            }
            match node.get(REF_FIELD).and_then(Value::as_str) {
                Some(next) => {
                    url = match url.join(next) {
                        Ok(url) => url,
                        Err(e) => return Err(ReferenceError::format(next, e.to_string())),
                    };
                }
                None => return Ok((url, node.clone())),
            }
        }
    }

    fn document(&mut self, url: &Url, reference: &str) -> Result<Arc<Value>, ReferenceError> {
        let key = document_key(url);
        if let Some(document) = self.documents.get(&key) {
            return Ok(Arc::clone(document));
        }
        let mut location = url.clone();
        location.set_fragment(None);
        log::debug!("reading referenced document {}", location);
        let bytes = match self.reader.read(&location) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Err(ReferenceError::unresolved(
                    reference,
                    format!("no data returned by reader for '{}'", location),
                ));
            }
            Err(e) => {
                return Err(ReferenceError::unresolved(
                    reference,
                    format!("read '{}' failed: {}", location, e),
                ));
            }
        };
        let value = match codec::decode_value(&bytes, Format::detect(location.as_str(), &bytes)) {
            Ok(value) => value,
            Err(e) => return Err(ReferenceError::unresolved(reference, e.to_string())),
        };
        let document = Arc::new(value);
        self.documents.insert(key, Arc::clone(&document));
        Ok(document)
    }
}

fn document_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.to_string()
}
