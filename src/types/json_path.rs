use crate::{ENCODED_BACKSLASH, ENCODED_TILDE, PATH_SEPARATOR, TILDE};
use std::fmt::{Display, Formatter};

/// A JSON pointer that renders as a URI fragment (`#/properties/foo/items/2`).
///
/// Segments are stored unescaped; escaping (`~` as `~0`, `/` as `~1`) happens
/// only when the pointer is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPath(pub Vec<String>);

impl JsonPath {
    pub fn new() -> Self {
        JsonPath(Vec::new())
    }

    pub fn add(&mut self, segment: impl AsRef<str>) -> &mut Self {
        self.0.push(segment.as_ref().to_owned());
        self
    }

    /// Returns a new pointer extended by one segment, leaving `self` as is.
    pub fn child(&self, segment: impl Display) -> JsonPath {
        let mut path = self.clone();
        path.0.push(segment.to_string());
        path
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the pointer without the leading `#`, e.g. `/paths/~1pets/get`.
    pub fn format_path(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            out.push_str(PATH_SEPARATOR);
            out.push_str(&escape(segment));
        }
        out
    }

    /// Parses a pointer such as `/components/schemas/Foo` or `#/a~1b`.
    pub fn parse(pointer: &str) -> JsonPath {
        let pointer = pointer.strip_prefix('#').unwrap_or(pointer);
        let pointer = pointer.strip_prefix(PATH_SEPARATOR).unwrap_or(pointer);
        if pointer.is_empty() {
            return JsonPath::new();
        }
        JsonPath(pointer.split(PATH_SEPARATOR).map(unescape).collect())
    }
}

impl Display for JsonPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.format_path())
    }
}

pub fn escape(segment: &str) -> String {
    if segment.contains(TILDE) || segment.contains(PATH_SEPARATOR) {
        segment
            .replace(TILDE, ENCODED_TILDE)
            .replace(PATH_SEPARATOR, ENCODED_BACKSLASH)
    } else {
        segment.to_owned()
    }
}

pub fn unescape(segment: &str) -> String {
    segment
        .replace(ENCODED_BACKSLASH, PATH_SEPARATOR)
        .replace(ENCODED_TILDE, TILDE)
}

#[cfg(test)]
mod test {
    use crate::types::json_path::JsonPath;

    #[test]
    fn test_root_pointer() {
        let path = JsonPath::new();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "#");
        assert_eq!(path.format_path(), "");
    }

    #[test]
    fn test_schema_pointer() {
        let mut path = JsonPath::new();
        path.add("properties").add("foo").add("items");
        let path = path.child(2).child("type");
        assert_eq!(path.to_string(), "#/properties/foo/items/2/type");
    }

    #[test]
    fn test_escaped_segments() {
        let mut path = JsonPath::new();
        path.add("paths").add("/foo/{id}").add("get");
        assert_eq!(path.format_path(), "/paths/~1foo~1{id}/get");

        let mut path = JsonPath::new();
        path.add("a~b/c");
        assert_eq!(path.format_path(), "/a~0b~1c");
    }

    #[test]
    fn test_parse_pointer() {
        let path = JsonPath::parse("#/paths/~1foo~1{id}/get");
        assert_eq!(path.0, vec!["paths", "/foo/{id}", "get"]);

        let path = JsonPath::parse("/components/schemas/Foo");
        assert_eq!(path.0, vec!["components", "schemas", "Foo"]);

        assert!(JsonPath::parse("#").is_root());
        assert!(JsonPath::parse("").is_root());
    }

    #[test]
    fn test_parse_keeps_literal_tilde_sequences() {
        // "~01" must decode to "~1", not "/"
        let path = JsonPath::parse("/a~01");
        assert_eq!(path.0, vec!["a~1"]);
    }
}
