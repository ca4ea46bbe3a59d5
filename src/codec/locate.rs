//! Maps a field path back to a byte offset inside the source document.

/// Converts a 1-based line and column into a byte offset.
pub fn line_column_offset(source: &[u8], line: usize, column: usize) -> usize {
    let mut start = 0;
    let mut current = 1;
    while current < line {
        match source[start..].iter().position(|b| *b == b'\n') {
            Some(newline) => start += newline + 1,
            None => break,
        }
        current += 1;
    }
    (start + column.saturating_sub(1)).min(source.len())
}

/// Finds the offset of the value (or the key, when `key` is set) at `path`
/// in a JSON document.
pub fn json_offset(source: &[u8], path: &[String], key: bool) -> Option<usize> {
    let mut scanner = Scanner { src: source, pos: 0 };
    scanner.find(path, key)
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    fn find(&mut self, path: &[String], key: bool) -> Option<usize> {
        self.skip_ws();
        let Some((segment, rest)) = path.split_first() else {
            return Some(self.pos);
        };
        match self.peek()? {
            b'{' => {
                self.pos += 1;
                loop {
                    self.skip_ws();
                    match self.peek()? {
                        b'}' => return None,
                        b',' => {
                            self.pos += 1;
                            continue;
                        }
                        _ => {}
                    }
                    let key_start = self.pos;
                    let name = self.string()?;
                    self.skip_ws();
                    if self.peek()? != b':' {
                        return None;
                    }
                    self.pos += 1;
                    if &name == segment {
                        if rest.is_empty() && key {
                            return Some(key_start);
                        }
                        return self.find(rest, key);
                    }
                    self.skip_value()?;
                }
            }
            b'[' => {
                let index: usize = segment.parse().ok()?;
                self.pos += 1;
                let mut current = 0;
                loop {
                    self.skip_ws();
                    match self.peek()? {
                        b']' => return None,
                        b',' => {
                            self.pos += 1;
                            continue;
                        }
                        _ => {}
                    }
                    if current == index {
                        return self.find(rest, key);
                    }
                    self.skip_value()?;
                    current += 1;
                }
            }
            _ => None,
        }
    }

    fn string(&mut self) -> Option<String> {
        if self.peek()? != b'"' {
            return None;
        }
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            let b = self.peek()?;
            self.pos += 1;
            match b {
                b'"' => return Some(String::from_utf8_lossy(&out).into_owned()),
                b'\\' => {
                    let escaped = self.peek()?;
                    self.pos += 1;
                    match escaped {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'u' => {
                            let hex = self.src.get(self.pos..self.pos + 4)?;
                            self.pos += 4;
                            let code = u32::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?;
                            let c = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        }
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn skip_value(&mut self) -> Option<()> {
        self.skip_ws();
        match self.peek()? {
            b'"' => {
                self.string()?;
            }
            b'{' | b'[' => {
                let mut depth = 0usize;
                loop {
                    match self.peek()? {
                        b'"' => {
                            self.string()?;
                            continue;
                        }
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth -= 1;
                            if depth == 0 {
                                self.pos += 1;
                                return Some(());
                            }
                        }
                        _ => {}
                    }
                    self.pos += 1;
                }
            }
            _ => {
                while let Some(b) = self.peek() {
                    if b == b',' || b == b'}' || b == b']' || b.is_ascii_whitespace() {
                        break;
                    }
                    self.pos += 1;
                }
            }
        }
        Some(())
    }
}

struct Line<'a> {
    indent: usize,
    offset: usize,
    text: &'a str,
    item: bool,
}

fn yaml_lines(source: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for physical in source.split_inclusive('\n') {
        let start = offset;
        offset += physical.len();
        let text = physical.trim_end_matches(['\n', '\r']);
        let content = text.trim_start_matches(' ');
        if content.is_empty() || content.starts_with('#') || content == "---" {
            continue;
        }
        let mut indent = text.len() - content.len();
        let mut rest = content;
        while rest == "-" || rest.starts_with("- ") {
            lines.push(Line {
                indent,
                offset: start + indent,
                text: "-",
                item: true,
            });
            let after = rest[1..].trim_start_matches(' ');
            indent += rest.len() - after.len();
            rest = after;
        }
        if !rest.is_empty() {
            lines.push(Line {
                indent,
                offset: start + indent,
                text: rest,
                item: false,
            });
        }
    }
    lines
}

fn yaml_key(text: &str) -> Option<(String, usize)> {
    let (key, after) = if let Some(quote) = text.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let end = text[1..].find(quote)? + 1;
        (text[1..end].to_owned(), end + 1)
    } else {
        let colon = text
            .char_indices()
            .find(|(i, c)| *c == ':' && matches!(text[i + 1..].chars().next(), None | Some(' ')))
            .map(|(i, _)| i)?;
        (text[..colon].trim_end().to_owned(), colon)
    };
    if !text[after..].starts_with(':') {
        return None;
    }
    Some((key, after + 1))
}

/// Best-effort offset lookup for block-style YAML.
pub fn yaml_offset(source: &[u8], path: &[String], key: bool) -> Option<usize> {
    let source = std::str::from_utf8(source).ok()?;
    let lines = yaml_lines(source);
    if path.is_empty() {
        return lines.first().map(|l| l.offset);
    }
    let mut index = 0;
    let mut parent: Option<(usize, bool)> = None;
    for (depth, segment) in path.iter().enumerate() {
        let mut child_indent = None;
        let mut items = 0usize;
        let mut matched = None;
        while index < lines.len() {
            let line = &lines[index];
            if let Some((indent, is_key)) = parent {
                if line.indent < indent || (line.indent == indent && !(line.item && is_key)) {
                    break;
                }
            }
            let expected = *child_indent.get_or_insert(line.indent);
            if line.indent == expected {
                if line.item {
                    if segment.parse::<usize>().ok() == Some(items) {
                        matched = Some(index);
                        break;
                    }
                    items += 1;
                } else if let Some((name, _)) = yaml_key(line.text) {
                    if &name == segment {
                        matched = Some(index);
                        break;
                    }
                }
            }
            index += 1;
        }
        let found = matched?;
        let line = &lines[found];
        if depth + 1 == path.len() {
            if key || line.item {
                return Some(if line.item {
                    lines.get(found + 1).map(|l| l.offset).unwrap_or(line.offset)
                } else {
                    line.offset
                });
            }
            let (_, after) = yaml_key(line.text)?;
            let inline = &line.text[after..];
            let trimmed = inline.trim_start();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                return Some(line.offset + after + (inline.len() - trimmed.len()));
            }
            return lines.get(found + 1).map(|l| l.offset);
        }
        parent = Some((line.indent, !line.item));
        index = found + 1;
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_json_key_offset() {
        let source = br#"{"responses":{"foo":{}}}"#;
        assert_eq!(json_offset(source, &path(&["responses", "foo"]), true), Some(14));
        assert_eq!(json_offset(source, &path(&["responses", "foo"]), false), Some(20));
    }

    #[test]
    fn test_json_array_index() {
        let source = br#"{"a": [1, {"b": "x"}, [true]]}"#;
        assert_eq!(json_offset(source, &path(&["a", "2"]), false), Some(22));
        assert_eq!(json_offset(source, &path(&["a", "1", "b"]), false), Some(16));
        assert_eq!(json_offset(source, &path(&["a", "5"]), false), None);
    }

    #[test]
    fn test_json_skips_strings_with_brackets() {
        let source = br#"{"x": "]}", "y": 1}"#;
        assert_eq!(json_offset(source, &path(&["y"]), false), Some(17));
    }

    #[test]
    fn test_yaml_offsets() {
        let source = "openapi: 3.0.0\nresponses:\n  foo:\n    description: bar\n";
        assert_eq!(
            yaml_offset(source.as_bytes(), &path(&["responses", "foo"]), true),
            Some(28)
        );
        assert_eq!(
            yaml_offset(source.as_bytes(), &path(&["responses", "foo", "description"]), false),
            Some(50)
        );
    }

    #[test]
    fn test_yaml_sequences() {
        let source = "tags:\n- a\n- name: b\n  value: c\n";
        assert_eq!(yaml_offset(source.as_bytes(), &path(&["tags", "1", "value"]), false), Some(29));
        assert_eq!(yaml_offset(source.as_bytes(), &path(&["tags", "0"]), false), Some(8));
    }

    #[test]
    fn test_line_column() {
        let source = b"ab\ncd\nef";
        assert_eq!(line_column_offset(source, 1, 1), 0);
        assert_eq!(line_column_offset(source, 2, 2), 4);
        assert_eq!(line_column_offset(source, 3, 1), 6);
    }
}
