//! Content type detection for raw payloads.

const SIGNATURES: [(&[u8], &str); 8] = [
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"RIFF", "audio/wave"),
];

/// Guesses the media type of `bytes` from magic numbers, then from the
/// shape of the text.
pub fn sniff(bytes: &[u8]) -> &'static str {
    if bytes.is_empty() {
        return "text/plain; charset=utf-8";
    }
    if let Some((_, content_type)) = SIGNATURES.iter().find(|(magic, _)| bytes.starts_with(magic)) {
        return *content_type;
    }
    let Ok(text) = std::str::from_utf8(bytes) else {
        return "application/octet-stream";
    };
    if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
        return "application/octet-stream";
    }
    let trimmed = text.trim_start();
    let head = trimmed.get(..trimmed.len().min(14)).unwrap_or(trimmed).to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return "text/html; charset=utf-8";
    }
    if head.starts_with("<?xml") || (head.starts_with('<') && trimmed.trim_end().ends_with('>')) {
        return "text/xml; charset=utf-8";
    }
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return "application/json";
    }
    "text/plain; charset=utf-8"
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n\0\0"), "image/png");
        assert_eq!(sniff(b"%PDF-1.7"), "application/pdf");
        assert_eq!(sniff(b"  {\"a\": 1}"), "application/json");
        assert_eq!(sniff(b"<?xml version=\"1.0\"?><a/>"), "text/xml; charset=utf-8");
        assert_eq!(sniff(b"<!DOCTYPE html><html></html>"), "text/html; charset=utf-8");
        assert_eq!(sniff(b"hello"), "text/plain; charset=utf-8");
        assert_eq!(sniff(&[0, 1, 2, 0xfe]), "application/octet-stream");
    }
}
