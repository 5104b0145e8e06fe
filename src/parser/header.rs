//! Raw RFC 5322 header handling: byte decoding, unfolding, and the
//! identifier headers used for threading.

/// Identifier headers extracted from a raw header block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadingHeaders {
    pub message_id: String,
    pub in_reply_to: String,
    pub references: Vec<String>,
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Reject header blocks that do not start with a well-formed field.
///
/// The first line must be `name: value` where `name` is non-empty printable
/// ASCII without spaces. Plain text files and binary blobs fail here.
pub fn validate_header_block(text: &str) -> std::result::Result<(), String> {
    let first = text.lines().next().ok_or("empty header block")?;

    if first.starts_with(' ') || first.starts_with('\t') {
        return Err("header block starts with a continuation line".into());
    }

    let Some(colon) = first.find(':') else {
        return Err(format!("malformed header line: {}", preview(first)));
    };

    let name = &first[..colon];
    let valid_name = !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b));
    if !valid_name {
        return Err(format!("malformed header name: {}", preview(name)));
    }
    Ok(())
}

/// Get the first value for a header name (case-insensitive).
pub fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Extract `Message-ID`, `In-Reply-To` and `References` from unfolded headers.
pub fn threading_headers(headers: &[(String, String)]) -> ThreadingHeaders {
    let message_id = get_header(headers, "message-id")
        .map(first_id)
        .unwrap_or_default();

    let in_reply_to = get_header(headers, "in-reply-to")
        .map(first_id)
        .unwrap_or_default();

    let references = get_header(headers, "references")
        .map(all_ids)
        .unwrap_or_default();

    ThreadingHeaders {
        message_id,
        in_reply_to,
        references,
    }
}

/// Normalize a Message-ID by stripping angle brackets and whitespace.
pub fn normalize_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// First `<…>` token of a header value, or the whole trimmed value when unbracketed.
fn first_id(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(len) = trimmed[start..].find('>') {
            return normalize_id(&trimmed[start..start + len + 1]);
        }
    }
    trimmed
        .split_whitespace()
        .next()
        .map(normalize_id)
        .unwrap_or_default()
}

/// Every `<…>` token of a header value; unbracketed values fall back to whitespace splitting.
fn all_ids(value: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut remaining = value;
    while let Some(start) = remaining.find('<') {
        let Some(len) = remaining[start..].find('>') else {
            break;
        };
        let id = normalize_id(&remaining[start..start + len + 1]);
        if !id.is_empty() {
            ids.push(id);
        }
        remaining = &remaining[start + len + 1..];
    }

    if ids.is_empty() {
        ids = value
            .split_whitespace()
            .map(normalize_id)
            .filter(|id| !id.is_empty())
            .collect();
    }
    ids
}

fn preview(s: &str) -> String {
    s.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfold_continuation_lines() {
        let text = "Subject: a long\n  subject line\nReferences: <a@x>\n\t<b@x>\n";
        let headers = unfold_headers(text);
        assert_eq!(get_header(&headers, "subject"), Some("a long subject line"));
        assert_eq!(get_header(&headers, "references"), Some("<a@x> <b@x>"));
    }

    #[test]
    fn test_threading_headers_strip_brackets() {
        let headers = unfold_headers(
            "Message-ID: <m3@example.com>\nIn-Reply-To: <m2@example.com> (comment)\nReferences: <m1@example.com> <m2@example.com>\n",
        );
        let t = threading_headers(&headers);
        assert_eq!(t.message_id, "m3@example.com");
        assert_eq!(t.in_reply_to, "m2@example.com");
        assert_eq!(t.references, vec!["m1@example.com", "m2@example.com"]);
    }

    #[test]
    fn test_unbracketed_ids() {
        let headers = unfold_headers("Message-ID: bare@example.com\nReferences: a@x b@x\n");
        let t = threading_headers(&headers);
        assert_eq!(t.message_id, "bare@example.com");
        assert_eq!(t.references, vec!["a@x", "b@x"]);
        assert_eq!(t.in_reply_to, "");
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        let bytes = b"Subject: caf\xe9\n";
        assert_eq!(decode_header_bytes(bytes), "Subject: café\n");
    }

    #[test]
    fn test_validate_header_block() {
        assert!(validate_header_block("From: a@b.com\nSubject: x").is_ok());
        assert!(validate_header_block("X-Custom-Header: 1").is_ok());
        assert!(validate_header_block("this is not an email").is_err());
        assert!(validate_header_block(" continuation: first").is_err());
        assert!(validate_header_block("bad name: value").is_err());
        assert!(validate_header_block("").is_err());
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("<msg001@example.com>"), "msg001@example.com");
        assert_eq!(normalize_id("  <msg@ex.com>  "), "msg@ex.com");
        assert_eq!(normalize_id("msg@ex.com"), "msg@ex.com");
    }
}
