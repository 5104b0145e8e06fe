//! Parser for individual `.eml` files (bare RFC 5322 messages).

use std::path::Path;

use crate::error::{Result, ShelfError};
use crate::model::message::ParsedMessage;
use crate::parser::{header, mime};

/// Read and parse a message file from disk.
///
/// `label` is the name used in errors, normally the root-relative path.
pub fn parse_eml_file(path: impl AsRef<Path>, label: &str) -> Result<ParsedMessage> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| ShelfError::io(path, e))?;
    parse_eml_bytes(label, &data)
}

/// Parse an in-memory message.
///
/// Fails with [`ShelfError::Parse`] on empty input or when the header block
/// does not start with a well-formed field.
pub fn parse_eml_bytes(label: &str, data: &[u8]) -> Result<ParsedMessage> {
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ShelfError::parse(label, "empty file"));
    }

    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let header_end = find_header_end(data).unwrap_or(data.len());
    let raw_headers = header::decode_header_bytes(&data[..header_end]);

    header::validate_header_block(&raw_headers).map_err(|reason| ShelfError::parse(label, reason))?;

    let unfolded = header::unfold_headers(&raw_headers);
    let threading = header::threading_headers(&unfolded);

    Ok(mime::decode_message(data, raw_headers, threading))
}

/// Find the byte offset where headers end (position of the first blank line).
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if data[i..].starts_with(b"\r\n\r\n") {
            return Some(i);
        }
    }
    None
}
