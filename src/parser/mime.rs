//! MIME decoding via `mail-parser`: addresses, date, bodies, attachments,
//! and HTML-to-text conversion for the search preview.

use chrono::{DateTime, Utc};
use mail_parser::{Message, MessageParser, MessagePartId, MimeHeaders, PartType};

use crate::model::message::{MessageHeaders, ParsedAttachment, ParsedMessage};
use crate::parser::header::ThreadingHeaders;

/// Block-level tags that start a new line when converting HTML to text.
const BLOCK_TAGS: &[&str] = &[
    "br", "p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "blockquote",
];

/// Decode a complete message (headers + body) whose header block was already validated.
///
/// Threading identifiers come from the raw headers; everything else comes from
/// `mail-parser`. If `mail-parser` gives up, the text after the first blank
/// line is kept as the body so the message can still be catalogued.
pub fn decode_message(
    message_bytes: &[u8],
    raw_headers: String,
    threading: ThreadingHeaders,
) -> ParsedMessage {
    let mut headers = MessageHeaders {
        message_id: threading.message_id,
        in_reply_to: threading.in_reply_to,
        references: threading.references,
        ..MessageHeaders::default()
    };

    let Some(msg) = MessageParser::default().parse(message_bytes) else {
        return ParsedMessage {
            headers,
            text: Some(extract_body_fallback(message_bytes)),
            html: None,
            raw_headers,
            attachments: Vec::new(),
        };
    };

    headers.subject = msg.subject().unwrap_or_default().to_string();

    if let Some(from) = msg.from().and_then(|a| a.first()) {
        headers.sender = from.address.as_deref().unwrap_or_default().to_string();
        headers.sender_name = from.name.as_deref().unwrap_or_default().to_string();
    }
    headers.recipients = address_list(msg.to());
    headers.cc = address_list(msg.cc());
    headers.bcc = address_list(msg.bcc());
    headers.date = msg.date().and_then(|d| {
        DateTime::parse_from_rfc3339(&d.to_rfc3339())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    });

    // `mail-parser` synthesizes the missing alternative; keep only real parts.
    let html = match first_body(&msg, &msg.html_body) {
        Some(PartType::Html(h)) => Some(h.to_string()),
        _ => None,
    };
    let text = match first_body(&msg, &msg.text_body) {
        Some(PartType::Text(t)) => Some(t.to_string()),
        Some(PartType::Html(h)) => Some(html_to_text(h)),
        _ => html.as_deref().map(html_to_text),
    };

    let attachments = msg
        .attachments()
        .enumerate()
        .map(|(idx, part)| ParsedAttachment {
            filename: part
                .attachment_name()
                .map(String::from)
                .unwrap_or_else(|| format!("attachment_{idx}")),
            content_type: part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            data: part.contents().to_vec(),
        })
        .collect();

    ParsedMessage {
        headers,
        text,
        html,
        raw_headers,
        attachments,
    }
}

fn first_body<'a>(msg: &'a Message<'_>, ids: &[MessagePartId]) -> Option<&'a PartType<'a>> {
    ids.first().and_then(|&id| msg.part(id)).map(|part| &part.body)
}

/// Bare addresses of an address header, in order.
fn address_list(addresses: Option<&mail_parser::Address<'_>>) -> Vec<String> {
    addresses
        .map(|list| {
            list.iter()
                .filter_map(|a| a.address.as_deref())
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Everything after the first blank line.
fn extract_body_fallback(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    if let Some(pos) = text.find("\r\n\r\n") {
        text[pos + 4..].to_string()
    } else if let Some(pos) = text.find("\n\n") {
        text[pos + 2..].to_string()
    } else {
        String::new()
    }
}

/// Convert HTML to plain text for the search preview.
///
/// Drops `<script>`/`<style>` blocks, turns block tags into line breaks,
/// strips remaining tags, decodes common entities and collapses blank runs.
pub fn html_to_text(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut raw = String::with_capacity(html.len());
    let mut i = 0;

    while i < html.len() {
        if !html[i..].starts_with('<') {
            let next = html[i..].find('<').map_or(html.len(), |n| i + n);
            raw.push_str(&html[i..next]);
            i = next;
            continue;
        }

        let Some(close) = html[i..].find('>') else {
            break;
        };
        let end = i + close;
        let inner = &lower[i + 1..end];
        let is_closing = inner.starts_with('/');
        let name = inner
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");

        if !is_closing && (name == "script" || name == "style") {
            match lower[end..].find(&format!("</{name}")) {
                Some(offset) => {
                    i = end + offset;
                    continue;
                }
                None => break,
            }
        }

        if BLOCK_TAGS.contains(&name) {
            raw.push('\n');
        }
        i = end + 1;
    }

    let decoded = raw
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_blank = false;
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_blank {
                cleaned.push('\n');
            }
            prev_blank = true;
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_blank = false;
        }
    }
    cleaned.trim().to_string()
}
