//! Parser output for a single message file.
//!
//! These values are transient: the indexer keeps only a bounded preview
//! and attachment metadata, and the viewer re-parses the file on demand.

use chrono::{DateTime, Utc};

/// Headers relevant to cataloguing and threading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageHeaders {
    /// `Message-ID` without angle brackets.
    pub message_id: String,
    /// First identifier of `In-Reply-To`, without angle brackets.
    pub in_reply_to: String,
    /// All identifiers of `References`, oldest first.
    pub references: Vec<String>,
    /// Decoded subject line.
    pub subject: String,
    /// Sender address.
    pub sender: String,
    /// Sender display name.
    pub sender_name: String,
    /// `To:` addresses.
    pub recipients: Vec<String>,
    /// `Cc:` addresses.
    pub cc: Vec<String>,
    /// `Bcc:` addresses (rarely present in delivered mail).
    pub bcc: Vec<String>,
    pub date: Option<DateTime<Utc>>,
}

/// A decoded attachment, payload included.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAttachment {
    /// Filename from the MIME headers, or a generated `attachment_N`.
    pub filename: String,
    /// MIME content type (e.g. `"application/pdf"`).
    pub content_type: String,
    /// Decoded payload.
    pub data: Vec<u8>,
}

impl ParsedAttachment {
    /// Decoded size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Fully decoded message.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub headers: MessageHeaders,
    /// Plain-text body (from `text/plain`, or converted from HTML).
    pub text: Option<String>,
    /// HTML body, if present.
    pub html: Option<String>,
    /// Raw header block as text.
    pub raw_headers: String,
    pub attachments: Vec<ParsedAttachment>,
}
