//! Catalog records as stored in SQLite.

use chrono::{DateTime, Utc};

/// Metadata for one indexed message file.
///
/// Full content (HTML body, CC list, raw headers, attachment bytes) is never
/// stored; it is parsed again from `file_path` when requested.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EmailRecord {
    /// Store-generated row id.
    pub id: i64,
    /// Root-relative, forward-slash path. Unique across the catalog.
    pub file_path: String,
    /// `Message-ID` without angle brackets (empty if missing).
    pub message_id: String,
    /// `In-Reply-To` without angle brackets (empty if not a reply).
    pub in_reply_to: String,
    /// Message-IDs from the `References` header, oldest first.
    pub thread_references: Vec<String>,
    pub subject: String,
    /// Bare sender address.
    pub sender: String,
    /// Sender display name (may be empty).
    pub sender_name: String,
    /// Comma-separated `To:` addresses.
    pub recipients: String,
    /// Parsed `Date:` header, `None` when absent or unparseable.
    pub date: Option<DateTime<Utc>>,
    /// Leading slice of the body text, bounded for the search index.
    pub body_text_preview: String,
    pub has_attachments: bool,
    pub attachment_count: u32,
    /// Size of the source file in bytes.
    pub file_size: u64,
    pub indexed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EmailRecord {
    /// `true` if this message names a parent via `In-Reply-To`.
    pub fn is_reply(&self) -> bool {
        !self.in_reply_to.is_empty()
    }

    /// Sender formatted for display: `"Name <address>"` or just the address.
    pub fn sender_display(&self) -> String {
        if self.sender_name.is_empty() {
            self.sender.clone()
        } else {
            format!("{} <{}>", self.sender_name, self.sender)
        }
    }
}

/// An email row awaiting insertion (no id or timestamps yet).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEmail {
    pub file_path: String,
    pub message_id: String,
    pub in_reply_to: String,
    pub thread_references: Vec<String>,
    pub subject: String,
    pub sender: String,
    pub sender_name: String,
    pub recipients: String,
    pub date: Option<DateTime<Utc>>,
    pub body_text_preview: String,
    pub file_size: u64,
}

/// Attachment metadata. The binary payload lives only in the source file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentRecord {
    pub id: i64,
    /// Owning email row (cascade-deleted with it).
    pub email_id: i64,
    pub filename: String,
    pub content_type: String,
    /// Decoded size in bytes.
    pub size: u64,
}

/// An attachment row awaiting insertion; its email id is assigned during the flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAttachment {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// A distinct sender address with its most common display name.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SenderSummary {
    pub address: String,
    pub name: String,
    pub message_count: u64,
}

/// Catalog-wide counters.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CatalogStats {
    pub total_emails: u64,
    pub with_attachments: u64,
    pub total_attachments: u64,
    pub total_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub last_indexed: Option<DateTime<Utc>>,
}

/// One successfully parsed file: its email row and attachment rows, inserted together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedUnit {
    pub email: NewEmail,
    pub attachments: Vec<NewAttachment>,
}

impl ParsedUnit {
    pub fn file_path(&self) -> &str {
        &self.email.file_path
    }
}
