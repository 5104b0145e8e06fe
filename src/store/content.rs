//! Full message content, read back from the source file on demand.
//!
//! The catalog keeps only metadata and a bounded preview. Bodies, CC lists,
//! raw headers and attachment bytes are parsed again from disk, always through
//! the [`PathResolver`] so a tampered `file_path` cannot escape the root.

use tracing::debug;

use crate::error::{Result, ShelfError};
use crate::model::email::{AttachmentRecord, EmailRecord};
use crate::model::message::ParsedMessage;
use crate::parser::eml;
use crate::scan::PathResolver;
use crate::store::Database;

/// Everything known about one email, catalog row plus re-parsed content.
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub record: EmailRecord,
    pub text: Option<String>,
    pub html: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub raw_headers: String,
    pub attachments: Vec<AttachmentRecord>,
}

/// Reads message content for catalog records.
#[derive(Debug, Clone)]
pub struct ContentReader {
    db: Database,
    resolver: PathResolver,
}

impl ContentReader {
    pub fn new(db: Database, resolver: PathResolver) -> Self {
        Self { db, resolver }
    }

    /// Load the full content of an email by id.
    pub fn load(&self, email_id: i64) -> Result<EmailContent> {
        let record = self.db.require_email(email_id)?;
        let attachments = self.db.attachments_for(email_id)?;
        let parsed = self.parse(&record)?;

        Ok(EmailContent {
            text: parsed.text,
            html: parsed.html,
            cc: parsed.headers.cc,
            bcc: parsed.headers.bcc,
            raw_headers: parsed.raw_headers,
            attachments,
            record,
        })
    }

    /// Decode the bytes of one attachment.
    ///
    /// Attachments are matched by their position among the email's
    /// attachment rows, falling back to the filename if the file changed.
    pub fn attachment_data(&self, attachment_id: i64) -> Result<(AttachmentRecord, Vec<u8>)> {
        let attachment = self
            .db
            .get_attachment(attachment_id)?
            .ok_or_else(|| ShelfError::NotFound(format!("Attachment {attachment_id}")))?;
        let record = self.db.require_email(attachment.email_id)?;
        let position = self
            .db
            .attachments_for(record.id)?
            .iter()
            .position(|a| a.id == attachment.id);

        let parsed = self.parse(&record)?;
        let by_position = position
            .and_then(|pos| parsed.attachments.get(pos))
            .filter(|a| a.filename == attachment.filename);
        let found = by_position.or_else(|| {
            parsed
                .attachments
                .iter()
                .find(|a| a.filename == attachment.filename)
        });

        match found {
            Some(part) => {
                let data = part.data.clone();
                Ok((attachment, data))
            }
            None => Err(ShelfError::NotFound(format!(
                "Attachment '{}' in {}",
                attachment.filename, record.file_path
            ))),
        }
    }

    fn parse(&self, record: &EmailRecord) -> Result<ParsedMessage> {
        let path = self.resolver.resolve(&record.file_path)?;
        debug!(id = record.id, path = %path.display(), "Re-parsing message file");
        eml::parse_eml_file(&path, &record.file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::email::{NewAttachment, NewEmail, ParsedUnit};

    const MESSAGE: &str = concat!(
        "Message-ID: <c1@example.com>\r\n",
        "From: alice@example.com\r\n",
        "Cc: carol@example.com\r\n",
        "Subject: Report\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/mixed; boundary=\"B\"\r\n",
        "\r\n",
        "--B\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "See attached.\r\n",
        "--B\r\n",
        "Content-Type: text/plain; name=\"notes.txt\"\r\n",
        "Content-Disposition: attachment; filename=\"notes.txt\"\r\n",
        "\r\n",
        "attached notes\r\n",
        "--B--\r\n",
    );

    fn setup(file_path: &str) -> (tempfile::TempDir, ContentReader, i64) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c1.eml"), MESSAGE).unwrap();
        let db = Database::open_in_memory().unwrap();
        let ids = db
            .insert_batch(&[ParsedUnit {
                email: NewEmail {
                    file_path: file_path.into(),
                    message_id: "c1@example.com".into(),
                    ..NewEmail::default()
                },
                attachments: vec![NewAttachment {
                    filename: "notes.txt".into(),
                    content_type: "text/plain".into(),
                    size: 14,
                }],
            }])
            .unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        (dir, ContentReader::new(db, resolver), ids[0])
    }

    #[test]
    fn test_load_full_content() {
        let (_dir, reader, id) = setup("c1.eml");
        let content = reader.load(id).unwrap();
        assert!(content.text.unwrap().contains("See attached."));
        assert_eq!(content.cc, vec!["carol@example.com"]);
        assert!(content.raw_headers.contains("Subject: Report"));
        assert_eq!(content.attachments.len(), 1);
    }

    #[test]
    fn test_attachment_data() {
        let (_dir, reader, id) = setup("c1.eml");
        let att_id = reader.load(id).unwrap().attachments[0].id;
        let (meta, data) = reader.attachment_data(att_id).unwrap();
        assert_eq!(meta.filename, "notes.txt");
        assert!(String::from_utf8_lossy(&data).contains("attached notes"));

        assert!(matches!(
            reader.attachment_data(9999),
            Err(ShelfError::NotFound(_))
        ));
    }

    #[test]
    fn test_tampered_path_is_rejected() {
        let (_dir, reader, id) = setup("../c1.eml");
        assert!(reader.load(id).unwrap_err().is_traversal());
    }

    #[test]
    fn test_missing_email() {
        let (_dir, reader, _) = setup("c1.eml");
        assert!(matches!(reader.load(42), Err(ShelfError::NotFound(_))));
    }
}
