//! Parse workers: turn a root-relative path into a [`ParsedUnit`].

use crossbeam_channel::{Receiver, Sender};
use tracing::{trace, warn};

use crate::error::{Result, ShelfError};
use crate::model::email::{NewAttachment, NewEmail, ParsedUnit};
use crate::parser::eml;
use crate::scan::PathResolver;

/// Outcome of one parse unit, reported to the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Parsed and handed to the writer.
    Parsed(String),
    /// Could not be resolved, read or parsed.
    Failed { path: String, cause: String },
}

impl WorkerEvent {
    pub fn path(&self) -> &str {
        match self {
            Self::Parsed(path) => path,
            Self::Failed { path, .. } => path,
        }
    }
}

/// Resolve, stat and parse one file.
pub fn parse_unit(
    resolver: &PathResolver,
    relative_path: &str,
    preview_max_bytes: usize,
) -> Result<ParsedUnit> {
    let path = resolver.resolve(relative_path)?;
    let metadata = std::fs::metadata(&path).map_err(|e| ShelfError::io(&path, e))?;
    let message = eml::parse_eml_file(&path, relative_path)?;
    let headers = message.headers;

    let body = message.text.unwrap_or_default();
    let email = NewEmail {
        file_path: relative_path.to_string(),
        message_id: headers.message_id,
        in_reply_to: headers.in_reply_to,
        thread_references: headers.references,
        subject: headers.subject,
        sender: headers.sender,
        sender_name: headers.sender_name,
        recipients: headers.recipients.join(", "),
        date: headers.date,
        body_text_preview: truncate_preview(&body, preview_max_bytes).to_string(),
        file_size: metadata.len(),
    };

    let attachments = message
        .attachments
        .iter()
        .map(|a| NewAttachment {
            filename: a.filename.clone(),
            content_type: a.content_type.clone(),
            size: a.size(),
        })
        .collect();

    Ok(ParsedUnit { email, attachments })
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a character.
pub fn truncate_preview(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Worker loop: drain `paths`, push units to the writer, report every outcome.
///
/// Returns when the path queue is empty and closed, or when the writer is gone.
pub(crate) fn run_worker(
    resolver: &PathResolver,
    preview_max_bytes: usize,
    paths: Receiver<String>,
    units: Sender<ParsedUnit>,
    events: Sender<WorkerEvent>,
) {
    while let Ok(path) = paths.recv() {
        let event = match parse_unit(resolver, &path, preview_max_bytes) {
            Ok(unit) => {
                trace!(path = %path, "Parsed");
                if units.send(unit).is_err() {
                    warn!(path = %path, "Writer stopped; abandoning remaining files");
                    let _ = events.send(WorkerEvent::Failed {
                        path,
                        cause: "batch writer stopped".to_string(),
                    });
                    break;
                }
                WorkerEvent::Parsed(path)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to index file");
                WorkerEvent::Failed {
                    path,
                    cause: e.to_string(),
                }
            }
        };
        // The collector outlives every worker.
        let _ = events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_preview_char_boundary() {
        assert_eq!(truncate_preview("hello", 10), "hello");
        assert_eq!(truncate_preview("hello", 3), "hel");
        // 'é' is two bytes; cutting inside it backs off to the boundary.
        assert_eq!(truncate_preview("caféx", 4), "caf");
        assert_eq!(truncate_preview("caféx", 5), "café");
        assert_eq!(truncate_preview("", 0), "");
    }

    #[test]
    fn test_parse_unit() {
        let dir = tempfile::tempdir().unwrap();
        let body = "x".repeat(100);
        let raw = format!(
            "Message-ID: <u1@x>\nFrom: A <a@x.com>\nTo: b@x.com, c@x.com\nSubject: Hi\n\n{body}\n"
        );
        std::fs::create_dir_all(dir.path().join("inbox")).unwrap();
        std::fs::write(dir.path().join("inbox/u1.eml"), &raw).unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();

        let unit = parse_unit(&resolver, "inbox/u1.eml", 10).unwrap();
        assert_eq!(unit.file_path(), "inbox/u1.eml");
        assert_eq!(unit.email.message_id, "u1@x");
        assert_eq!(unit.email.recipients, "b@x.com, c@x.com");
        assert_eq!(unit.email.body_text_preview, "xxxxxxxxxx");
        assert_eq!(unit.email.file_size, raw.len() as u64);
        assert!(unit.attachments.is_empty());
    }

    #[test]
    fn test_parse_unit_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.eml"), "not an email\n").unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();

        assert!(matches!(
            parse_unit(&resolver, "bad.eml", 10),
            Err(ShelfError::Parse { .. })
        ));
        assert!(matches!(
            parse_unit(&resolver, "missing.eml", 10),
            Err(ShelfError::Io { .. })
        ));
        assert!(parse_unit(&resolver, "../escape.eml", 10)
            .unwrap_err()
            .is_traversal());
    }
}
