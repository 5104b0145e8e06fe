//! Catalog schema: email metadata, FTS5 search index, attachments, settings.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;

    CREATE TABLE IF NOT EXISTS emails (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path         TEXT NOT NULL UNIQUE,
        message_id        TEXT NOT NULL DEFAULT '',
        in_reply_to       TEXT NOT NULL DEFAULT '',
        thread_references TEXT NOT NULL DEFAULT '[]',
        subject           TEXT NOT NULL DEFAULT '',
        sender            TEXT NOT NULL DEFAULT '',
        sender_name       TEXT NOT NULL DEFAULT '',
        recipients        TEXT NOT NULL DEFAULT '',
        date              TEXT,
        body_text_preview TEXT NOT NULL DEFAULT '',
        has_attachments   INTEGER NOT NULL DEFAULT 0,
        attachment_count  INTEGER NOT NULL DEFAULT 0,
        file_size         INTEGER NOT NULL DEFAULT 0,
        indexed_at        TEXT,
        updated_at        TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_emails_message_id ON emails(message_id);
    CREATE INDEX IF NOT EXISTS idx_emails_in_reply_to ON emails(in_reply_to);
    CREATE INDEX IF NOT EXISTS idx_emails_date ON emails(date DESC);
    CREATE INDEX IF NOT EXISTS idx_emails_sender ON emails(sender);

    CREATE VIRTUAL TABLE IF NOT EXISTS emails_fts USING fts5(
        subject,
        sender,
        sender_name,
        recipients,
        body_text_preview,
        content = 'emails',
        content_rowid = 'id'
    );

    CREATE TRIGGER IF NOT EXISTS emails_ai AFTER INSERT ON emails BEGIN
        INSERT INTO emails_fts(rowid, subject, sender, sender_name, recipients, body_text_preview)
        VALUES (new.id, new.subject, new.sender, new.sender_name, new.recipients, new.body_text_preview);
    END;

    CREATE TRIGGER IF NOT EXISTS emails_ad AFTER DELETE ON emails BEGIN
        INSERT INTO emails_fts(emails_fts, rowid, subject, sender, sender_name, recipients, body_text_preview)
        VALUES ('delete', old.id, old.subject, old.sender, old.sender_name, old.recipients, old.body_text_preview);
    END;

    CREATE TRIGGER IF NOT EXISTS emails_au AFTER UPDATE ON emails BEGIN
        INSERT INTO emails_fts(emails_fts, rowid, subject, sender, sender_name, recipients, body_text_preview)
        VALUES ('delete', old.id, old.subject, old.sender, old.sender_name, old.recipients, old.body_text_preview);
        INSERT INTO emails_fts(rowid, subject, sender, sender_name, recipients, body_text_preview)
        VALUES (new.id, new.subject, new.sender, new.sender_name, new.recipients, new.body_text_preview);
    END;

    CREATE TABLE IF NOT EXISTS attachments (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        email_id     INTEGER NOT NULL REFERENCES emails(id) ON DELETE CASCADE,
        filename     TEXT NOT NULL,
        content_type TEXT NOT NULL,
        size         INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_attachments_email ON attachments(email_id);

    CREATE TABLE IF NOT EXISTS settings (
        key        TEXT PRIMARY KEY,
        value      TEXT NOT NULL,
        updated_at TEXT
    );
"#;

/// Create all tables, indexes and triggers if missing, then stamp the version.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
        tracing::info!(from = version, to = SCHEMA_VERSION, "Initialized catalog schema");
    }
    Ok(())
}
