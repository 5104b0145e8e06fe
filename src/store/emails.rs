//! Email and attachment rows: batch insert, lookups, conversation queries,
//! statistics, settings and deletion.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::error::{Result, ShelfError};
use crate::model::email::{AttachmentRecord, CatalogStats, EmailRecord, ParsedUnit, SenderSummary};
use crate::store::Database;

/// Column list matching [`row_to_email`], for queries aliasing `emails` as `e`.
pub(crate) const EMAIL_COLUMNS: &str = "e.id, e.file_path, e.message_id, e.in_reply_to, \
     e.thread_references, e.subject, e.sender, e.sender_name, e.recipients, e.date, \
     e.body_text_preview, e.has_attachments, e.attachment_count, e.file_size, \
     e.indexed_at, e.updated_at";

pub(crate) fn row_to_email(row: &Row<'_>) -> rusqlite::Result<EmailRecord> {
    let references: String = row.get(4)?;
    let thread_references = serde_json::from_str(&references)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(EmailRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        message_id: row.get(2)?,
        in_reply_to: row.get(3)?,
        thread_references,
        subject: row.get(5)?,
        sender: row.get(6)?,
        sender_name: row.get(7)?,
        recipients: row.get(8)?,
        date: row.get(9)?,
        body_text_preview: row.get(10)?,
        has_attachments: row.get(11)?,
        attachment_count: row.get::<_, i64>(12)? as u32,
        file_size: row.get::<_, i64>(13)? as u64,
        indexed_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn row_to_attachment(row: &Row<'_>) -> rusqlite::Result<AttachmentRecord> {
    Ok(AttachmentRecord {
        id: row.get(0)?,
        email_id: row.get(1)?,
        filename: row.get(2)?,
        content_type: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
    })
}

impl Database {
    // ── Indexing ────────────────────────────────────────────────

    /// Report, for every path, whether an email row already exists for it.
    ///
    /// Paths are checked `chunk_size` at a time to stay below SQLite's
    /// bound-parameter limit.
    pub fn filter_existing(
        &self,
        paths: &[String],
        chunk_size: usize,
    ) -> Result<HashMap<String, bool>> {
        let mut existing: HashMap<String, bool> =
            paths.iter().map(|p| (p.clone(), false)).collect();
        let conn = self.connection()?;

        for chunk in paths.chunks(chunk_size.max(1)) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT file_path FROM emails WHERE file_path IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            for path in rows {
                if let Some(flag) = existing.get_mut(&path?) {
                    *flag = true;
                }
            }
        }
        Ok(existing)
    }

    /// Insert parsed units in one transaction: all emails first, then their attachments.
    ///
    /// Returns the new email ids in input order. On any error the whole
    /// batch is rolled back.
    pub fn insert_batch(&self, units: &[ParsedUnit]) -> Result<Vec<i64>> {
        if units.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(units.len());

        {
            let mut insert_email = tx.prepare_cached(
                "INSERT INTO emails (file_path, message_id, in_reply_to, thread_references, \
                 subject, sender, sender_name, recipients, date, body_text_preview, \
                 has_attachments, attachment_count, file_size, indexed_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for unit in units {
                let email = &unit.email;
                let references = serde_json::to_string(&email.thread_references)?;
                insert_email.execute(params![
                    email.file_path,
                    email.message_id,
                    email.in_reply_to,
                    references,
                    email.subject,
                    email.sender,
                    email.sender_name,
                    email.recipients,
                    email.date,
                    email.body_text_preview,
                    !unit.attachments.is_empty(),
                    unit.attachments.len() as i64,
                    email.file_size as i64,
                    now,
                    now,
                ])?;
                ids.push(tx.last_insert_rowid());
            }

            let mut insert_attachment = tx.prepare_cached(
                "INSERT INTO attachments (email_id, filename, content_type, size) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (unit, email_id) in units.iter().zip(&ids) {
                for attachment in &unit.attachments {
                    insert_attachment.execute(params![
                        email_id,
                        attachment.filename,
                        attachment.content_type,
                        attachment.size as i64,
                    ])?;
                }
            }
        }

        tx.commit()?;
        Ok(ids)
    }

    // ── Lookups ─────────────────────────────────────────────────

    pub fn get_email(&self, id: i64) -> Result<Option<EmailRecord>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {EMAIL_COLUMNS} FROM emails e WHERE e.id = ?1");
        Ok(conn.query_row(&sql, [id], row_to_email).optional()?)
    }

    /// Like [`get_email`](Self::get_email), but a missing row is an error.
    pub fn require_email(&self, id: i64) -> Result<EmailRecord> {
        self.get_email(id)?
            .ok_or_else(|| ShelfError::NotFound(format!("Email {id}")))
    }

    pub fn find_by_path(&self, file_path: &str) -> Result<Option<EmailRecord>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {EMAIL_COLUMNS} FROM emails e WHERE e.file_path = ?1");
        Ok(conn.query_row(&sql, [file_path], row_to_email).optional()?)
    }

    /// The record carrying `message_id`. Duplicates resolve to the oldest row.
    pub fn find_by_message_id(&self, message_id: &str) -> Result<Option<EmailRecord>> {
        if message_id.is_empty() {
            return Ok(None);
        }
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails e WHERE e.message_id = ?1 ORDER BY e.id LIMIT 1"
        );
        Ok(conn.query_row(&sql, [message_id], row_to_email).optional()?)
    }

    /// Records whose `In-Reply-To` is `message_id`, oldest first.
    pub fn direct_replies(&self, message_id: &str) -> Result<Vec<EmailRecord>> {
        if message_id.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails e WHERE e.in_reply_to = ?1 \
             ORDER BY e.date ASC, e.id ASC"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([message_id], row_to_email)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of distinct records reachable through reply links below `message_id`.
    ///
    /// `UNION` drops already-seen rows, so cyclic data terminates.
    pub fn count_replies(&self, message_id: &str) -> Result<u64> {
        if message_id.is_empty() {
            return Ok(0);
        }
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "WITH RECURSIVE replies(id, message_id) AS ( \
                 SELECT id, message_id FROM emails WHERE in_reply_to = ?1 \
                 UNION \
                 SELECT e.id, e.message_id FROM emails e \
                 JOIN replies r ON e.in_reply_to = r.message_id \
                 WHERE r.message_id != '' \
             ) \
             SELECT COUNT(*) FROM replies WHERE message_id != ?1",
            [message_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ── Listings ────────────────────────────────────────────────

    /// Page through all records, newest first.
    pub fn list_emails(&self, limit: usize, offset: usize) -> Result<Vec<EmailRecord>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails e ORDER BY e.date DESC, e.id DESC \
             LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], row_to_email)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_emails(&self) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Conversation starters, newest first: records that reply to nothing
    /// or to a message that is not in the catalog.
    pub fn root_emails(&self, limit: usize, offset: usize) -> Result<Vec<EmailRecord>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails e \
             WHERE e.in_reply_to = '' \
                OR NOT EXISTS (SELECT 1 FROM emails p WHERE p.message_id = e.in_reply_to) \
             ORDER BY e.date DESC, e.id DESC LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], row_to_email)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_roots(&self) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM emails e \
             WHERE e.in_reply_to = '' \
                OR NOT EXISTS (SELECT 1 FROM emails p WHERE p.message_id = e.in_reply_to)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Distinct senders matching a prefix, most frequent first.
    pub fn unique_senders(&self, prefix: &str, limit: usize) -> Result<Vec<SenderSummary>> {
        let conn = self.connection()?;
        let pattern = format!("{}%", crate::store::search::escape_like(prefix));
        let mut stmt = conn.prepare_cached(
            "SELECT sender, MAX(sender_name), COUNT(*) AS n FROM emails \
             WHERE sender != '' AND sender LIKE ?1 ESCAPE '\\' \
             GROUP BY sender ORDER BY n DESC, sender ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            Ok(SenderSummary {
                address: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                message_count: row.get::<_, i64>(2)? as u64,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ── Attachments ─────────────────────────────────────────────

    /// Attachment metadata of one email, in MIME order.
    pub fn attachments_for(&self, email_id: i64) -> Result<Vec<AttachmentRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, email_id, filename, content_type, size FROM attachments \
             WHERE email_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([email_id], row_to_attachment)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_attachment(&self, id: i64) -> Result<Option<AttachmentRecord>> {
        let conn = self.connection()?;
        Ok(conn
            .query_row(
                "SELECT id, email_id, filename, content_type, size FROM attachments WHERE id = ?1",
                [id],
                row_to_attachment,
            )
            .optional()?)
    }

    // ── Statistics ──────────────────────────────────────────────

    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = self.connection()?;
        let mut stats = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(has_attachments), 0), COALESCE(SUM(file_size), 0), \
                    MIN(date), MAX(date), MAX(indexed_at) \
             FROM emails",
            [],
            |row| {
                Ok(CatalogStats {
                    total_emails: row.get::<_, i64>(0)? as u64,
                    with_attachments: row.get::<_, i64>(1)? as u64,
                    total_attachments: 0,
                    total_bytes: row.get::<_, i64>(2)? as u64,
                    oldest: row.get(3)?,
                    newest: row.get(4)?,
                    last_indexed: row.get(5)?,
                })
            },
        )?;
        let attachments: i64 =
            conn.query_row("SELECT COUNT(*) FROM attachments", [], |row| row.get(0))?;
        stats.total_attachments = attachments as u64;
        Ok(stats)
    }

    // ── Settings ────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection()?;
        Ok(conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    // ── Deletion & maintenance ──────────────────────────────────

    /// Delete one email and (by cascade) its attachments. The source file is untouched.
    pub fn delete_email(&self, id: i64) -> Result<bool> {
        let conn = self.connection()?;
        let deleted = conn.execute("DELETE FROM emails WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Delete several emails in one transaction. Returns how many rows existed.
    pub fn delete_emails(&self, ids: &[i64]) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM emails WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
        }
        tx.commit()?;
        tracing::info!(requested = ids.len(), deleted, "Deleted emails");
        Ok(deleted)
    }

    /// Refresh query planner statistics and merge FTS segments.
    pub fn optimize(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("ANALYZE; INSERT INTO emails_fts(emails_fts) VALUES('optimize');")?;
        Ok(())
    }

    /// Rebuild the database file to reclaim space after deletions.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::email::{NewAttachment, NewEmail};
    use chrono::TimeZone;

    fn unit(path: &str, message_id: &str, in_reply_to: &str, day: u32) -> ParsedUnit {
        ParsedUnit {
            email: NewEmail {
                file_path: path.to_string(),
                message_id: message_id.to_string(),
                in_reply_to: in_reply_to.to_string(),
                thread_references: if in_reply_to.is_empty() {
                    Vec::new()
                } else {
                    vec![in_reply_to.to_string()]
                },
                subject: format!("Subject {path}"),
                sender: "alice@example.com".to_string(),
                sender_name: "Alice".to_string(),
                recipients: "bob@example.com, carol@example.com".to_string(),
                date: Some(Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()),
                body_text_preview: "hello".to_string(),
                file_size: 100,
            },
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let mut first = unit("a.eml", "m1@x", "", 1);
        first.attachments.push(NewAttachment {
            filename: "a.pdf".into(),
            content_type: "application/pdf".into(),
            size: 42,
        });
        let ids = db
            .insert_batch(&[first, unit("b.eml", "m2@x", "m1@x", 2)])
            .unwrap();
        assert_eq!(ids.len(), 2);

        let a = db.get_email(ids[0]).unwrap().unwrap();
        assert_eq!(a.file_path, "a.eml");
        assert!(a.has_attachments);
        assert_eq!(a.attachment_count, 1);
        assert!(a.indexed_at.is_some());

        let b = db.find_by_message_id("m2@x").unwrap().unwrap();
        assert_eq!(b.thread_references, vec!["m1@x"]);
        assert_eq!(b.date, Some(Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()));
        assert!(db.find_by_message_id("").unwrap().is_none());

        let atts = db.attachments_for(ids[0]).unwrap();
        assert_eq!(atts.len(), 1);
        assert_eq!(atts[0].size, 42);
    }

    #[test]
    fn test_duplicate_path_rolls_back_batch() {
        let db = Database::open_in_memory().unwrap();
        db.insert_batch(&[unit("a.eml", "m1@x", "", 1)]).unwrap();

        let result = db.insert_batch(&[unit("b.eml", "m2@x", "", 2), unit("a.eml", "m3@x", "", 3)]);
        assert!(result.is_err());
        assert!(db.find_by_path("b.eml").unwrap().is_none());
        assert_eq!(db.count_emails().unwrap(), 1);
    }

    #[test]
    fn test_filter_existing_chunks() {
        let db = Database::open_in_memory().unwrap();
        db.insert_batch(&[unit("a.eml", "", "", 1), unit("c.eml", "", "", 1)])
            .unwrap();
        let paths: Vec<String> = ["a.eml", "b.eml", "c.eml", "d.eml"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let existing = db.filter_existing(&paths, 1).unwrap();
        assert_eq!(existing.len(), 4);
        assert!(existing["a.eml"]);
        assert!(!existing["b.eml"]);
        assert!(existing["c.eml"]);
        assert!(!existing["d.eml"]);
    }

    #[test]
    fn test_replies_and_roots() {
        let db = Database::open_in_memory().unwrap();
        db.insert_batch(&[
            unit("1.eml", "m1@x", "", 1),
            unit("3.eml", "m3@x", "m1@x", 3),
            unit("2.eml", "m2@x", "m1@x", 2),
            unit("4.eml", "m4@x", "m2@x", 4),
            unit("5.eml", "m5@x", "missing@x", 5),
        ])
        .unwrap();

        let replies = db.direct_replies("m1@x").unwrap();
        let ids: Vec<_> = replies.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m2@x", "m3@x"]);

        assert_eq!(db.count_replies("m1@x").unwrap(), 3);
        assert_eq!(db.count_replies("m4@x").unwrap(), 0);
        assert_eq!(db.count_replies("").unwrap(), 0);

        let roots = db.root_emails(10, 0).unwrap();
        let root_ids: Vec<_> = roots.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(root_ids, vec!["m5@x", "m1@x"]);
        assert_eq!(db.count_roots().unwrap(), 2);
    }

    #[test]
    fn test_count_replies_terminates_on_cycle() {
        let db = Database::open_in_memory().unwrap();
        db.insert_batch(&[unit("a.eml", "a@x", "b@x", 1), unit("b.eml", "b@x", "a@x", 2)])
            .unwrap();
        assert_eq!(db.count_replies("a@x").unwrap(), 1);
    }

    #[test]
    fn test_delete_cascades_attachments() {
        let db = Database::open_in_memory().unwrap();
        let mut u = unit("a.eml", "m1@x", "", 1);
        u.attachments.push(NewAttachment {
            filename: "x.txt".into(),
            content_type: "text/plain".into(),
            size: 1,
        });
        let ids = db.insert_batch(&[u, unit("b.eml", "m2@x", "", 2)]).unwrap();

        assert!(db.delete_email(ids[0]).unwrap());
        assert!(!db.delete_email(ids[0]).unwrap());
        assert!(db.attachments_for(ids[0]).unwrap().is_empty());
        assert_eq!(db.stats().unwrap().total_attachments, 0);

        assert_eq!(db.delete_emails(&[ids[1], 999]).unwrap(), 1);
        assert_eq!(db.count_emails().unwrap(), 0);
    }

    #[test]
    fn test_stats_and_senders() {
        let db = Database::open_in_memory().unwrap();
        let mut other = unit("c.eml", "m3@x", "", 3);
        other.email.sender = "zed@example.com".into();
        other.email.sender_name = String::new();
        db.insert_batch(&[unit("a.eml", "m1@x", "", 1), unit("b.eml", "m2@x", "", 2), other])
            .unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_emails, 3);
        assert_eq!(stats.total_bytes, 300);
        assert_eq!(stats.with_attachments, 0);
        assert_eq!(stats.oldest, Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()));
        assert_eq!(stats.newest, Some(Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap()));
        assert!(stats.last_indexed.is_some());

        let senders = db.unique_senders("", 10).unwrap();
        assert_eq!(senders[0].address, "alice@example.com");
        assert_eq!(senders[0].message_count, 2);
        assert_eq!(senders[0].name, "Alice");
        let z = db.unique_senders("ze", 10).unwrap();
        assert_eq!(z.len(), 1);
        assert!(db.unique_senders("%", 10).unwrap().is_empty());
    }

    #[test]
    fn test_settings_upsert() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("last_run").unwrap().is_none());
        db.set_setting("last_run", "1").unwrap();
        db.set_setting("last_run", "2").unwrap();
        assert_eq!(db.get_setting("last_run").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_list_pages_newest_first() {
        let db = Database::open_in_memory().unwrap();
        db.insert_batch(&[
            unit("a.eml", "", "", 1),
            unit("b.eml", "", "", 3),
            unit("c.eml", "", "", 2),
        ])
        .unwrap();
        let page = db.list_emails(2, 0).unwrap();
        assert_eq!(page[0].file_path, "b.eml");
        assert_eq!(page[1].file_path, "c.eml");
        let rest = db.list_emails(2, 2).unwrap();
        assert_eq!(rest.len(), 1);
        db.optimize().unwrap();
    }
}
