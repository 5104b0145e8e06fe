//! Catalog search: a small query language compiled to FTS5 plus column filters.
//!
//! # Supported syntax
//!
//! - `word`: prefix match in subject, sender, recipients or body preview
//! - `"exact phrase"`: phrase match
//! - `subject:word`: restrict a term to the subject
//! - `from:alice`: sender address or name contains `alice`
//! - `has:attachment` / `has:no-attachment`
//! - `date:2024-01-01`, `date:2024-01`, `date:2024`, `date:2024-01..2024-03`
//! - `before:2024-06-01` / `after:2024-01-01`
//!
//! Terms are combined with AND.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::types::ToSql;
use rusqlite::params_from_iter;

use crate::error::Result;
use crate::model::email::EmailRecord;
use crate::store::emails::{row_to_email, EMAIL_COLUMNS};
use crate::store::Database;

/// Characters of body preview returned when there is no text match to highlight.
const PLAIN_SNIPPET_CHARS: i64 = 160;

/// One full-text term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextTerm {
    /// Prefix match on any indexed column.
    Word(String),
    /// Exact phrase on any indexed column.
    Phrase(String),
    /// Prefix match on the subject only.
    Subject(String),
}

/// Structured search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub terms: Vec<TextTerm>,
    /// Substring of the sender address or display name.
    pub sender: Option<String>,
    pub has_attachments: Option<bool>,
    /// Inclusive lower bound.
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub date_to: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            sender: None,
            has_attachments: None,
            date_from: None,
            date_to: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// A matching record with its highlighted excerpt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub email: EmailRecord,
    /// Excerpt with matches wrapped in `[` `]`.
    pub snippet: String,
    /// BM25 score (lower is better); 0 for filter-only queries.
    pub rank: f64,
}

impl SearchFilter {
    /// Parse a query string. Never fails; unknown `field:` prefixes are searched as text.
    pub fn parse(input: &str) -> Self {
        let mut filter = Self::default();

        for token in tokenize(input.trim()) {
            if let Some(value) = token.strip_prefix("from:") {
                if !value.is_empty() {
                    filter.sender = Some(unquote(value).to_string());
                }
            } else if let Some(value) = token.strip_prefix("subject:") {
                if !value.is_empty() {
                    filter.terms.push(TextTerm::Subject(unquote(value).to_string()));
                }
            } else if let Some(value) = token.strip_prefix("has:") {
                match value {
                    "attachment" | "attachments" => filter.has_attachments = Some(true),
                    "no-attachment" | "no-attachments" => filter.has_attachments = Some(false),
                    _ => {}
                }
            } else if let Some(value) = token.strip_prefix("date:") {
                if let Some((from, to)) = parse_date_range(value) {
                    filter.date_from = Some(from);
                    filter.date_to = Some(to);
                }
            } else if let Some(value) = token.strip_prefix("before:") {
                filter.date_to = period_start(value).map(start_of_day);
            } else if let Some(value) = token.strip_prefix("after:") {
                filter.date_from = period_end(value)
                    .and_then(|d| d.checked_add_days(Days::new(1)))
                    .map(start_of_day);
            } else if token.starts_with('"') && token.ends_with('"') && token.len() > 1 {
                let phrase = unquote(&token).trim();
                if !phrase.is_empty() {
                    filter.terms.push(TextTerm::Phrase(phrase.to_string()));
                }
            } else {
                filter.terms.push(TextTerm::Word(token));
            }
        }
        filter
    }

    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// FTS5 `MATCH` expression for the text terms, if any.
    pub fn fts_expression(&self) -> Option<String> {
        let parts: Vec<String> = self
            .terms
            .iter()
            .filter_map(|term| match term {
                TextTerm::Word(w) => quote_fts(w).map(|q| format!("{q}*")),
                TextTerm::Phrase(p) => quote_fts(p),
                TextTerm::Subject(s) => quote_fts(s).map(|q| format!("subject : {q}*")),
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }
}

impl Database {
    /// Run a search. Text queries are ranked by BM25; filter-only queries
    /// return newest first.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<SearchHit>> {
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        let mut conditions: Vec<String> = Vec::new();

        let fts = filter.fts_expression();
        let (select, order) = if let Some(expr) = fts {
            conditions.push("emails_fts MATCH ?".to_string());
            params.push(Box::new(expr));
            (
                format!(
                    "SELECT {EMAIL_COLUMNS}, snippet(emails_fts, -1, '[', ']', '…', 12), \
                     bm25(emails_fts) AS score \
                     FROM emails_fts JOIN emails e ON e.id = emails_fts.rowid"
                ),
                "score ASC, e.id ASC",
            )
        } else {
            (
                format!(
                    "SELECT {EMAIL_COLUMNS}, substr(e.body_text_preview, 1, {PLAIN_SNIPPET_CHARS}), \
                     0.0 FROM emails e"
                ),
                "e.date DESC, e.id DESC",
            )
        };

        if let Some(sender) = filter.sender.as_deref().filter(|s| !s.is_empty()) {
            conditions.push(
                "(e.sender LIKE ? ESCAPE '\\' OR e.sender_name LIKE ? ESCAPE '\\')".to_string(),
            );
            let pattern = format!("%{}%", escape_like(sender));
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }
        if let Some(has) = filter.has_attachments {
            conditions.push("e.has_attachments = ?".to_string());
            params.push(Box::new(has));
        }
        if let Some(from) = filter.date_from {
            conditions.push("e.date >= ?".to_string());
            params.push(Box::new(from));
        }
        if let Some(to) = filter.date_to {
            conditions.push("e.date < ?".to_string());
            params.push(Box::new(to));
        }

        let mut sql = select;
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {order} LIMIT ? OFFSET ?"));
        params.push(Box::new(filter.limit as i64));
        params.push(Box::new(filter.offset as i64));

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            Ok(SearchHit {
                email: row_to_email(row)?,
                snippet: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
                rank: row.get(17)?,
            })
        })?;
        let hits = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        tracing::debug!(results = hits.len(), "Search completed");
        Ok(hits)
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Wrap text as an FTS5 string literal. `None` if nothing searchable remains.
fn quote_fts(text: &str) -> Option<String> {
    let cleaned = text.trim().trim_end_matches('*');
    if !cleaned.chars().any(|c| c.is_alphanumeric()) {
        return None;
    }
    Some(format!("\"{}\"", cleaned.replace('"', "\"\"")))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(value)
}

/// Split on whitespace, keeping quoted sections together.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// `[from, to)` covering a day, month, year, or `start..end` range of those.
fn parse_date_range(value: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (start, end) = value.split_once("..").unwrap_or((value, value));
    let from = period_start(start)?;
    let to = period_end(end)?.checked_add_days(Days::new(1))?;
    Some((start_of_day(from), start_of_day(to)))
}

/// First day of `YYYY-MM-DD`, `YYYY-MM` or `YYYY`.
fn period_start(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    let parts: Vec<&str> = s.split('-').collect();
    let year: i32 = parts.first()?.parse().ok()?;
    match parts.len() {
        1 => NaiveDate::from_ymd_opt(year, 1, 1),
        2 => NaiveDate::from_ymd_opt(year, parts[1].parse().ok()?, 1),
        _ => None,
    }
}

/// Last day of `YYYY-MM-DD`, `YYYY-MM` or `YYYY`.
fn period_end(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    let parts: Vec<&str> = s.split('-').collect();
    let year: i32 = parts.first()?.parse().ok()?;
    match parts.len() {
        1 => NaiveDate::from_ymd_opt(year, 12, 31),
        2 => {
            let month: u32 = parts[1].parse().ok()?;
            let (ny, nm) = if month == 12 {
                (year.checked_add(1)?, 1)
            } else {
                (year, month + 1)
            };
            NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
        }
        _ => None,
    }
}
