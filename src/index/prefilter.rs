//! Existence pre-filter: split candidates into already-indexed and pending.

use crate::error::Result;
use crate::store::Database;

/// Result of checking candidate paths against the catalog.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Paths with no catalog row, in enumeration order.
    pub pending: Vec<String>,
    /// Paths already indexed.
    pub skipped: Vec<String>,
}

/// Check `candidates` against the catalog, `chunk_size` paths per query.
pub fn partition(db: &Database, candidates: Vec<String>, chunk_size: usize) -> Result<Partition> {
    let existing = db.filter_existing(&candidates, chunk_size)?;
    let (skipped, pending): (Vec<String>, Vec<String>) = candidates
        .into_iter()
        .partition(|path| existing.get(path).copied().unwrap_or(false));

    tracing::debug!(
        pending = pending.len(),
        skipped = skipped.len(),
        "Pre-filtered candidates"
    );
    Ok(Partition { pending, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::email::{NewEmail, ParsedUnit};

    #[test]
    fn test_partition_keeps_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_batch(&[ParsedUnit {
            email: NewEmail {
                file_path: "b.eml".into(),
                ..NewEmail::default()
            },
            attachments: Vec::new(),
        }])
        .unwrap();

        let candidates = vec!["c.eml".to_string(), "b.eml".to_string(), "a.eml".to_string()];
        let split = partition(&db, candidates, 2).unwrap();
        assert_eq!(split.pending, vec!["c.eml", "a.eml"]);
        assert_eq!(split.skipped, vec!["b.eml"]);
    }
}
