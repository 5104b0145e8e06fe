use std::collections::HashSet;

use tracing::{debug, warn};

use super::Conversations;
use crate::error::{Result, ShelfError};
use crate::model::email::EmailRecord;

impl Conversations {
    /// Follow `In-Reply-To` upward from `record` to the conversation root.
    ///
    /// Stops at a record without a parent reference or whose parent is not
    /// catalogued. Revisiting a Message-ID yields
    /// [`ShelfError::CircularReference`]. When the hop bound is exhausted the
    /// last record reached is returned.
    pub fn find_root(&self, record: &EmailRecord) -> Result<EmailRecord> {
        let mut visited: HashSet<String> = HashSet::new();
        if !record.message_id.is_empty() {
            visited.insert(record.message_id.clone());
        }

        let mut current = record.clone();
        for _ in 0..self.limits.max_root_hops {
            if !current.is_reply() {
                return Ok(current);
            }
            let Some(parent) = self.db.find_by_message_id(&current.in_reply_to)? else {
                return Ok(current);
            };
            if !parent.message_id.is_empty() && !visited.insert(parent.message_id.clone()) {
                return Err(ShelfError::CircularReference {
                    message_id: parent.message_id,
                });
            }
            current = parent;
        }

        debug!(
            start = record.id,
            reached = current.id,
            hops = self.limits.max_root_hops,
            "Root search hit the hop bound"
        );
        Ok(current)
    }

    /// [`find_root`](Self::find_root), falling back to `record` itself on a cycle.
    pub fn root_or_self(&self, record: &EmailRecord) -> Result<EmailRecord> {
        match self.find_root(record) {
            Err(ShelfError::CircularReference { message_id }) => {
                warn!(id = record.id, message_id = %message_id, "Reply cycle; treating record as root");
                Ok(record.clone())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ShelfError;
    use crate::model::email::{NewEmail, ParsedUnit};
    use crate::store::Database;
    use crate::thread::{Conversations, ThreadLimits};

    fn insert(db: &Database, path: &str, id: &str, parent: &str) -> i64 {
        db.insert_batch(&[ParsedUnit {
            email: NewEmail {
                file_path: path.into(),
                message_id: id.into(),
                in_reply_to: parent.into(),
                ..NewEmail::default()
            },
            attachments: Vec::new(),
        }])
        .unwrap()[0]
    }

    #[test]
    fn test_find_root_walks_up() {
        let db = Database::open_in_memory().unwrap();
        let root = insert(&db, "1.eml", "m1", "");
        insert(&db, "2.eml", "m2", "m1");
        let leaf = insert(&db, "3.eml", "m3", "m2");

        let engine = Conversations::new(db.clone());
        let start = db.get_email(leaf).unwrap().unwrap();
        assert_eq!(engine.find_root(&start).unwrap().id, root);
    }

    #[test]
    fn test_unknown_parent_is_root() {
        let db = Database::open_in_memory().unwrap();
        let orphan = insert(&db, "o.eml", "o1", "not-catalogued");
        let engine = Conversations::new(db.clone());
        let record = db.get_email(orphan).unwrap().unwrap();
        assert_eq!(engine.find_root(&record).unwrap().id, orphan);
    }

    #[test]
    fn test_cycle_is_reported() {
        let db = Database::open_in_memory().unwrap();
        let a = insert(&db, "a.eml", "a", "b");
        insert(&db, "b.eml", "b", "a");
        let engine = Conversations::new(db.clone());
        let record = db.get_email(a).unwrap().unwrap();

        let err = engine.find_root(&record).unwrap_err();
        assert!(matches!(err, ShelfError::CircularReference { ref message_id } if message_id == "a"));
        assert_eq!(engine.root_or_self(&record).unwrap().id, a);
    }

    #[test]
    fn test_self_reply_is_a_cycle() {
        let db = Database::open_in_memory().unwrap();
        let s = insert(&db, "s.eml", "s", "s");
        let engine = Conversations::new(db.clone());
        let record = db.get_email(s).unwrap().unwrap();
        assert!(matches!(
            engine.find_root(&record),
            Err(ShelfError::CircularReference { .. })
        ));
    }

    #[test]
    fn test_hop_bound() {
        let db = Database::open_in_memory().unwrap();
        let mut last = 0;
        for i in 1..=10 {
            let parent = if i == 1 { String::new() } else { format!("m{}", i - 1) };
            last = insert(&db, &format!("{i}.eml"), &format!("m{i}"), &parent);
        }
        let engine = Conversations::with_limits(
            db.clone(),
            ThreadLimits {
                max_root_hops: 3,
                ..ThreadLimits::default()
            },
        );
        let start = db.get_email(last).unwrap().unwrap();
        assert_eq!(engine.find_root(&start).unwrap().message_id, "m7");
    }
}
