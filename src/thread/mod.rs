//! Conversation reconstruction over the `In-Reply-To` relation.
//!
//! Upward walks ([`Conversations::find_root`]) and downward expansion
//! ([`Conversations::build_tree`]) both tolerate cycles, duplicate
//! Message-IDs and dangling references. The engine only reads the catalog.

mod root;
mod tree;

use crate::config::ThreadingConfig;
use crate::model::email::EmailRecord;
use crate::store::Database;

/// Traversal bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadLimits {
    /// Maximum parent hops when searching for a root.
    pub max_root_hops: usize,
    /// Maximum depth below the root that is expanded.
    pub max_tree_depth: usize,
}

impl Default for ThreadLimits {
    fn default() -> Self {
        Self {
            max_root_hops: 100,
            max_tree_depth: 50,
        }
    }
}

impl From<&ThreadingConfig> for ThreadLimits {
    fn from(config: &ThreadingConfig) -> Self {
        Self {
            max_root_hops: config.max_root_hops,
            max_tree_depth: config.max_tree_depth,
        }
    }
}

/// One message placed in a conversation tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConversationNode {
    pub record: EmailRecord,
    /// Direct replies, oldest first.
    pub children: Vec<ConversationNode>,
    /// Number of descendants placed under this node.
    pub reply_count: usize,
    /// Distance from the root (root = 0).
    pub depth: usize,
    pub is_root: bool,
}

impl ConversationNode {
    pub(crate) fn leaf(record: EmailRecord, depth: usize) -> Self {
        Self {
            record,
            children: Vec::new(),
            reply_count: 0,
            depth,
            is_root: depth == 0,
        }
    }

    /// Records of this subtree in depth-first pre-order.
    pub fn flatten(&self) -> Vec<&EmailRecord> {
        let mut out = Vec::with_capacity(self.reply_count + 1);
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a EmailRecord>) {
        out.push(&self.record);
        for child in &self.children {
            child.collect(out);
        }
    }
}

/// Conversation queries over a catalog.
#[derive(Debug, Clone)]
pub struct Conversations {
    db: Database,
    limits: ThreadLimits,
}

impl Conversations {
    pub fn new(db: Database) -> Self {
        Self::with_limits(db, ThreadLimits::default())
    }

    pub fn with_limits(db: Database, limits: ThreadLimits) -> Self {
        Self { db, limits }
    }

    pub fn limits(&self) -> ThreadLimits {
        self.limits
    }

    /// The catalog these queries run against.
    pub fn database(&self) -> &Database {
        &self.db
    }
}
