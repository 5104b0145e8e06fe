use std::collections::HashSet;

use tracing::warn;

use super::{ConversationNode, Conversations};
use crate::error::Result;
use crate::model::email::EmailRecord;

/// Traversal state shared across one tree build.
#[derive(Default)]
struct Walk {
    /// Message-IDs already expanded.
    expanded: HashSet<String>,
    /// Record ids already placed in the tree.
    placed: HashSet<i64>,
}

impl Conversations {
    /// Build the reply tree below `root`.
    ///
    /// A Message-ID is expanded at most once and a record is placed at most
    /// once, so duplicate IDs and reply cycles cannot grow the tree without
    /// bound. Expansion stops at the configured depth.
    pub fn build_tree(&self, root: EmailRecord) -> Result<ConversationNode> {
        let mut walk = Walk::default();
        walk.placed.insert(root.id);
        self.expand(root, 0, &mut walk)
    }

    fn expand(&self, record: EmailRecord, depth: usize, walk: &mut Walk) -> Result<ConversationNode> {
        let mut node = ConversationNode::leaf(record, depth);
        let message_id = node.record.message_id.clone();

        if message_id.is_empty()
            || depth >= self.limits.max_tree_depth
            || !walk.expanded.insert(message_id.clone())
        {
            return Ok(node);
        }

        for reply in self.db.direct_replies(&message_id)? {
            if !walk.placed.insert(reply.id) {
                continue;
            }
            let child = self.expand(reply, depth + 1, walk)?;
            node.reply_count += 1 + child.reply_count;
            node.children.push(child);
        }
        Ok(node)
    }

    /// The whole conversation containing email `id`, as a tree from its root.
    pub fn conversation_tree(&self, id: i64) -> Result<ConversationNode> {
        let record = self.db.require_email(id)?;
        let root = self.root_or_self(&record)?;
        self.build_tree(root)
    }

    /// The conversation containing email `id` as a flat pre-order list.
    pub fn conversation_emails(&self, id: i64) -> Result<Vec<EmailRecord>> {
        let tree = self.conversation_tree(id)?;
        Ok(tree.flatten().into_iter().cloned().collect())
    }

    /// A page of conversation roots, newest first, each with its reply count
    /// and no children expanded.
    pub fn roots_with_reply_counts(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConversationNode>> {
        let roots = self.db.root_emails(limit, offset)?;
        let mut nodes = Vec::with_capacity(roots.len());
        for record in roots {
            let reply_count = match self.db.count_replies(&record.message_id) {
                Ok(n) => n as usize,
                Err(e) => {
                    warn!(id = record.id, error = %e, "Could not count replies");
                    0
                }
            };
            let mut node = ConversationNode::leaf(record, 0);
            node.reply_count = reply_count;
            nodes.push(node);
        }
        Ok(nodes)
    }
}
