//! Session-scoped comment deduplication.

use std::collections::HashSet;

use super::event::CommentId;

/// Identifiers accepted during the current watch session.
///
/// The set only grows; it is dropped together with the session.
#[derive(Debug, Default)]
pub struct SeenIds {
    ids: HashSet<CommentId>,
}

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if the id has not been accepted yet
    pub fn is_new(&self, id: &CommentId) -> bool {
        !self.ids.contains(id)
    }

    pub fn mark_seen(&mut self, id: CommentId) {
        self.ids.insert(id);
    }

    /// Record the id, returning `true` on first sight.
    pub fn accept(&mut self, id: &CommentId) -> bool {
        if self.is_new(id) {
            self.mark_seen(id.clone());
            true
        } else {
            false
        }
    }
}
