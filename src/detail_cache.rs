//! Detail Cache — per-conversation full records, keyed by conversation ID.
//!
//! Entries are invalidated (removed) rather than marked stale: conversation
//! detail only changes through explicit clinician action or backend writes
//! the client cannot observe, so every mutation path removes the entry and
//! the next load re-fetches. No TTL.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::ReviewRequest;

/// A cached detail record and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: ReviewRequest,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct DetailCache {
    entries: HashMap<String, CacheEntry>,
}

impl DetailCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Read-only lookup. Never triggers a fetch.
    pub fn get(&self, conversation_id: &str) -> Option<&CacheEntry> {
        self.entries.get(conversation_id)
    }

    /// Store a freshly-fetched detail, keyed by its conversation ID.
    pub fn insert(&mut self, request: ReviewRequest, fetched_at: DateTime<Utc>) {
        self.entries.insert(
            request.conversation_id.clone(),
            CacheEntry {
                value: request,
                fetched_at,
            },
        );
    }

    /// Remove the entry so the next load re-fetches. Returns whether an
    /// entry was present.
    pub fn invalidate(&mut self, conversation_id: &str) -> bool {
        self.entries.remove(conversation_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
