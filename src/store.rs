//! Review List Store — the authoritative in-memory summary collection.
//!
//! Publication is equality-gated: a fetch that returns a list identical in
//! all fields to the held one advances the debounce bookkeeping but leaves
//! the version counter alone, so downstream consumers see no spurious
//! change. Derived counts are pure projections, recomputed per read.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{ResponseState, ReviewRequest, WorkflowState};

/// Read-only projections over the held list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewCounts {
    pub pending: usize,
    pub flagged: usize,
    pub escalated: usize,
    pub responded_today: usize,
}

pub struct ReviewListStore {
    requests: Vec<ReviewRequest>,
    /// Bumped on every published change; downstream equality/version checks
    /// key off this.
    version: u64,
    last_refreshed_at: Option<DateTime<Utc>>,
    debounce: Duration,
}

impl ReviewListStore {
    pub fn new(debounce: std::time::Duration) -> Self {
        Self {
            requests: Vec::new(),
            version: 0,
            last_refreshed_at: None,
            debounce: Duration::from_std(debounce).unwrap_or_else(|_| Duration::seconds(10)),
        }
    }

    // ── Reads ─────────────────────────────────────────────

    pub fn requests(&self) -> &[ReviewRequest] {
        &self.requests
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed_at
    }

    pub fn get_by_conversation(&self, conversation_id: &str) -> Option<&ReviewRequest> {
        self.requests
            .iter()
            .find(|r| r.conversation_id == conversation_id)
    }

    /// Derived counts, always recomputed from current state.
    pub fn counts(&self, now: DateTime<Utc>) -> ReviewCounts {
        let today = now.date_naive();
        ReviewCounts {
            pending: self.count_state(WorkflowState::Pending),
            flagged: self.count_state(WorkflowState::Flagged),
            escalated: self.count_state(WorkflowState::Escalated),
            responded_today: self
                .requests
                .iter()
                .filter(|r| {
                    r.response_state == ResponseState::Responded
                        && r.responded_at.is_some_and(|at| at.date_naive() == today)
                })
                .count(),
        }
    }

    fn count_state(&self, state: WorkflowState) -> usize {
        self.requests
            .iter()
            .filter(|r| r.workflow_state == state)
            .count()
    }

    // ── Refresh bookkeeping ───────────────────────────────

    /// Whether a non-forced refresh should be skipped because the last
    /// successful refresh is still inside the debounce window.
    pub fn should_debounce(&self, now: DateTime<Utc>, force: bool) -> bool {
        if force {
            return false;
        }
        match self.last_refreshed_at {
            Some(last) => now.signed_duration_since(last) < self.debounce,
            None => false,
        }
    }

    /// Publish a successful fetch. Replaces the held list and bumps the
    /// version only if the fetched list differs by value; always advances
    /// `last_refreshed_at`. Returns whether a publish happened.
    pub fn publish(&mut self, fetched: Vec<ReviewRequest>, now: DateTime<Utc>) -> bool {
        self.last_refreshed_at = Some(now);
        if fetched == self.requests {
            tracing::debug!(count = fetched.len(), "fetched list unchanged, skipping publish");
            return false;
        }
        tracing::info!(
            count = fetched.len(),
            version = self.version + 1,
            "publishing refreshed review list"
        );
        self.requests = fetched;
        self.version += 1;
        true
    }

    // ── Local mutation ────────────────────────────────────

    /// Mutate the held record for a conversation in place, bumping the
    /// version. Returns a clone of the updated record.
    pub fn apply<F>(&mut self, conversation_id: &str, mutate: F) -> Option<ReviewRequest>
    where
        F: FnOnce(&mut ReviewRequest),
    {
        let req = self
            .requests
            .iter_mut()
            .find(|r| r.conversation_id == conversation_id)?;
        mutate(req);
        self.version += 1;
        Some(req.clone())
    }

    /// Replace the held record matching a freshly-fetched detail so the
    /// summary list and the detail cache stay consistent. No-op if the
    /// conversation is absent from the list or the record is unchanged.
    pub fn sync_detail(&mut self, detail: &ReviewRequest) -> bool {
        let Some(slot) = self
            .requests
            .iter_mut()
            .find(|r| r.conversation_id == detail.conversation_id)
        else {
            return false;
        };
        if *slot == *detail {
            return false;
        }
        *slot = detail.clone();
        self.version += 1;
        true
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
