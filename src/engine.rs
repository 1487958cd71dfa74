//! Engine facade — the surface the UI layer talks to.
//!
//! Owns the Review List Store and the Detail Cache behind `RwLock`s so every
//! state mutation is serialized; network fetches run off-lock and marshal
//! their results back before touching shared state. Dependencies (backend,
//! clock, config) are constructor-injected, so tests instantiate a fresh
//! engine with a fake network and a manual clock.
//!
//! Mutations are optimistic: the held copy updates immediately, the detail
//! cache entry is invalidated, then the change is pushed to the backend. A
//! rejected push is surfaced as `PushFailed` while the optimistic copy stays
//! and the next fetch reconciles against the authoritative record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::clock::Clock;
use crate::config::{EngineConfig, MAX_FLAG_REASON_LEN, MAX_RESPONSE_TEXT_LEN};
use crate::detail_cache::DetailCache;
use crate::error::{EngineError, FetchError};
use crate::merge::merge;
use crate::models::{
    ProviderUrgency, ResponseType, ReviewRequest, UnifiedMessage, WorkflowState,
};
use crate::remote::{normalize_id, ResponseSubmission, ReviewBackend};
use crate::store::{ReviewCounts, ReviewListStore};
use crate::workflow;

/// A conversation's full record plus its merged timeline, as the detail
/// screen renders it.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    pub request: ReviewRequest,
    pub messages: Vec<UnifiedMessage>,
}

pub struct ReviewEngine {
    backend: Arc<dyn ReviewBackend>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    store: RwLock<ReviewListStore>,
    cache: RwLock<DetailCache>,
    /// Bumped when a refresh fetch starts; a completed fetch publishes only
    /// if no newer refresh started in the meantime.
    refresh_generation: AtomicU64,
}

impl ReviewEngine {
    pub fn new(backend: Arc<dyn ReviewBackend>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let store = ReviewListStore::new(config.debounce_interval);
        Self {
            backend,
            clock,
            config,
            store: RwLock::new(store),
            cache: RwLock::new(DetailCache::new()),
            refresh_generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── List refresh ──────────────────────────────────────

    /// Refresh the review list. Non-forced calls inside the debounce window
    /// return `Ok(false)` without contacting the backend; `force` bypasses
    /// the window (pull-to-refresh, unlock recovery). Returns whether a new
    /// list was published.
    pub async fn refresh(&self, force: bool) -> Result<bool, EngineError> {
        let now = self.clock.now();
        {
            let store = self.store.read().map_err(|_| EngineError::LockPoisoned)?;
            if store.should_debounce(now, force) {
                tracing::debug!("refresh inside debounce window, skipping");
                return Ok(false);
            }
        }

        let generation = self.refresh_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = match self.backend.fetch_review_requests(None).await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "list refresh failed, keeping last-known-good list");
                return Err(e.into());
            }
        };

        let now = self.clock.now();
        let mut store = self.store.write().map_err(|_| EngineError::LockPoisoned)?;
        if self.refresh_generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "discarding superseded refresh result");
            return Ok(false);
        }
        Ok(store.publish(fetched, now))
    }

    // ── Reads ─────────────────────────────────────────────

    /// Snapshot of the held review list.
    pub fn requests(&self) -> Result<Vec<ReviewRequest>, EngineError> {
        let store = self.store.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(store.requests().to_vec())
    }

    /// Version counter of the held list; increments only on published change.
    pub fn version(&self) -> Result<u64, EngineError> {
        let store = self.store.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(store.version())
    }

    /// Derived counts over the held list.
    pub fn counts(&self) -> Result<ReviewCounts, EngineError> {
        let store = self.store.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(store.counts(self.clock.now()))
    }

    /// Cached detail record, if present. Never fetches.
    pub fn cached_detail(&self, conversation_id: &str) -> Result<Option<ReviewRequest>, EngineError> {
        let id = normalize_id(conversation_id);
        let cache = self.cache.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(cache.get(&id).map(|entry| entry.value.clone()))
    }

    // ── Detail load ───────────────────────────────────────

    /// Load a conversation's full detail: invalidate any cached entry, fetch
    /// fresh detail and follow-ups, merge the timeline, cache the result,
    /// and sync the matching summary row.
    pub async fn load_detail(&self, conversation_id: &str) -> Result<ConversationDetail, EngineError> {
        let id = normalize_id(conversation_id);
        {
            let mut cache = self.cache.write().map_err(|_| EngineError::LockPoisoned)?;
            cache.invalidate(&id);
        }

        let request = self
            .backend
            .fetch_conversation_detail(&id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound(id.clone()))?;
        let follow_ups = self
            .backend
            .fetch_follow_up_messages(&id)
            .await
            .map_err(EngineError::from)?;

        let messages = merge(&request.messages, &follow_ups, request.triage_outcome);
        let now = self.clock.now();
        {
            let mut cache = self.cache.write().map_err(|_| EngineError::LockPoisoned)?;
            cache.insert(request.clone(), now);
        }
        {
            let mut store = self.store.write().map_err(|_| EngineError::LockPoisoned)?;
            store.sync_detail(&request);
        }

        tracing::debug!(
            conversation_id = %id,
            messages = messages.len(),
            "conversation detail loaded"
        );
        Ok(ConversationDetail { request, messages })
    }

    // ── Mutations ─────────────────────────────────────────

    /// Submit a provider response. Validated before any network call.
    pub async fn submit_response(
        &self,
        conversation_id: &str,
        text: &str,
        provider_name: Option<String>,
        urgency: Option<ProviderUrgency>,
        response_type: ResponseType,
    ) -> Result<ReviewRequest, EngineError> {
        validate_response_text(text)?;

        let now = self.clock.now();
        let updated = self.apply_local(conversation_id, |req| {
            workflow::record_response(
                req,
                text,
                provider_name.as_deref(),
                urgency,
                response_type,
                now,
            );
        })?;

        let submission = ResponseSubmission {
            text: text.to_string(),
            provider_name,
            urgency,
            response_type,
        };
        if let Err(e) = self.backend.submit_response(&updated.id, &submission).await {
            return Err(push_failed(updated, e));
        }
        tracing::info!(id = %updated.id, response_type = response_type.as_str(), "response submitted");
        Ok(updated)
    }

    /// Flag a conversation for follow-up.
    pub async fn flag(
        &self,
        conversation_id: &str,
        reason: Option<String>,
    ) -> Result<ReviewRequest, EngineError> {
        if let Some(r) = &reason {
            if r.chars().count() > MAX_FLAG_REASON_LEN {
                return Err(EngineError::Validation(format!(
                    "flag reason exceeds {MAX_FLAG_REASON_LEN} characters"
                )));
            }
        }

        let now = self.clock.now();
        let updated = self.apply_local(conversation_id, |req| workflow::flag(req, reason, now))?;

        if let Err(e) = self
            .backend
            .set_flag_reason(&updated.id, updated.flag_reason.as_deref())
            .await
        {
            return Err(push_failed(updated, e));
        }
        if let Err(e) = self
            .backend
            .update_workflow_state(&updated.id, WorkflowState::Flagged)
            .await
        {
            return Err(push_failed(updated, e));
        }
        tracing::info!(id = %updated.id, "conversation flagged");
        Ok(updated)
    }

    /// Clear a flag, restoring the workflow stage from `response_state`.
    pub async fn unflag(&self, conversation_id: &str) -> Result<ReviewRequest, EngineError> {
        let now = self.clock.now();
        let updated = self.apply_local(conversation_id, |req| workflow::unflag(req, now))?;

        if let Err(e) = self.backend.set_flag_reason(&updated.id, None).await {
            return Err(push_failed(updated, e));
        }
        if let Err(e) = self
            .backend
            .update_workflow_state(&updated.id, updated.workflow_state)
            .await
        {
            return Err(push_failed(updated, e));
        }
        tracing::info!(id = %updated.id, restored = ?updated.workflow_state, "conversation unflagged");
        Ok(updated)
    }

    pub async fn escalate(&self, conversation_id: &str) -> Result<ReviewRequest, EngineError> {
        self.transition(conversation_id, WorkflowState::Escalated, workflow::escalate)
            .await
    }

    pub async fn dismiss(&self, conversation_id: &str) -> Result<ReviewRequest, EngineError> {
        self.transition(conversation_id, WorkflowState::Dismissed, workflow::dismiss)
            .await
    }

    async fn transition(
        &self,
        conversation_id: &str,
        target: WorkflowState,
        apply: fn(&mut ReviewRequest),
    ) -> Result<ReviewRequest, EngineError> {
        let updated = self.apply_local(conversation_id, apply)?;
        if let Err(e) = self.backend.update_workflow_state(&updated.id, target).await {
            return Err(push_failed(updated, e));
        }
        tracing::info!(id = %updated.id, state = ?target, "workflow state updated");
        Ok(updated)
    }

    /// Optimistic local step shared by all mutations: update the held list
    /// record and invalidate the detail cache entry so the next load
    /// re-fetches.
    fn apply_local<F>(&self, conversation_id: &str, mutate: F) -> Result<ReviewRequest, EngineError>
    where
        F: FnOnce(&mut ReviewRequest),
    {
        let id = normalize_id(conversation_id);
        let updated = {
            let mut store = self.store.write().map_err(|_| EngineError::LockPoisoned)?;
            store
                .apply(&id, mutate)
                .ok_or_else(|| EngineError::NotFound(id.clone()))?
        };
        let mut cache = self.cache.write().map_err(|_| EngineError::LockPoisoned)?;
        cache.invalidate(&id);
        Ok(updated)
    }
}

fn push_failed(updated: ReviewRequest, err: FetchError) -> EngineError {
    tracing::warn!(
        id = %updated.id,
        error = %err,
        "backend push failed, keeping optimistic local copy"
    );
    EngineError::PushFailed {
        source: err,
        updated: Box::new(updated),
    }
}

fn validate_response_text(text: &str) -> Result<(), EngineError> {
    if text.trim().is_empty() {
        return Err(EngineError::Validation("response text is empty".into()));
    }
    if text.chars().count() > MAX_RESPONSE_TEXT_LEN {
        return Err(EngineError::Validation(format!(
            "response text exceeds {MAX_RESPONSE_TEXT_LEN} characters"
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::test::ManualClock;
    use crate::models::fixtures::{embedded, fixed_now, follow_up, pending_request};
    use crate::models::{ResponseState, SenderLabel};
    use crate::remote::testing::FakeBackend;

    fn test_config() -> EngineConfig {
        EngineConfig {
            refresh_interval: Duration::from_secs(30),
            debounce_interval: Duration::from_secs(10),
            fetch_attempts: 1,
        }
    }

    fn setup() -> (Arc<FakeBackend>, Arc<ManualClock>, ReviewEngine) {
        let backend = Arc::new(FakeBackend::new());
        let clock = Arc::new(ManualClock::at(fixed_now()));
        let engine = ReviewEngine::new(backend.clone(), clock.clone(), test_config());
        (backend, clock, engine)
    }

    // ── Refresh / debounce ────────────────────────────────

    #[tokio::test]
    async fn second_refresh_within_debounce_skips_fetch() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);

        assert!(engine.refresh(false).await.unwrap());
        assert!(!engine.refresh(false).await.unwrap());
        assert_eq!(backend.list_calls(), 1, "debounced call must not fetch");
    }

    #[tokio::test]
    async fn force_refresh_bypasses_debounce() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);

        engine.refresh(false).await.unwrap();
        engine.refresh(true).await.unwrap();
        assert_eq!(backend.list_calls(), 2);
    }

    #[tokio::test]
    async fn debounce_window_reopens_with_time() {
        let (backend, clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);

        engine.refresh(false).await.unwrap();
        clock.advance_secs(10);
        engine.refresh(false).await.unwrap();
        assert_eq!(backend.list_calls(), 2);
    }

    #[tokio::test]
    async fn identical_fetch_leaves_version_unchanged() {
        let (backend, clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);

        assert!(engine.refresh(true).await.unwrap());
        let version = engine.version().unwrap();

        clock.advance_secs(60);
        let published = engine.refresh(true).await.unwrap();
        assert!(!published);
        assert_eq!(engine.version().unwrap(), version);
        assert_eq!(backend.list_calls(), 2, "fetch still happened");
    }

    #[tokio::test]
    async fn fetch_failure_keeps_last_known_good_list() {
        let (backend, clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);
        engine.refresh(true).await.unwrap();

        backend.set_fail_fetches(true);
        clock.advance_secs(60);
        let err = engine.refresh(false).await.unwrap_err();
        assert!(matches!(err, EngineError::Fetch(_)));
        assert_eq!(engine.requests().unwrap().len(), 1, "prior state untouched");

        // The failed fetch did not advance the debounce window: the next
        // call retries immediately.
        backend.set_fail_fetches(false);
        engine.refresh(false).await.unwrap();
        assert_eq!(backend.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_refresh_result_is_discarded() {
        let backend = Arc::new(FakeBackend::new());
        let clock = Arc::new(ManualClock::at(fixed_now()));
        let engine = Arc::new(ReviewEngine::new(backend.clone(), clock, test_config()));

        let mut stale = pending_request("conv-1");
        stale.title = "stale".to_string();
        backend.set_list(vec![stale]);
        backend.set_list_delay(Some(Duration::from_secs(5)));

        let slow_engine = engine.clone();
        let slow = tokio::spawn(async move { slow_engine.refresh(true).await });
        tokio::task::yield_now().await; // slow fetch is now in flight

        backend.set_list_delay(None);
        let mut fresh = pending_request("conv-1");
        fresh.title = "fresh".to_string();
        backend.set_list(vec![fresh]);
        assert!(engine.refresh(true).await.unwrap());
        let version = engine.version().unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        let slow_published = slow.await.unwrap().unwrap();
        assert!(!slow_published, "superseded refresh must not publish");
        assert_eq!(engine.version().unwrap(), version);
        assert_eq!(engine.requests().unwrap()[0].title, "fresh");
    }

    // ── Detail load ───────────────────────────────────────

    #[tokio::test]
    async fn load_detail_caches_and_syncs_summary_row() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);
        engine.refresh(true).await.unwrap();

        let mut detail = pending_request("conv-1");
        detail.summary = "fuller detail".to_string();
        backend.set_detail(detail);

        let loaded = engine.load_detail("conv-1").await.unwrap();
        assert_eq!(loaded.request.summary, "fuller detail");

        assert_eq!(
            engine.cached_detail("conv-1").unwrap().unwrap().summary,
            "fuller detail"
        );
        assert_eq!(
            engine.requests().unwrap()[0].summary,
            "fuller detail",
            "summary row synced from detail"
        );
    }

    #[tokio::test]
    async fn load_detail_merges_both_streams() {
        let (backend, _clock, engine) = setup();
        let mut detail = pending_request("conv-1");
        detail.messages = vec![
            embedded("fever started", true, "2026-03-10T09:00:00Z"),
            embedded("how high?", false, "2026-03-10T09:10:00Z"),
        ];
        backend.set_detail(detail);
        backend.set_follow_ups(
            "conv-1",
            vec![follow_up("conv-1", "101F", true, "2026-03-10T09:05:00Z")],
        );

        let loaded = engine.load_detail("conv-1").await.unwrap();
        let contents: Vec<&str> = loaded.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["fever started", "101F", "how high?"]);
        assert_eq!(loaded.messages[1].sender, SenderLabel::Patient);
    }

    #[tokio::test]
    async fn load_detail_unknown_conversation_is_not_found() {
        let (_backend, _clock, engine) = setup();
        let err = engine.load_detail("conv-missing").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn cached_detail_never_fetches() {
        let (_backend, _clock, engine) = setup();
        assert!(engine.cached_detail("conv-1").unwrap().is_none());
    }

    // ── Mutations ─────────────────────────────────────────

    #[tokio::test]
    async fn mutation_invalidates_detail_cache() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);
        engine.refresh(true).await.unwrap();
        engine.load_detail("conv-1").await.unwrap();
        assert!(engine.cached_detail("conv-1").unwrap().is_some());

        engine.flag("conv-1", Some("check".to_string())).await.unwrap();
        assert!(
            engine.cached_detail("conv-1").unwrap().is_none(),
            "cache entry must be gone until the next load"
        );

        engine.load_detail("conv-1").await.unwrap();
        assert!(engine.cached_detail("conv-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn submit_flag_unflag_scenario() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-a")]);
        engine.refresh(true).await.unwrap();

        let after_response = engine
            .submit_response(
                "conv-a",
                "Take her to urgent care today.",
                Some("Dr Hobbs".to_string()),
                Some(ProviderUrgency::Urgent),
                ResponseType::VisitRecommendation,
            )
            .await
            .unwrap();
        assert_eq!(after_response.workflow_state, WorkflowState::Responded);
        assert_eq!(after_response.response_state, ResponseState::Responded);

        let flagged = engine
            .flag("conv-a", Some("follow up".to_string()))
            .await
            .unwrap();
        assert_eq!(flagged.workflow_state, WorkflowState::Flagged);
        assert_eq!(flagged.flag_reason.as_deref(), Some("follow up"));
        assert_eq!(flagged.response_state, ResponseState::Responded);

        let unflagged = engine.unflag("conv-a").await.unwrap();
        assert_eq!(unflagged.workflow_state, WorkflowState::Responded);
        assert!(unflagged.flag_reason.is_none());
        assert_eq!(unflagged.response_state, ResponseState::Responded);

        // All three mutations reached the backend, in order
        let mutations = backend.mutations();
        assert!(mutations[0].starts_with("submit_response:req-conv-a"));
        assert!(mutations[1].starts_with("set_flag_reason:req-conv-a:follow up"));
        assert!(mutations[2].starts_with("update_workflow_state:req-conv-a:flagged"));
        assert!(mutations[3].starts_with("set_flag_reason:req-conv-a:-"));
        assert!(mutations[4].starts_with("update_workflow_state:req-conv-a:responded"));
    }

    #[tokio::test]
    async fn escalate_and_dismiss_push_workflow_updates() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1"), pending_request("conv-2")]);
        engine.refresh(true).await.unwrap();

        let escalated = engine.escalate("conv-1").await.unwrap();
        assert_eq!(escalated.workflow_state, WorkflowState::Escalated);

        let dismissed = engine.dismiss("conv-2").await.unwrap();
        assert_eq!(dismissed.workflow_state, WorkflowState::Dismissed);

        let counts = engine.counts().unwrap();
        assert_eq!(counts.escalated, 1);
        assert_eq!(counts.pending, 0);
    }

    #[tokio::test]
    async fn empty_response_text_rejected_before_network() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);
        engine.refresh(true).await.unwrap();

        let err = engine
            .submit_response("conv-1", "   ", None, None, ResponseType::Advice)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(backend.mutations().is_empty(), "no network call on validation failure");
        assert_eq!(
            engine.requests().unwrap()[0].response_state,
            ResponseState::NoResponse,
            "no optimistic update on validation failure"
        );
    }

    #[tokio::test]
    async fn oversized_response_text_rejected() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);
        engine.refresh(true).await.unwrap();

        let huge = "x".repeat(MAX_RESPONSE_TEXT_LEN + 1);
        let err = engine
            .submit_response("conv-1", &huge, None, None, ResponseType::Advice)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(backend.mutations().is_empty());
    }

    #[tokio::test]
    async fn oversized_flag_reason_rejected() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);
        engine.refresh(true).await.unwrap();

        let huge = "r".repeat(MAX_FLAG_REASON_LEN + 1);
        let err = engine.flag("conv-1", Some(huge)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(backend.mutations().is_empty());
    }

    #[tokio::test]
    async fn mutation_on_unknown_conversation_is_not_found() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);
        engine.refresh(true).await.unwrap();

        let err = engine.flag("conv-ghost", None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejected_push_keeps_optimistic_copy() {
        let (backend, _clock, engine) = setup();
        backend.set_list(vec![pending_request("conv-1")]);
        engine.refresh(true).await.unwrap();

        backend.set_fail_mutations(true);
        let err = engine.flag("conv-1", Some("check".to_string())).await.unwrap_err();
        match err {
            EngineError::PushFailed { updated, .. } => {
                assert_eq!(updated.workflow_state, WorkflowState::Flagged);
            }
            other => panic!("expected PushFailed, got: {other}"),
        }
        // The optimistic copy stays until the next fetch reconciles it
        assert_eq!(
            engine.requests().unwrap()[0].workflow_state,
            WorkflowState::Flagged
        );
    }

    #[tokio::test]
    async fn mutation_accepts_unnormalized_conversation_id() {
        let (backend, _clock, engine) = setup();
        let canonical = "c0ffee00-0000-0000-0000-000000000001";
        backend.set_list(vec![pending_request(canonical)]);
        engine.refresh(true).await.unwrap();

        let updated = engine
            .flag("C0FFEE00-0000-0000-0000-000000000001", None)
            .await
            .unwrap();
        assert_eq!(updated.conversation_id, canonical);
    }
}
