//! Remote Client — REST access to the review-request collection.
//!
//! `ReviewBackend` is the seam the engine depends on; `HttpReviewBackend`
//! implements it against the hosted collection. All calls are idempotent-safe
//! to retry, so transient transport failures and 5xx responses are retried a
//! bounded number of times before surfacing as a `FetchError`.
//!
//! Decoding is where identity gets canonical: every ID is normalized to one
//! lowercase string form here, and the backend's legacy single `status`
//! column is split into the `workflow_state` / `response_state` pair.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::DEFAULT_FETCH_ATTEMPTS;
use crate::error::FetchError;
use crate::models::{
    EmbeddedMessage, FollowUpMessage, ProviderUrgency, ResponseState, ResponseType,
    ReviewRequest, TriageOutcome, WorkflowState,
};

/// Base delay between retry attempts; scaled linearly per attempt.
const RETRY_BASE_DELAY_MS: u64 = 250;

/// Per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 30;

// ═══════════════════════════════════════════════════════════
// Backend seam
// ═══════════════════════════════════════════════════════════

/// A provider response as submitted to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSubmission {
    pub text: String,
    pub provider_name: Option<String>,
    pub urgency: Option<ProviderUrgency>,
    pub response_type: ResponseType,
}

/// Remote collection of review requests and follow-up messages.
#[async_trait]
pub trait ReviewBackend: Send + Sync {
    async fn fetch_review_requests(
        &self,
        filter: Option<WorkflowState>,
    ) -> Result<Vec<ReviewRequest>, FetchError>;

    async fn fetch_conversation_detail(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ReviewRequest>, FetchError>;

    async fn fetch_follow_up_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<FollowUpMessage>, FetchError>;

    async fn update_workflow_state(
        &self,
        id: &str,
        state: WorkflowState,
    ) -> Result<(), FetchError>;

    async fn submit_response(
        &self,
        id: &str,
        submission: &ResponseSubmission,
    ) -> Result<(), FetchError>;

    async fn set_flag_reason(&self, id: &str, reason: Option<&str>) -> Result<(), FetchError>;
}

// ═══════════════════════════════════════════════════════════
// Identity and status normalization
// ═══════════════════════════════════════════════════════════

/// Normalize an identifier to its canonical string form.
///
/// UUIDs in any accepted representation (uppercase, braced, simple) become
/// the lowercase hyphenated form; non-UUID identifiers are trimmed and
/// lowercased. Everything past this boundary compares IDs with plain `==`.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match Uuid::parse_str(trimmed) {
        Ok(uuid) => uuid.to_string(),
        Err(_) => trimmed.to_ascii_lowercase(),
    }
}

/// Split the backend's single `status` column into the two client fields.
///
/// A recorded response makes `response_state` Responded no matter what the
/// workflow column says — a flagged-but-responded row must keep its response
/// visible after decode.
pub fn split_status(status: &str, has_response: bool) -> (WorkflowState, ResponseState) {
    let workflow = match status.trim().to_ascii_lowercase().as_str() {
        "flagged" => WorkflowState::Flagged,
        "escalated" => WorkflowState::Escalated,
        "dismissed" => WorkflowState::Dismissed,
        "responded" => WorkflowState::Responded,
        _ => WorkflowState::Pending,
    };
    let response = if has_response || workflow == WorkflowState::Responded {
        ResponseState::Responded
    } else {
        ResponseState::NoResponse
    };
    (workflow, response)
}

/// Wire value for a workflow state update.
pub fn workflow_to_wire(state: WorkflowState) -> &'static str {
    match state {
        WorkflowState::Pending => "pending",
        WorkflowState::Flagged => "flagged",
        WorkflowState::Escalated => "escalated",
        WorkflowState::Dismissed => "dismissed",
        WorkflowState::Responded => "responded",
    }
}

fn parse_wire_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(raw, error = %e, "dropping unparsable wire timestamp");
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Wire rows
// ═══════════════════════════════════════════════════════════

fn default_status() -> String {
    "pending".to_string()
}

/// Raw review-request row as the backend serves it.
#[derive(Debug, Deserialize)]
struct ReviewRequestRow {
    id: String,
    conversation_id: String,
    user_id: String,
    conversation_title: String,
    child_name: String,
    child_age: String,
    #[serde(default)]
    child_dob: Option<String>,
    #[serde(default)]
    triage_outcome: Option<String>,
    #[serde(default)]
    conversation_summary: Option<String>,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    provider_name: Option<String>,
    #[serde(default)]
    provider_response: Option<String>,
    #[serde(default)]
    provider_urgency: Option<String>,
    #[serde(default)]
    responded_at: Option<String>,
    #[serde(default)]
    flag_reason: Option<String>,
    #[serde(default)]
    flagged_at: Option<String>,
    #[serde(default)]
    unflagged_at: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    conversation_messages: Vec<EmbeddedMessage>,
}

fn decode_row(row: ReviewRequestRow) -> ReviewRequest {
    let responded_at = parse_wire_timestamp(row.responded_at.as_deref());
    let (workflow_state, response_state) = split_status(&row.status, responded_at.is_some());

    let triage_outcome = row
        .triage_outcome
        .as_deref()
        .and_then(TriageOutcome::parse_wire)
        .unwrap_or_else(|| {
            tracing::debug!(
                raw = row.triage_outcome.as_deref().unwrap_or(""),
                "unknown triage outcome, defaulting to routine-visit"
            );
            TriageOutcome::RoutineVisit
        });

    let created_at = parse_wire_timestamp(row.created_at.as_deref()).unwrap_or(DateTime::UNIX_EPOCH);

    ReviewRequest {
        id: normalize_id(&row.id),
        conversation_id: normalize_id(&row.conversation_id),
        user_id: normalize_id(&row.user_id),
        title: row.conversation_title,
        patient_name: row.child_name,
        patient_age: row.child_age,
        patient_dob: row
            .child_dob
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        triage_outcome,
        summary: row.conversation_summary.unwrap_or_default(),
        workflow_state,
        response_state,
        provider_name: row.provider_name,
        provider_response_text: row.provider_response,
        provider_urgency: row.provider_urgency.as_deref().and_then(|u| u.parse().ok()),
        responded_at,
        flag_reason: row.flag_reason,
        flagged_at: parse_wire_timestamp(row.flagged_at.as_deref()),
        unflagged_at: parse_wire_timestamp(row.unflagged_at.as_deref()),
        created_at,
        messages: row.conversation_messages,
    }
}

fn decode_follow_up(mut msg: FollowUpMessage) -> FollowUpMessage {
    msg.id = normalize_id(&msg.id);
    msg.conversation_id = normalize_id(&msg.conversation_id);
    msg.user_id = normalize_id(&msg.user_id);
    msg
}

// ═══════════════════════════════════════════════════════════
// HTTP implementation
// ═══════════════════════════════════════════════════════════

/// REST client for the hosted review-request collection.
pub struct HttpReviewBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    attempts: u32,
}

impl HttpReviewBackend {
    pub fn new(base_url: &str, api_key: &str, attempts: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            attempts: attempts.max(1),
        }
    }

    /// Client with the default retry policy.
    pub fn with_defaults(base_url: &str, api_key: &str) -> Self {
        Self::new(base_url, api_key, DEFAULT_FETCH_ATTEMPTS)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request, retrying transport errors and 5xx responses with
    /// linearly spaced delays. 4xx responses are not retried.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, FetchError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = FetchError::new("request not attempted");
        for attempt in 1..=self.attempts {
            match build().bearer_auth(&self.api_key).send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    tracing::debug!(attempt, status = %resp.status(), "transient backend error");
                    last_err = FetchError::new(format!("backend returned {}", resp.status()));
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "transport error");
                    last_err = FetchError::new(format!("transport error: {e}"));
                }
            }
            if attempt < self.attempts {
                tokio::time::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64))
                    .await;
            }
        }
        Err(last_err)
    }
}

fn require_success(resp: &reqwest::Response) -> Result<(), FetchError> {
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(FetchError::new(format!(
            "backend returned {}",
            resp.status()
        )))
    }
}

#[async_trait]
impl ReviewBackend for HttpReviewBackend {
    async fn fetch_review_requests(
        &self,
        filter: Option<WorkflowState>,
    ) -> Result<Vec<ReviewRequest>, FetchError> {
        let url = self.url("review-requests");
        let resp = self
            .send_with_retry(|| {
                let req = self.client.get(&url);
                match filter {
                    Some(state) => req.query(&[("status", workflow_to_wire(state))]),
                    None => req,
                }
            })
            .await?;
        require_success(&resp)?;

        let rows: Vec<ReviewRequestRow> = resp
            .json()
            .await
            .map_err(|e| FetchError::new(format!("malformed review list: {e}")))?;
        let requests: Vec<ReviewRequest> = rows.into_iter().map(decode_row).collect();
        tracing::debug!(count = requests.len(), "fetched review requests");
        Ok(requests)
    }

    async fn fetch_conversation_detail(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ReviewRequest>, FetchError> {
        let id = normalize_id(conversation_id);
        let url = self.url(&format!("review-requests/{id}"));
        let resp = self.send_with_retry(|| self.client.get(&url)).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        require_success(&resp)?;

        let row: ReviewRequestRow = resp
            .json()
            .await
            .map_err(|e| FetchError::new(format!("malformed conversation detail: {e}")))?;
        Ok(Some(decode_row(row)))
    }

    async fn fetch_follow_up_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<FollowUpMessage>, FetchError> {
        let id = normalize_id(conversation_id);
        let url = self.url(&format!("review-requests/{id}/follow-ups"));
        let resp = self.send_with_retry(|| self.client.get(&url)).await?;
        require_success(&resp)?;

        let rows: Vec<FollowUpMessage> = resp
            .json()
            .await
            .map_err(|e| FetchError::new(format!("malformed follow-up list: {e}")))?;
        Ok(rows.into_iter().map(decode_follow_up).collect())
    }

    async fn update_workflow_state(
        &self,
        id: &str,
        state: WorkflowState,
    ) -> Result<(), FetchError> {
        let id = normalize_id(id);
        let url = self.url(&format!("review-requests/{id}/status"));
        let body = json!({ "status": workflow_to_wire(state) });
        let resp = self
            .send_with_retry(|| self.client.patch(&url).json(&body))
            .await?;
        require_success(&resp)
    }

    async fn submit_response(
        &self,
        id: &str,
        submission: &ResponseSubmission,
    ) -> Result<(), FetchError> {
        let id = normalize_id(id);
        let url = self.url(&format!("review-requests/{id}/response"));
        let body = json!({
            "response": submission.text,
            "provider_name": submission.provider_name,
            "urgency": submission.urgency.map(|u| u.as_str()),
            "response_type": submission.response_type.as_str(),
        });
        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        require_success(&resp)
    }

    async fn set_flag_reason(&self, id: &str, reason: Option<&str>) -> Result<(), FetchError> {
        let id = normalize_id(id);
        let url = self.url(&format!("review-requests/{id}/flag"));
        let body = json!({ "flag_reason": reason });
        let resp = self
            .send_with_retry(|| self.client.patch(&url).json(&body))
            .await?;
        require_success(&resp)
    }
}

// ═══════════════════════════════════════════════════════════
// Test backend
// ═══════════════════════════════════════════════════════════


// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
