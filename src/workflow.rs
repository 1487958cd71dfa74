//! Status Reconciler — workflow transitions for a review request.
//!
//! Two orthogonal fields, two rules that never bend:
//!
//! 1. `response_state` is monotonic. Once a response is recorded it stays
//!    visible through any later flag/unflag/escalate/dismiss sequence.
//! 2. Only the explicit flag action sets `workflow_state = Flagged`. A
//!    response submission never does, whatever its type.
//!
//! Unflag restores the pre-flag stage without any stashed snapshot: a
//! recorded response means the restore target is `Responded`, otherwise
//! `Pending`. The transitions are pure functions over the record; the
//! engine layers the optimistic-update and backend-push choreography on top.

use chrono::{DateTime, Utc};

use crate::models::{
    ProviderUrgency, ResponseState, ResponseType, ReviewRequest, WorkflowState,
};

/// Record a provider response.
///
/// `responded_at` is set exactly once; a second response updates the text
/// but keeps the original timestamp. The workflow stage moves to `Responded`
/// unless the response type itself escalates.
pub fn record_response(
    req: &mut ReviewRequest,
    text: &str,
    provider_name: Option<&str>,
    urgency: Option<ProviderUrgency>,
    response_type: ResponseType,
    now: DateTime<Utc>,
) {
    req.provider_response_text = Some(text.to_string());
    if let Some(name) = provider_name {
        req.provider_name = Some(name.to_string());
    }
    if urgency.is_some() {
        req.provider_urgency = urgency;
    }
    req.responded_at = req.responded_at.or(Some(now));
    req.response_state = ResponseState::Responded;
    req.workflow_state = if response_type.implies_escalation() {
        WorkflowState::Escalated
    } else {
        WorkflowState::Responded
    };
}

/// Flag for follow-up. Leaves `response_state` untouched.
pub fn flag(req: &mut ReviewRequest, reason: Option<String>, now: DateTime<Utc>) {
    req.flag_reason = reason;
    req.flagged_at = Some(now);
    req.workflow_state = WorkflowState::Flagged;
}

/// Clear the flag and restore the workflow stage derived from
/// `response_state` alone.
pub fn unflag(req: &mut ReviewRequest, now: DateTime<Utc>) {
    req.flag_reason = None;
    req.unflagged_at = Some(now);
    req.workflow_state = match req.response_state {
        ResponseState::Responded => WorkflowState::Responded,
        ResponseState::NoResponse => WorkflowState::Pending,
    };
}

/// Escalate. No effect on `response_state`.
pub fn escalate(req: &mut ReviewRequest) {
    req.workflow_state = WorkflowState::Escalated;
}

/// Dismiss. No effect on `response_state`; a recorded response stays
/// visible indefinitely.
pub fn dismiss(req: &mut ReviewRequest) {
    req.workflow_state = WorkflowState::Dismissed;
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
