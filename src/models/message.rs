//! Follow-up messages and the unified timeline view model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::review_request::TriageOutcome;

/// A post-triage message exchanged on a conversation, stored in its own
/// backend collection and joined to the review request by `conversation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpMessage {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(rename = "is_from_user")]
    pub is_from_patient: bool,
    /// Raw wire timestamp; parsed fail-soft by the merger.
    pub timestamp: String,
    pub is_read: bool,
}

/// Who authored a message in the unified timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderLabel {
    Patient,
    Assistant,
    Clinician,
}

impl SenderLabel {
    /// Display label for the UI.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Patient => "Patient",
            Self::Assistant => "Care Assistant",
            Self::Clinician => "Clinician",
        }
    }
}

/// One entry in the merged conversation timeline.
///
/// Client-only view model — recomputed on every detail load, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnifiedMessage {
    pub content: String,
    pub is_from_patient: bool,
    pub timestamp: DateTime<Utc>,
    pub sender: SenderLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage_outcome: Option<TriageOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}
