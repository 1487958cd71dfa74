//! Review-request record and its workflow enums.
//!
//! A `ReviewRequest` is one patient conversation escalated for clinician
//! review. The backend's legacy single `status` column is split here into
//! two orthogonal fields:
//!
//! - `workflow_state` — the clinician-facing processing stage
//! - `response_state` — whether a clinical response has been recorded,
//!   visible to the patient-facing consumer
//!
//! `response_state` is monotonic: once `Responded` it never reverts, no
//! matter how `workflow_state` moves afterwards (see `workflow.rs`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// ReviewRequest
// ═══════════════════════════════════════════════════════════

/// One patient conversation awaiting or having received clinical review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// Opaque request identifier (canonical lowercase string form).
    pub id: String,
    /// Source conversation identifier (canonical lowercase string form).
    pub conversation_id: String,
    /// Patient account identifier.
    pub user_id: String,
    pub title: String,
    pub patient_name: String,
    /// Rendered age string as the backend presents it ("2 years, 3 months old").
    pub patient_age: String,
    pub patient_dob: Option<NaiveDate>,
    pub triage_outcome: TriageOutcome,
    pub summary: String,
    pub workflow_state: WorkflowState,
    pub response_state: ResponseState,
    pub provider_name: Option<String>,
    pub provider_response_text: Option<String>,
    pub provider_urgency: Option<ProviderUrgency>,
    /// Set exactly once, when the first response is recorded.
    pub responded_at: Option<DateTime<Utc>>,
    /// Cleared on unflag.
    pub flag_reason: Option<String>,
    pub flagged_at: Option<DateTime<Utc>>,
    pub unflagged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Initial triage conversation messages embedded in the request row.
    pub messages: Vec<EmbeddedMessage>,
}

impl ReviewRequest {
    /// Whether a clinical response is visible to the patient-facing consumer.
    pub fn has_visible_response(&self) -> bool {
        self.response_state == ResponseState::Responded
    }
}

/// An initial conversation message embedded in the review-request row.
///
/// The backend stores these camelCase inside the row's JSON column, with the
/// sender flag named from the patient app's perspective (`isFromUser`).
/// Timestamps stay raw strings here; the merger parses them fail-soft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedMessage {
    pub content: String,
    #[serde(rename = "isFromUser")]
    pub is_from_patient: bool,
    pub timestamp: String,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Workflow enums
// ═══════════════════════════════════════════════════════════

/// Clinician-facing processing stage. Drives list filtering and badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Flagged,
    Escalated,
    Dismissed,
    Responded,
}

/// Whether a clinical response has been recorded. Monotonic one-way flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseState {
    NoResponse,
    Responded,
}

/// Disposition the triage assistant reached for the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriageOutcome {
    EmergencyCall,
    EmergencyDrive,
    UrgentVisit,
    RoutineVisit,
    HomeCare,
}

impl TriageOutcome {
    /// Parse a wire value, accepting the backend's legacy three-level
    /// outcomes ("routine", "urgent", "emergency") alongside the full set.
    pub fn parse_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "emergency-call" | "emergency" => Some(Self::EmergencyCall),
            "emergency-drive" => Some(Self::EmergencyDrive),
            "urgent-visit" | "urgent" => Some(Self::UrgentVisit),
            "routine-visit" | "routine" => Some(Self::RoutineVisit),
            "home-care" => Some(Self::HomeCare),
            _ => None,
        }
    }
}

/// Urgency the provider attaches to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderUrgency {
    Routine,
    Urgent,
    Emergency,
}

impl ProviderUrgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Urgent => "urgent",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for ProviderUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderUrgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routine" => Ok(Self::Routine),
            "urgent" => Ok(Self::Urgent),
            "emergency" => Ok(Self::Emergency),
            other => Err(format!("unknown urgency value: {other:?}")),
        }
    }
}

/// The kind of response a provider submits.
///
/// Only `Escalation` carries a workflow side effect (the request moves to
/// `Escalated`). No response type ever flags a conversation — flagging is
/// exclusively the explicit flag action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Advice,
    VisitRecommendation,
    Escalation,
}

impl ResponseType {
    pub fn implies_escalation(&self) -> bool {
        matches!(self, Self::Escalation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advice => "advice",
            Self::VisitRecommendation => "visit_recommendation",
            Self::Escalation => "escalation",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
