//! Message Merger — one ordered timeline from two message streams.
//!
//! Initial triage messages are embedded in the review-request row and
//! authored by the patient or the triage assistant; follow-ups live in their
//! own collection and are authored by the patient or the clinician. The two
//! streams are independently ordered, carry independently-formatted wire
//! timestamps, and are merged fresh on every detail load.
//!
//! A message whose timestamp fails to parse is dropped on its own — one bad
//! row never aborts the merge.

use chrono::{DateTime, Utc};

use crate::models::{
    EmbeddedMessage, FollowUpMessage, SenderLabel, TriageOutcome, UnifiedMessage,
};

/// Merge the embedded initial messages and the follow-up stream into one
/// timeline, ascending by timestamp. Equal timestamps keep input order, with
/// initial messages ahead of follow-ups (stable sort over the concatenation).
///
/// The triage disposition is attached to the last assistant-authored initial
/// message — where the assistant delivered it.
pub fn merge(
    initial: &[EmbeddedMessage],
    follow_ups: &[FollowUpMessage],
    outcome: TriageOutcome,
) -> Vec<UnifiedMessage> {
    let last_assistant = initial.iter().rposition(|m| !m.is_from_patient);

    let mut timeline: Vec<UnifiedMessage> = initial
        .iter()
        .enumerate()
        .filter_map(|(idx, msg)| {
            let timestamp = parse_timestamp(&msg.timestamp)?;
            Some(UnifiedMessage {
                content: msg.content.clone(),
                is_from_patient: msg.is_from_patient,
                timestamp,
                sender: if msg.is_from_patient {
                    SenderLabel::Patient
                } else {
                    SenderLabel::Assistant
                },
                triage_outcome: (last_assistant == Some(idx)).then_some(outcome),
                image_url: msg.image_url.clone(),
            })
        })
        .collect();

    timeline.extend(follow_ups.iter().filter_map(|msg| {
        let timestamp = parse_timestamp(&msg.timestamp)?;
        Some(UnifiedMessage {
            content: msg.content.clone(),
            is_from_patient: msg.is_from_patient,
            timestamp,
            sender: if msg.is_from_patient {
                SenderLabel::Patient
            } else {
                SenderLabel::Clinician
            },
            triage_outcome: None,
            image_url: None,
        })
    }));

    // Stable: ties keep concatenation order (initial before follow-ups).
    timeline.sort_by_key(|m| m.timestamp);
    timeline
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(raw, error = %e, "dropping message with unparsable timestamp");
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
