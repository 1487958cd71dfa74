//! Engine data model: review requests, messages, and workflow enums.

pub mod message;
pub mod review_request;

pub use message::{FollowUpMessage, SenderLabel, UnifiedMessage};
pub use review_request::{
    EmbeddedMessage, ProviderUrgency, ResponseState, ResponseType, ReviewRequest, TriageOutcome,
    WorkflowState,
};
