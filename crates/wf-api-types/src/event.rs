use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::roadmap::ContentKind;
use crate::task::{FailedConcepts, TaskStatus};

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// One message on the per-task generation channel.
///
/// Kinds this client does not know about deserialize to [`Unknown`]; they
/// still prove the channel is alive.
///
/// [`Unknown`]: GenerationEvent::Unknown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    Connected {
        #[serde(default)]
        task_id: String,
        #[serde(default)]
        message: Option<String>,
    },
    Status(StatusPayload),
    Progress(ProgressPayload),
    ConceptStart(ConceptPayload),
    ConceptComplete(ConceptPayload),
    ConceptFailed(ConceptFailedPayload),
    BatchStart(BatchStartPayload),
    BatchComplete(BatchCompletePayload),
    HumanReview(HumanReviewPayload),
    Completed(CompletedPayload),
    Failed(FailedPayload),
    Error {
        #[serde(default)]
        message: String,
    },
    Closing {
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl GenerationEvent {
    /// The wire tag of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationEvent::Connected { .. } => "connected",
            GenerationEvent::Status(_) => "status",
            GenerationEvent::Progress(_) => "progress",
            GenerationEvent::ConceptStart(_) => "concept_start",
            GenerationEvent::ConceptComplete(_) => "concept_complete",
            GenerationEvent::ConceptFailed(_) => "concept_failed",
            GenerationEvent::BatchStart(_) => "batch_start",
            GenerationEvent::BatchComplete(_) => "batch_complete",
            GenerationEvent::HumanReview(_) => "human_review",
            GenerationEvent::Completed(_) => "completed",
            GenerationEvent::Failed(_) => "failed",
            GenerationEvent::Error { .. } => "error",
            GenerationEvent::Closing { .. } => "closing",
            GenerationEvent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: TaskStatus,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub roadmap_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub step: String,
    /// Step-local status such as `running` or `completed`.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub roadmap_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ProgressPayload {
    pub fn is_step_completed(&self) -> bool {
        self.status == "completed"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptPayload {
    pub concept_id: String,
    #[serde(default)]
    pub concept_name: String,
    #[serde(default)]
    pub content_type: ContentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptFailedPayload {
    pub concept_id: String,
    #[serde(default)]
    pub concept_name: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub content_type: ContentKind,
    #[serde(default)]
    pub partial_failure: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStartPayload {
    pub batch_index: u32,
    pub total_batches: u32,
    #[serde(default)]
    pub concept_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCompletePayload {
    pub batch_index: u32,
    pub total_batches: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanReviewPayload {
    #[serde(default)]
    pub roadmap_id: Option<String>,
    #[serde(default)]
    pub roadmap_title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedPayload {
    #[serde(default)]
    pub roadmap_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub failed_concepts: Option<FailedConcepts>,
}

impl CompletedPayload {
    /// The terminal status this completion implies.
    pub fn final_status(&self) -> TaskStatus {
        match self.status {
            Some(TaskStatus::PartialFailure) => TaskStatus::PartialFailure,
            _ if self
                .failed_concepts
                .as_ref()
                .is_some_and(|f| f.count > 0 || !f.concept_ids.is_empty()) =>
            {
                TaskStatus::PartialFailure
            }
            _ => TaskStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailedPayload {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub step: Option<String>,
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server to push a status snapshot right away.
    GetStatus,
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_concept_failed() {
        let raw = r#"{"type":"concept_failed","concept_id":"c-7","concept_name":"Ownership",
                      "error":"llm timeout","content_type":"quiz","partial_failure":true}"#;
        match serde_json::from_str::<GenerationEvent>(raw).unwrap() {
            GenerationEvent::ConceptFailed(p) => {
                assert_eq!(p.concept_id, "c-7");
                assert_eq!(p.content_type, ContentKind::Quiz);
                assert_eq!(p.partial_failure, Some(true));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_tolerated() {
        let ev: GenerationEvent =
            serde_json::from_str(r#"{"type":"heartbeat","ts":1}"#).unwrap();
        assert_eq!(ev, GenerationEvent::Unknown);
        assert_eq!(ev.kind(), "unknown");
    }

    #[test]
    fn completed_with_failures_is_partial() {
        let raw = r#"{"type":"completed","roadmap_id":"r-1",
                      "failed_concepts":{"count":2,"concept_ids":["a","b"]}}"#;
        let GenerationEvent::Completed(p) = serde_json::from_str(raw).unwrap() else {
            panic!("expected completed");
        };
        assert_eq!(p.final_status(), TaskStatus::PartialFailure);
        assert_eq!(CompletedPayload::default().final_status(), TaskStatus::Completed);
    }

    #[test]
    fn client_message_wire_format() {
        let json = serde_json::to_string(&ClientMessage::GetStatus).unwrap();
        assert_eq!(json, r#"{"type":"get_status"}"#);
    }
}
