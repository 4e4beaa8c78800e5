use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    HumanReviewPending,
    Completed,
    PartialFailure,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Statuses during which the server may still emit generation events.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Processing | TaskStatus::HumanReviewPending
        )
    }

    /// Statuses after which no further progress is expected.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::HumanReviewPending => "human_review_pending",
            TaskStatus::Completed => "completed",
            TaskStatus::PartialFailure => "partial_failure",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Summary of concepts that failed during generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedConcepts {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub concept_ids: Vec<String>,
}

/// One server-side run of the roadmap generation workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub roadmap_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub failed_concepts: Option<FailedConcepts>,
}

impl Task {
    pub fn new(task_id: impl Into<String>, status: TaskStatus) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            status,
            current_step: None,
            roadmap_id: None,
            title: None,
            user_id: None,
            created_at: now,
            updated_at: now,
            error_message: None,
            failed_concepts: None,
        }
    }

    /// Number of concepts the server reported as failed.
    pub fn failed_concept_count(&self) -> u32 {
        self.failed_concepts
            .as_ref()
            .map(|f| f.count.max(f.concept_ids.len() as u32))
            .unwrap_or(0)
    }
}

// ── Mutation payloads ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub user_id: String,
    pub user_request: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationAccepted {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryFailedRequest {
    pub user_id: String,
    #[serde(default)]
    pub preferences: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAccepted {
    pub task_id: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub items_to_retry: u32,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// IntentAnalysis
// ---------------------------------------------------------------------------

/// Result of the intent-analysis step for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    #[serde(default)]
    pub parsed_goal: String,
    #[serde(default)]
    pub key_technologies: Vec<String>,
    #[serde(default)]
    pub difficulty_profile: Option<String>,
    #[serde(default)]
    pub time_constraint: String,
    #[serde(default)]
    pub skill_gap_analysis: Vec<String>,
    #[serde(default)]
    pub personalized_suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::HumanReviewPending.is_active());
        assert!(TaskStatus::PartialFailure.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert_eq!(TaskStatus::HumanReviewPending.to_string(), "human_review_pending");
    }

    #[test]
    fn task_parses_with_missing_optionals() {
        let json = r#"{
            "task_id": "t-1",
            "status": "partial_failure",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:05:00Z",
            "failed_concepts": {"count": 0, "concept_ids": ["c1", "c2"]}
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.status, TaskStatus::PartialFailure);
        assert!(task.current_step.is_none());
        assert_eq!(task.failed_concept_count(), 2);
    }
}
