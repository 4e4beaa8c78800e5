//! In-memory view of one task, and the scoped store that publishes it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use wf_api_types::{
    ExecutionLog, IntentAnalysis, LogLevel, RoadmapFramework, Task, TaskStatus,
    LOCAL_LOG_PREFIX,
};

use crate::concept::{ConceptAggregate, ConceptStatusPatch, ConceptStatusSet};
use crate::log_buffer::StepLogBuffer;
use crate::time_constraint::{parse_time_constraint, TimePlan};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Socket liveness as last reported by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Partial update of the task header fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub current_step: Option<String>,
    pub roadmap_id: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub batch_index: u32,
    pub total_batches: u32,
    pub completed: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewRequest {
    pub roadmap_id: Option<String>,
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// TaskViewState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TaskViewState {
    pub task_id: Option<String>,
    pub task: Option<Task>,
    pub roadmap: Option<RoadmapFramework>,
    pub concepts: BTreeMap<String, ConceptStatusSet>,
    pub logs: StepLogBuffer,
    pub intent: Option<IntentAnalysis>,
    pub time_plan: Option<TimePlan>,
    pub batch: Option<BatchProgress>,
    pub review: Option<ReviewRequest>,
    pub connection: ConnectionState,
    pub polling: bool,
    pub retry_task_id: Option<String>,
    /// Page-level failure of the critical task-detail read.
    pub load_error: Option<String>,
    /// Page URL with tracking parameters, when the view was resumed from one.
    pub page_url: Option<url::Url>,
}

impl TaskViewState {
    pub fn new(max_logs_per_step: usize) -> Self {
        Self {
            task_id: None,
            task: None,
            roadmap: None,
            concepts: BTreeMap::new(),
            logs: StepLogBuffer::new(max_logs_per_step),
            intent: None,
            time_plan: None,
            batch: None,
            review: None,
            connection: ConnectionState::Disconnected,
            polling: false,
            retry_task_id: None,
            load_error: None,
            page_url: None,
        }
    }

    pub fn for_task(task_id: impl Into<String>, max_logs_per_step: usize) -> Self {
        let mut state = Self::new(max_logs_per_step);
        state.task_id = Some(task_id.into());
        state
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.task.as_ref().map(|t| t.status)
    }

    pub fn current_step(&self) -> Option<&str> {
        self.task.as_ref().and_then(|t| t.current_step.as_deref())
    }

    pub fn roadmap_id(&self) -> Option<&str> {
        self.task.as_ref().and_then(|t| t.roadmap_id.as_deref())
    }

    // ── mutations ──

    pub fn set_task_info(&mut self, task: Task) {
        self.task_id = Some(task.task_id.clone());
        self.load_error = None;
        self.task = Some(task);
    }

    /// Apply a partial update. Ignored until a task header exists.
    pub fn patch_task_info(&mut self, patch: TaskPatch) {
        let Some(task) = self.task.as_mut() else {
            return;
        };
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(step) = patch.current_step {
            task.current_step = Some(step);
        }
        if let Some(roadmap_id) = patch.roadmap_id {
            task.roadmap_id = Some(roadmap_id);
        }
        if let Some(error) = patch.error_message {
            task.error_message = Some(error);
        }
        task.updated_at = Utc::now();
    }

    pub fn append_log(&mut self, entry: ExecutionLog) {
        self.logs.append(entry);
    }

    pub fn replace_logs(&mut self, entries: Vec<ExecutionLog>) {
        self.logs.replace(entries);
    }

    pub fn merge_server_logs(&mut self, entries: Vec<ExecutionLog>) {
        self.logs.merge_server(entries);
    }

    /// Keyed update of one concept; every other concept is left untouched.
    pub fn set_concept_status(&mut self, concept_id: &str, patch: ConceptStatusPatch) {
        self.concepts
            .entry(concept_id.to_string())
            .or_default()
            .apply(&patch);
    }

    /// Install an authoritative roadmap tree. Its per-concept statuses
    /// overwrite any optimistic patch.
    pub fn set_roadmap_framework(&mut self, roadmap: RoadmapFramework) {
        for concept in roadmap.concepts() {
            self.concepts.insert(
                concept.concept_id.clone(),
                ConceptStatusSet::from_concept(concept),
            );
        }
        if let Some(task) = self.task.as_mut() {
            if task.roadmap_id.is_none() {
                task.roadmap_id = Some(roadmap.roadmap_id.clone());
            }
        }
        self.roadmap = Some(roadmap);
    }

    pub fn set_intent_analysis(&mut self, intent: IntentAnalysis) {
        self.time_plan = Some(parse_time_constraint(&intent.time_constraint));
        self.intent = Some(intent);
    }

    // ── derived ──

    pub fn concept_aggregate(&self, concept_id: &str) -> Option<ConceptAggregate> {
        self.concepts.get(concept_id).map(ConceptStatusSet::aggregate)
    }

    /// Concepts with at least one failed piece.
    pub fn failed_concept_ids(&self) -> Vec<&str> {
        self.concepts
            .iter()
            .filter(|(_, s)| s.has_failure())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// The "N concepts failed" count: the server summary when present,
    /// otherwise the locally known failures.
    pub fn failed_concept_count(&self) -> usize {
        let reported = self
            .task
            .as_ref()
            .map(|t| t.failed_concept_count() as usize)
            .unwrap_or(0);
        reported.max(self.failed_concept_ids().len())
    }

    /// Build a log entry for something observed on the client.
    pub fn local_log(
        &self,
        level: LogLevel,
        category: &str,
        step: Option<&str>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> ExecutionLog {
        ExecutionLog {
            id: format!("{LOCAL_LOG_PREFIX}{}", uuid::Uuid::new_v4()),
            task_id: self.task_id.clone().unwrap_or_default(),
            level,
            category: category.to_string(),
            step: step.map(str::to_string),
            agent_name: None,
            message: message.into(),
            details,
            duration_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Whether a `failed` task changed recently enough that a retry may be
    /// under way on the server.
    pub fn recently_updated(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        self.task
            .as_ref()
            .is_some_and(|t| recently_updated(t, now, window))
    }
}

pub fn recently_updated(task: &Task, now: DateTime<Utc>, window: std::time::Duration) -> bool {
    now.signed_duration_since(task.updated_at)
        .to_std()
        .map(|elapsed| elapsed <= window)
        .unwrap_or(true)
}

// ---------------------------------------------------------------------------
// ViewStore
// ---------------------------------------------------------------------------

/// Scoped container for one task view.
///
/// The reconciler owns the store for the lifetime of a task view, resets it
/// on task change, and mutates it synchronously; front ends observe
/// snapshots through [`subscribe`](Self::subscribe).
#[derive(Debug, Clone)]
pub struct ViewStore {
    tx: Arc<watch::Sender<TaskViewState>>,
    max_logs_per_step: usize,
}

impl ViewStore {
    pub fn new(max_logs_per_step: usize) -> Self {
        let (tx, _) = watch::channel(TaskViewState::new(max_logs_per_step));
        Self {
            tx: Arc::new(tx),
            max_logs_per_step,
        }
    }

    /// Discard the current view and start a fresh one for `task_id`.
    pub fn reset(&self, task_id: Option<&str>) {
        let fresh = match task_id {
            Some(id) => TaskViewState::for_task(id, self.max_logs_per_step),
            None => TaskViewState::new(self.max_logs_per_step),
        };
        self.tx.send_replace(fresh);
    }

    /// Mutate the view and notify subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut TaskViewState) -> R) -> R {
        let mut out = None;
        self.tx.send_modify(|state| out = Some(f(state)));
        match out {
            Some(r) => r,
            None => unreachable!("send_modify always runs its closure"),
        }
    }

    pub fn snapshot(&self) -> TaskViewState {
        self.tx.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&TaskViewState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskViewState> {
        self.tx.subscribe()
    }
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new(100)
    }
}
