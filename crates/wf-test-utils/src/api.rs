use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use wf_api_types::{
    ApprovalRequest, ExecutionLog, GenerateRequest, GenerationAccepted, IntentAnalysis, LogPage,
    LogQuery, MutationAck, RetryAccepted, RetryFailedRequest, RoadmapFramework, Task, TaskStatus,
};
use wf_sync::{SyncError, TaskApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    GetTask,
    GetLogs,
    GetRoadmap,
    GetIntent,
    StartGeneration,
    Approve,
    Cancel,
    RetryFailed,
}

/// One recorded request.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: ApiMethod,
    /// Task or roadmap id the call addressed.
    pub target: String,
    pub at: Instant,
}

/// In-memory backend. Each read returns the currently scripted value; task
/// reads first drain the queue of one-off answers.
#[derive(Default)]
pub struct ScriptedApi {
    tasks: Mutex<HashMap<String, Task>>,
    task_queue: Mutex<VecDeque<Result<Task, SyncError>>>,
    logs: Mutex<Vec<ExecutionLog>>,
    roadmap: Mutex<Option<RoadmapFramework>>,
    intent: Mutex<Option<IntentAnalysis>>,
    retry: Mutex<Option<RetryAccepted>>,
    roadmap_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(self, task: Task) -> Self {
        self.set_task(task);
        self
    }

    pub fn with_roadmap(self, roadmap: RoadmapFramework) -> Self {
        self.set_roadmap(roadmap);
        self
    }

    pub fn with_logs(self, logs: Vec<ExecutionLog>) -> Self {
        *self.logs.lock().unwrap() = logs;
        self
    }

    pub fn with_intent(self, intent: IntentAnalysis) -> Self {
        *self.intent.lock().unwrap() = Some(intent);
        self
    }

    pub fn with_retry(self, accepted: RetryAccepted) -> Self {
        *self.retry.lock().unwrap() = Some(accepted);
        self
    }

    /// Roadmap reads take `delay` before answering.
    pub fn with_roadmap_delay(self, delay: Duration) -> Self {
        *self.roadmap_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Replace what later reads of `task.task_id` return.
    pub fn set_task(&self, task: Task) {
        self.tasks
            .lock()
            .unwrap()
            .insert(task.task_id.clone(), task);
    }

    /// Change only the status of a scripted task.
    pub fn set_status(&self, task_id: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(task_id) {
            task.status = status;
            task.updated_at = chrono::Utc::now();
        }
    }

    pub fn set_roadmap(&self, roadmap: RoadmapFramework) {
        *self.roadmap.lock().unwrap() = Some(roadmap);
    }

    pub fn set_logs(&self, logs: Vec<ExecutionLog>) {
        *self.logs.lock().unwrap() = logs;
    }

    /// Queue a one-off answer for the next task read.
    pub fn queue_task(&self, answer: Result<Task, SyncError>) {
        self.task_queue.lock().unwrap().push_back(answer);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: ApiMethod) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// When each call of `method` happened, in order.
    pub fn times(&self, method: ApiMethod) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method)
            .map(|c| c.at)
            .collect()
    }

    fn record(&self, method: ApiMethod, target: &str) {
        self.calls.lock().unwrap().push(ApiCall {
            method,
            target: target.to_string(),
            at: Instant::now(),
        });
    }
}

#[async_trait]
impl TaskApi for ScriptedApi {
    async fn get_task(&self, task_id: &str) -> Result<Task, SyncError> {
        self.record(ApiMethod::GetTask, task_id);
        if let Some(answer) = self.task_queue.lock().unwrap().pop_front() {
            return answer;
        }
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("task {task_id}")))
    }

    async fn get_logs(&self, task_id: &str, query: &LogQuery) -> Result<LogPage, SyncError> {
        self.record(ApiMethod::GetLogs, task_id);
        let logs = self.logs.lock().unwrap().clone();
        let total = logs.len() as u64;
        let limit = query.limit.map(|l| l as usize).unwrap_or(logs.len());
        Ok(LogPage {
            logs: logs.into_iter().take(limit).collect(),
            total,
        })
    }

    async fn get_roadmap(&self, roadmap_id: &str) -> Result<RoadmapFramework, SyncError> {
        self.record(ApiMethod::GetRoadmap, roadmap_id);
        let delay = *self.roadmap_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.roadmap
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::NotFound(format!("roadmap {roadmap_id}")))
    }

    async fn get_intent_analysis(&self, task_id: &str) -> Result<IntentAnalysis, SyncError> {
        self.record(ApiMethod::GetIntent, task_id);
        self.intent
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::NotFound(format!("intent analysis of task {task_id}")))
    }

    async fn start_generation(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerationAccepted, SyncError> {
        self.record(ApiMethod::StartGeneration, &request.user_id);
        Ok(GenerationAccepted {
            task_id: "task-new".to_string(),
            status: TaskStatus::Pending,
            message: None,
        })
    }

    async fn approve_roadmap(
        &self,
        task_id: &str,
        _request: &ApprovalRequest,
    ) -> Result<MutationAck, SyncError> {
        self.record(ApiMethod::Approve, task_id);
        Ok(MutationAck {
            success: true,
            message: None,
        })
    }

    async fn cancel_task(&self, task_id: &str) -> Result<MutationAck, SyncError> {
        self.record(ApiMethod::Cancel, task_id);
        self.set_status(task_id, TaskStatus::Cancelled);
        Ok(MutationAck {
            success: true,
            message: Some("cancelled".into()),
        })
    }

    async fn retry_failed_concepts(
        &self,
        roadmap_id: &str,
        _request: &RetryFailedRequest,
    ) -> Result<RetryAccepted, SyncError> {
        self.record(ApiMethod::RetryFailed, roadmap_id);
        self.retry
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::Http {
                status: 400,
                message: "nothing to retry".into(),
            })
    }
}
