//! Background reads and mutations, and how their results land in the view.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::Instrument;
use wf_api_types::{
    IntentAnalysis, LogLevel, LogPage, LogQuery, MutationAck, RetryAccepted, RoadmapFramework,
    Task,
};
use wf_telemetry::tracing_setup::create_child_span;

use super::{FinalSource, Link, Reconciler};
use crate::api_client::TaskApi;
use crate::error::SyncError;
use crate::poller::PollOutcome;

/// A finished background job, tagged with the epoch that started it.
pub(super) struct Completion {
    pub epoch: u64,
    pub fetched: Fetched,
}

pub(super) enum Fetched {
    Snapshot {
        kind: SnapshotKind,
        task: Option<Result<Task, SyncError>>,
        logs: Option<Result<LogPage, SyncError>>,
        intent: Option<Result<IntentAnalysis, SyncError>>,
        roadmap: Option<Result<RoadmapFramework, SyncError>>,
    },
    Roadmap(Result<RoadmapFramework, SyncError>),
    Poll(Result<Task, SyncError>),
    Cancel(Result<MutationAck, SyncError>),
    Review {
        approved: bool,
        result: Result<MutationAck, SyncError>,
    },
    Retry(Result<RetryAccepted, SyncError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SnapshotKind {
    /// First read after opening a task view.
    Load,
    Refresh,
    /// Read after the task (or a retry) finished.
    Final,
}

impl SnapshotKind {
    fn operation(self) -> &'static str {
        match self {
            SnapshotKind::Load => "initial_load",
            SnapshotKind::Refresh => "refresh",
            SnapshotKind::Final => "final_refresh",
        }
    }
}

/// Which sections a snapshot reads.
#[derive(Debug, Clone, Default)]
pub(super) struct SnapshotPlan {
    pub task: bool,
    pub logs: bool,
    pub intent: bool,
    pub roadmap: Option<String>,
}

async fn optional<F: Future>(enabled: bool, fut: F) -> Option<F::Output> {
    if enabled {
        Some(fut.await)
    } else {
        None
    }
}

/// Read the planned sections concurrently. One section failing does not
/// affect the others.
async fn snapshot(
    api: Arc<dyn TaskApi>,
    task_id: String,
    log_limit: u32,
    kind: SnapshotKind,
    plan: SnapshotPlan,
) -> Fetched {
    let query = LogQuery::limited(log_limit);
    let (task, logs, intent, roadmap) = tokio::join!(
        optional(plan.task, api.get_task(&task_id)),
        optional(plan.logs, api.get_logs(&task_id, &query)),
        optional(plan.intent, api.get_intent_analysis(&task_id)),
        async {
            match plan.roadmap.as_deref() {
                Some(id) => Some(api.get_roadmap(id).await),
                None => None,
            }
        },
    );
    Fetched::Snapshot {
        kind,
        task,
        logs,
        intent,
        roadmap,
    }
}

impl Reconciler {
    /// Run `fut` in the background and report its output back to the loop,
    /// unless the current task view goes away first.
    pub(super) fn spawn_fetch<F>(&self, operation: &'static str, fut: F)
    where
        F: Future<Output = Fetched> + Send + 'static,
    {
        let tx = self.fetch_tx.clone();
        let token = self.cancel.clone();
        let epoch = self.epoch;
        let span = create_child_span(&self.trace_id, operation);
        tokio::spawn(
            async move {
                tokio::select! {
                    _ = token.cancelled() => tracing::debug!("aborted"),
                    fetched = fut => {
                        let _ = tx.send(Completion { epoch, fetched });
                    }
                }
            }
            .instrument(span),
        );
    }

    pub(super) fn load(&self, kind: SnapshotKind, plan: SnapshotPlan) {
        let Some(task_id) = self.task_id() else {
            return;
        };
        let api = self.api.clone();
        let limit = self.config.log_fetch_limit;
        self.spawn_fetch(kind.operation(), snapshot(api, task_id, limit, kind, plan));
    }

    /// Authoritative roadmap refresh with at most one request in flight and
    /// at most one queued behind it.
    pub(super) fn request_roadmap(&mut self) {
        let Some(roadmap_id) = self.roadmap_id() else {
            return;
        };
        if self.roadmap_in_flight {
            self.roadmap_dirty = true;
            return;
        }
        self.roadmap_in_flight = true;
        let api = self.api.clone();
        self.spawn_fetch("roadmap", async move {
            Fetched::Roadmap(api.get_roadmap(&roadmap_id).await)
        });
    }

    pub(super) fn on_fetched(&mut self, done: Completion) {
        if done.epoch != self.epoch {
            tracing::debug!(epoch = done.epoch, "dropping result of a previous task view");
            return;
        }
        match done.fetched {
            Fetched::Snapshot {
                kind,
                task,
                logs,
                intent,
                roadmap,
            } => self.apply_snapshot(kind, task, logs, intent, roadmap),
            Fetched::Roadmap(result) => {
                self.roadmap_in_flight = false;
                self.apply_roadmap(result);
                if self.roadmap_dirty {
                    self.roadmap_dirty = false;
                    self.request_roadmap();
                }
            }
            Fetched::Poll(result) => self.apply_poll(result),
            Fetched::Cancel(result) => match result {
                Ok(_) => tracing::info!("cancel accepted"),
                Err(e) => {
                    tracing::warn!(error = %e, "cancel request failed");
                    self.note(
                        LogLevel::Error,
                        "workflow",
                        None,
                        format!("cancel request failed: {e}"),
                    );
                }
            },
            Fetched::Review { approved, result } => self.apply_review(approved, result),
            Fetched::Retry(result) => self.apply_retry(result),
        }
    }

    fn apply_snapshot(
        &mut self,
        kind: SnapshotKind,
        task: Option<Result<Task, SyncError>>,
        logs: Option<Result<LogPage, SyncError>>,
        intent: Option<Result<IntentAnalysis, SyncError>>,
        roadmap: Option<Result<RoadmapFramework, SyncError>>,
    ) {
        let roadmap_requested = roadmap.is_some();
        let mut loaded = None;

        match task {
            Some(Ok(task)) => {
                loaded = Some((task.status, task.roadmap_id.is_some()));
                self.store.update(|s| s.set_task_info(task));
            }
            Some(Err(e)) => {
                let critical = kind == SnapshotKind::Load || self.store.read(|s| s.task.is_none());
                if critical {
                    tracing::error!(error = %e, "could not load task");
                    self.store.update(|s| s.load_error = Some(e.to_string()));
                } else {
                    tracing::warn!(error = %e, "task refresh failed");
                }
            }
            None => {}
        }

        if let Some(result) = roadmap {
            self.apply_roadmap(result);
        }

        match logs {
            Some(Ok(page)) => {
                tracing::debug!(count = page.logs.len(), total = page.total, "logs loaded");
                self.store.update(|s| s.merge_server_logs(page.logs));
            }
            Some(Err(e)) => tracing::warn!(error = %e, "log fetch failed"),
            None => {}
        }

        match intent {
            Some(Ok(analysis)) => self.store.update(|s| s.set_intent_analysis(analysis)),
            Some(Err(e)) if e.is_not_found() => tracing::debug!("no intent analysis yet"),
            Some(Err(e)) => tracing::warn!(error = %e, "intent analysis fetch failed"),
            None => {}
        }

        if let Some((status, has_roadmap)) = loaded {
            if has_roadmap && !roadmap_requested {
                self.request_roadmap();
            }
            if kind == SnapshotKind::Refresh && self.cancel_pending {
                self.settle_cancel(status);
            }
            if kind != SnapshotKind::Final {
                self.after_task_loaded(status);
            }
        }
    }

    fn apply_roadmap(&mut self, result: Result<RoadmapFramework, SyncError>) {
        match result {
            Ok(tree) => {
                tracing::debug!(roadmap_id = %tree.roadmap_id, "roadmap loaded");
                self.store.update(|s| s.set_roadmap_framework(tree));
            }
            Err(e) => tracing::warn!(error = %e, "roadmap fetch failed"),
        }
    }

    fn apply_poll(&mut self, result: Result<Task, SyncError>) {
        self.poll_in_flight = false;
        let outcome = match result {
            Ok(task) => {
                let terminal = task.status.is_terminal();
                tracing::debug!(status = %task.status, "poll answered");
                self.store.update(|s| s.set_task_info(task));
                if terminal {
                    PollOutcome::Terminal
                } else {
                    PollOutcome::Pending
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "status poll failed");
                PollOutcome::Failed
            }
        };

        if let Some(delay) = self.poller.on_poll_result(outcome) {
            tracing::debug!(?delay, "next poll scheduled");
            self.poll_due = Some(Instant::now() + delay);
        }
        self.sync_poll_deadline();

        if outcome == PollOutcome::Terminal {
            self.finalize(FinalSource::Poll);
        }
    }

    fn apply_review(&mut self, approved: bool, result: Result<MutationAck, SyncError>) {
        match result {
            Ok(ack) => {
                tracing::info!(approved, "review submitted");
                let message = ack.message.unwrap_or_else(|| {
                    if approved {
                        "roadmap approved".to_string()
                    } else {
                        "roadmap sent back for revision".to_string()
                    }
                });
                self.store.update(|s| s.review = None);
                self.note(LogLevel::Info, "workflow", None, message);
                self.load(
                    SnapshotKind::Refresh,
                    SnapshotPlan {
                        task: true,
                        roadmap: self.roadmap_id(),
                        ..SnapshotPlan::default()
                    },
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, approved, "review request failed");
                self.note(
                    LogLevel::Error,
                    "workflow",
                    None,
                    format!("review request failed: {e}"),
                );
            }
        }
    }

    fn apply_retry(&mut self, result: Result<RetryAccepted, SyncError>) {
        match result {
            Ok(accepted) => {
                tracing::info!(
                    retry_task_id = %accepted.task_id,
                    items = accepted.items_to_retry,
                    "retry of failed concepts started"
                );
                if let Some(link) = self.retry.take() {
                    link.close();
                }
                self.retry = Some(Link::open(self.factory.as_ref(), &accepted.task_id));
                let message = accepted.message.clone().unwrap_or_else(|| {
                    format!("retrying {} failed items", accepted.items_to_retry)
                });
                self.store
                    .update(|s| s.retry_task_id = Some(accepted.task_id));
                self.note(LogLevel::Info, "workflow", None, message);
            }
            Err(e) => {
                tracing::warn!(error = %e, "retry request failed");
                self.note(
                    LogLevel::Error,
                    "workflow",
                    None,
                    format!("retry request failed: {e}"),
                );
            }
        }
    }
}
