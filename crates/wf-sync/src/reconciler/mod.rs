//! The single owner of sync state for a task view.
//!
//! One tokio task receives user commands, transport signals, fetch
//! completions and timer deadlines, and applies each of them to the
//! [`ViewStore`] in turn. Nothing else writes to the store.

mod events;
mod fetch;

use std::collections::HashSet;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;
use wf_api_types::{LogLevel, TaskStatus};
use wf_core::config::SyncConfig;
use wf_core::url_state::{strip_tracking_params, ResumeTarget};
use wf_core::view_state::{ConnectionState, TaskPatch, TaskViewState, ViewStore};
use wf_telemetry::tracing_setup::task_view_span;

use crate::api_client::TaskApi;
use crate::error::SyncError;
use crate::poller::{is_active_phase, should_track, PollConfig, PollScheduler, TransportHealth};
use crate::transport::{EventTransport, TransportFactory, TransportSignal};

use fetch::{Completion, SnapshotKind, SnapshotPlan};

/// Requests from the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch the view to `task_id`, dropping whatever was shown before.
    Open {
        task_id: String,
        roadmap_id: Option<String>,
        page_url: Option<Url>,
    },
    /// Re-read everything from the server.
    Refresh,
    Cancel,
    Approve { feedback: Option<String> },
    Reject { feedback: Option<String> },
    /// Regenerate the failed concepts of the current roadmap.
    RetryFailed { user_id: String },
    /// Leave the view and release every resource.
    Close,
}

/// Front-end side of a running [`Reconciler`].
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<TaskViewState>,
    worker: JoinHandle<()>,
}

impl SyncHandle {
    pub fn send(&self, command: Command) -> Result<(), SyncError> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::Stopped)
    }

    pub fn open(&self, task_id: &str, roadmap_id: Option<&str>) -> Result<(), SyncError> {
        self.send(Command::Open {
            task_id: task_id.to_string(),
            roadmap_id: roadmap_id.map(str::to_string),
            page_url: None,
        })
    }

    /// Resume tracking from a page URL carrying `task_id` (and optionally
    /// `generating=true`). Returns whether the URL named a task.
    pub fn open_url(&self, url: &Url) -> Result<bool, SyncError> {
        let Some(target) = ResumeTarget::from_url(url) else {
            return Ok(false);
        };
        self.send(Command::Open {
            task_id: target.task_id,
            roadmap_id: None,
            page_url: Some(url.clone()),
        })?;
        Ok(true)
    }

    pub fn view(&self) -> watch::Receiver<TaskViewState> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> TaskViewState {
        self.view.borrow().clone()
    }

    /// Wait until the published view satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&TaskViewState) -> bool,
    ) -> Result<TaskViewState, SyncError> {
        let mut rx = self.view.clone();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| SyncError::Stopped)?;
        Ok(state.clone())
    }

    /// Close the view and wait for the reconciler to exit.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Close);
        drop(self.commands);
        let _ = self.worker.await;
    }
}

/// An open event channel and the receiver of its signals.
struct Link {
    transport: Box<dyn EventTransport>,
    signals: flume::Receiver<TransportSignal>,
}

impl Link {
    fn open(factory: &dyn TransportFactory, task_id: &str) -> Self {
        let (mut transport, signals) = factory.create(task_id);
        transport.connect(true);
        Self { transport, signals }
    }

    fn close(mut self) {
        self.transport.disconnect();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Primary,
    Retry,
}

/// What caused a task to be finalized; decides what the final refresh reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinalSource {
    Event,
    Poll,
    Fetch,
}

enum Wake {
    Command(Command),
    Fetched(Completion),
    Signal(Channel, TransportSignal),
    HealthTick,
    PollDue,
    ReconnectDue,
    RefreshDue,
}

pub struct Reconciler {
    api: Arc<dyn TaskApi>,
    factory: Arc<dyn TransportFactory>,
    store: ViewStore,
    config: SyncConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    fetch_tx: mpsc::UnboundedSender<Completion>,
    fetch_rx: mpsc::UnboundedReceiver<Completion>,

    /// Bumped on every task change; completions from older epochs are dropped.
    epoch: u64,
    cancel: CancellationToken,
    span: tracing::Span,
    trace_id: String,

    primary: Option<Link>,
    retry: Option<Link>,
    tracking: bool,
    finalized: bool,
    last_message: Instant,

    poller: PollScheduler,
    poll_due: Option<Instant>,
    poll_in_flight: bool,
    reconnect_attempt: u32,
    reconnect_due: Option<Instant>,
    refresh_due: Option<Instant>,
    /// A cancel was sent and the server has not confirmed it yet.
    cancel_pending: bool,

    structural_seen: HashSet<(String, String)>,
    roadmap_in_flight: bool,
    roadmap_dirty: bool,
}

impl Reconciler {
    /// Start the reconciler on the current runtime.
    pub fn spawn(
        api: Arc<dyn TaskApi>,
        factory: Arc<dyn TransportFactory>,
        store: ViewStore,
        config: SyncConfig,
    ) -> SyncHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let view = store.subscribe();
        let reconciler = Self {
            api,
            factory,
            store,
            poller: PollScheduler::new(PollConfig::from_sync(&config)),
            config,
            commands: cmd_rx,
            fetch_tx,
            fetch_rx,
            epoch: 0,
            cancel: CancellationToken::new(),
            span: tracing::Span::none(),
            trace_id: String::new(),
            primary: None,
            retry: None,
            tracking: false,
            finalized: false,
            last_message: Instant::now(),
            poll_due: None,
            poll_in_flight: false,
            reconnect_attempt: 0,
            reconnect_due: None,
            refresh_due: None,
            cancel_pending: false,
            structural_seen: HashSet::new(),
            roadmap_in_flight: false,
            roadmap_dirty: false,
        };
        let worker = tokio::spawn(reconciler.run());
        SyncHandle {
            commands: cmd_tx,
            view,
            worker,
        }
    }

    async fn run(mut self) {
        let mut health = tokio::time::interval(self.config.health_check_interval());
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    None => break,
                },
                Some(done) = self.fetch_rx.recv() => Wake::Fetched(done),
                signal = next_signal(&self.primary) => Wake::Signal(Channel::Primary, signal),
                signal = next_signal(&self.retry) => Wake::Signal(Channel::Retry, signal),
                _ = health.tick() => Wake::HealthTick,
                _ = sleep_until(self.poll_due) => Wake::PollDue,
                _ = sleep_until(self.reconnect_due) => Wake::ReconnectDue,
                _ = sleep_until(self.refresh_due) => Wake::RefreshDue,
            };

            let span = self.span.clone();
            let _entered = span.enter();
            match wake {
                Wake::Command(cmd) => self.on_command(cmd),
                Wake::Fetched(done) => self.on_fetched(done),
                Wake::Signal(Channel::Primary, signal) => self.on_primary_signal(signal),
                Wake::Signal(Channel::Retry, signal) => self.on_retry_signal(signal),
                Wake::HealthTick => self.on_health_tick(),
                Wake::PollDue => self.on_poll_due(),
                Wake::ReconnectDue => self.on_reconnect_due(),
                Wake::RefreshDue => self.on_refresh_due(),
            }
        }

        self.teardown();
        tracing::debug!("reconciler stopped");
    }

    // ── commands ──

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Open {
                task_id,
                roadmap_id,
                page_url,
            } => self.open(task_id, roadmap_id, page_url),
            Command::Refresh => {
                let plan = SnapshotPlan {
                    task: true,
                    logs: true,
                    intent: true,
                    roadmap: self.roadmap_id(),
                };
                self.load(SnapshotKind::Refresh, plan);
            }
            Command::Cancel => self.cancel_task(),
            Command::Approve { feedback } => self.review(true, feedback),
            Command::Reject { feedback } => self.review(false, feedback),
            Command::RetryFailed { user_id } => self.retry_failed(user_id),
            Command::Close => {
                self.teardown();
                self.store.reset(None);
                self.span = tracing::Span::none();
            }
        }
    }

    fn open(&mut self, task_id: String, roadmap_id: Option<String>, page_url: Option<Url>) {
        self.teardown();
        let (span, trace_id) = task_view_span(&task_id);
        self.span = span;
        self.trace_id = trace_id;
        self.span.in_scope(|| tracing::info!(roadmap_id = ?roadmap_id, "opening task view"));

        self.store.reset(Some(&task_id));
        if page_url.is_some() {
            self.store.update(|s| s.page_url = page_url);
        }
        self.load(
            SnapshotKind::Load,
            SnapshotPlan {
                task: true,
                logs: true,
                intent: true,
                roadmap: roadmap_id,
            },
        );
    }

    fn cancel_task(&mut self) {
        let Some(task_id) = self.task_id() else {
            return;
        };
        if self
            .store
            .read(|s| s.status())
            .is_some_and(|status| status.is_terminal())
        {
            tracing::debug!("cancel ignored, task already finished");
            return;
        }

        self.store.update(|s| {
            s.patch_task_info(TaskPatch {
                status: Some(TaskStatus::Cancelled),
                ..TaskPatch::default()
            })
        });
        self.finalized = true;
        self.tracking = false;
        self.cancel_pending = true;
        self.disconnect_primary();
        self.stop_polling();
        tracing::info!("cancelling task");

        let api = self.api.clone();
        self.spawn_fetch("cancel", async move {
            fetch::Fetched::Cancel(api.cancel_task(&task_id).await)
        });
        self.refresh_due = Some(Instant::now() + self.config.cancel_refresh_delay());
    }

    fn review(&mut self, approved: bool, feedback: Option<String>) {
        let Some(task_id) = self.task_id() else {
            return;
        };
        let api = self.api.clone();
        let request = wf_api_types::ApprovalRequest { approved, feedback };
        self.spawn_fetch("review", async move {
            fetch::Fetched::Review {
                approved,
                result: api.approve_roadmap(&task_id, &request).await,
            }
        });
    }

    fn retry_failed(&mut self, user_id: String) {
        let Some(roadmap_id) = self.roadmap_id() else {
            tracing::warn!("retry requested before a roadmap exists");
            return;
        };
        let api = self.api.clone();
        let request = wf_api_types::RetryFailedRequest {
            user_id,
            preferences: None,
        };
        self.spawn_fetch("retry_failed", async move {
            fetch::Fetched::Retry(api.retry_failed_concepts(&roadmap_id, &request).await)
        });
    }

    // ── transport ──

    fn open_primary(&mut self) {
        let Some(task_id) = self.task_id() else {
            return;
        };
        if self.primary.is_some() {
            return;
        }
        tracing::debug!("opening event channel");
        self.primary = Some(Link::open(self.factory.as_ref(), &task_id));
        self.tracking = true;
        self.last_message = Instant::now();
        self.set_connection(ConnectionState::Connecting);
    }

    fn disconnect_primary(&mut self) {
        if let Some(link) = self.primary.take() {
            link.close();
        }
        self.reconnect_due = None;
        self.set_connection(ConnectionState::Disconnected);
    }

    fn on_primary_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Opened => {
                tracing::info!("event channel connected");
                self.reconnect_attempt = 0;
                self.last_message = Instant::now();
                self.set_connection(ConnectionState::Connected);
            }
            TransportSignal::Event(event) => {
                self.last_message = Instant::now();
                if self.poller.is_polling() {
                    tracing::info!("event channel active again, polling paused");
                }
                self.poller.on_transport_message();
                self.sync_poll_deadline();
                self.apply_event(event, Channel::Primary);
            }
            TransportSignal::Error(message) => {
                tracing::warn!(error = %message, "event channel error");
                self.note(
                    LogLevel::Warning,
                    "connection",
                    None,
                    format!("event channel error: {message}"),
                );
            }
            TransportSignal::Closed { reason } => {
                self.primary = None;
                self.set_connection(ConnectionState::Disconnected);
                let active = self
                    .store
                    .read(|s| s.status().is_some_and(|st| st.is_active()));
                if self.tracking && !self.finalized && active {
                    let delay = reconnect_delay(self.reconnect_attempt, self.config.reconnect_max());
                    self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
                    self.reconnect_due = Some(Instant::now() + delay);
                    tracing::info!(?reason, ?delay, attempt = self.reconnect_attempt, "event channel closed, reconnecting");
                } else {
                    tracing::debug!(?reason, "event channel closed");
                }
            }
        }
    }

    fn on_retry_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Opened => tracing::debug!("retry channel connected"),
            TransportSignal::Event(event) => self.apply_event(event, Channel::Retry),
            TransportSignal::Error(message) => {
                tracing::warn!(error = %message, "retry channel error");
            }
            TransportSignal::Closed { reason } => {
                tracing::debug!(?reason, "retry channel closed");
                self.finish_retry();
            }
        }
    }

    fn finish_retry(&mut self) {
        let link = self.retry.take();
        let had_retry = link.is_some() || self.store.read(|s| s.retry_task_id.is_some());
        if let Some(link) = link {
            link.close();
        }
        if !had_retry {
            return;
        }
        self.store.update(|s| s.retry_task_id = None);
        self.load(
            SnapshotKind::Final,
            SnapshotPlan {
                task: true,
                logs: true,
                intent: false,
                roadmap: self.roadmap_id(),
            },
        );
    }

    // ── timers ──

    fn on_health_tick(&mut self) {
        if !self.tracking || self.finalized {
            return;
        }
        let health = TransportHealth {
            connected: self
                .primary
                .as_ref()
                .is_some_and(|l| l.transport.is_connected()),
            silent_for: Instant::now().saturating_duration_since(self.last_message),
        };
        let active = self.store.read(|s| s.task.as_ref().is_some_and(is_active_phase));
        if let Some(delay) = self.poller.observe(health, active) {
            tracing::info!(
                connected = health.connected,
                silent_secs = health.silent_for.as_secs(),
                "event channel quiet, falling back to polling"
            );
            self.poll_due = Some(Instant::now() + delay);
        }
        self.sync_poll_deadline();
    }

    fn on_poll_due(&mut self) {
        self.poll_due = None;
        if self.poll_in_flight || !self.poller.is_polling() {
            return;
        }
        let Some(task_id) = self.task_id() else {
            return;
        };
        tracing::debug!(state = ?self.poller.state(), "polling task status");
        self.poll_in_flight = true;
        let api = self.api.clone();
        self.spawn_fetch("poll", async move {
            fetch::Fetched::Poll(api.get_task(&task_id).await)
        });
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect_due = None;
        if self.tracking && !self.finalized {
            self.open_primary();
        }
    }

    fn on_refresh_due(&mut self) {
        self.refresh_due = None;
        self.load(
            SnapshotKind::Refresh,
            SnapshotPlan {
                task: true,
                logs: true,
                intent: false,
                roadmap: self.roadmap_id(),
            },
        );
    }

    // ── lifecycle ──

    /// Decide what to do with the task header a fetch just installed.
    fn after_task_loaded(&mut self, status: TaskStatus) {
        if self.finalized {
            return;
        }
        let track = self.store.read(|s| {
            s.task
                .as_ref()
                .is_some_and(|t| should_track(t, chrono::Utc::now(), self.config.retry_window()))
        });
        if track {
            if self.reconnect_due.is_none() {
                self.open_primary();
            }
        } else if status.is_terminal() {
            if self.tracking {
                self.finalize(FinalSource::Fetch);
            } else {
                self.finalized = true;
                self.poller.stop();
                self.strip_page_url();
            }
        }
    }

    /// First task header after a cancel. A task the server kept running is
    /// picked up again as if it had just been opened.
    fn settle_cancel(&mut self, status: TaskStatus) {
        self.cancel_pending = false;
        if status.is_terminal() {
            return;
        }
        tracing::warn!(%status, "task still running after cancel, resuming sync");
        self.finalized = false;
        self.poller.reset();
        self.note(
            LogLevel::Warning,
            "workflow",
            None,
            format!("task is still {status} after cancel"),
        );
    }

    /// Close out a task that reached a terminal state. Repeated calls are
    /// no-ops.
    fn finalize(&mut self, source: FinalSource) {
        if self.finalized {
            tracing::debug!(?source, "already finalized");
            return;
        }
        self.finalized = true;
        self.tracking = false;
        tracing::info!(?source, status = ?self.store.read(|s| s.status()), "task finished");

        self.disconnect_primary();
        self.stop_polling();
        self.strip_page_url();
        self.load(
            SnapshotKind::Final,
            SnapshotPlan {
                task: source == FinalSource::Event,
                logs: true,
                intent: false,
                roadmap: self.roadmap_id(),
            },
        );
    }

    /// Drop everything tied to the current task view.
    fn teardown(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.cancel.cancel();
        self.cancel = CancellationToken::new();

        if let Some(link) = self.primary.take() {
            link.close();
        }
        if let Some(link) = self.retry.take() {
            link.close();
        }
        self.tracking = false;
        self.finalized = false;
        self.poller.reset();
        self.poll_due = None;
        self.poll_in_flight = false;
        self.reconnect_attempt = 0;
        self.reconnect_due = None;
        self.refresh_due = None;
        self.cancel_pending = false;
        self.structural_seen.clear();
        self.roadmap_in_flight = false;
        self.roadmap_dirty = false;
    }

    // ── helpers ──

    fn task_id(&self) -> Option<String> {
        self.store.read(|s| s.task_id.clone())
    }

    fn roadmap_id(&self) -> Option<String> {
        self.store.read(|s| {
            s.roadmap_id()
                .map(str::to_string)
                .or_else(|| s.roadmap.as_ref().map(|r| r.roadmap_id.clone()))
        })
    }

    fn set_connection(&self, connection: ConnectionState) {
        if self.store.read(|s| s.connection) != connection {
            self.store.update(|s| s.connection = connection);
        }
    }

    fn stop_polling(&mut self) {
        self.poller.stop();
        self.poll_due = None;
        self.sync_poll_deadline();
    }

    /// Clear a pending poll the scheduler no longer wants and mirror the
    /// polling flag into the view.
    fn sync_poll_deadline(&mut self) {
        let polling = self.poller.is_polling();
        if !polling {
            self.poll_due = None;
        }
        if self.store.read(|s| s.polling) != polling {
            self.store.update(|s| s.polling = polling);
        }
    }

    fn strip_page_url(&self) {
        self.store.update(|s| {
            if let Some(url) = s.page_url.as_ref() {
                s.page_url = Some(strip_tracking_params(url));
            }
        });
    }

    /// Record something the client observed in the view's log.
    fn note(&self, level: LogLevel, category: &str, step: Option<&str>, message: String) {
        self.store.update(|s| {
            let entry = s.local_log(level, category, step, message, serde_json::Value::Null);
            s.append_log(entry);
        });
    }
}

/// 1, 2, 4, 8, 16 s, capped at `max`.
fn reconnect_delay(attempt: u32, max: Duration) -> Duration {
    Duration::from_secs(1u64 << attempt.min(16)).min(max)
}

async fn next_signal(link: &Option<Link>) -> TransportSignal {
    match link {
        Some(link) => match link.signals.recv_async().await {
            Ok(signal) => signal,
            Err(_) => TransportSignal::Closed {
                reason: Some("signal channel dropped".to_string()),
            },
        },
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}
