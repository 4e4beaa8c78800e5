use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use url::Url;
use wf_core::config::Config;
use wf_core::view_state::{ConnectionState, TaskViewState, ViewStore};
use wf_sync::{Reconciler, SyncHandle, WsTransportFactory};

use super::api_client;
use crate::render;

/// How long to keep listening for the final refresh after the task ended.
const SETTLE: Duration = Duration::from_millis(500);

pub enum Target {
    Task {
        task_id: String,
        roadmap_id: Option<String>,
    },
    Url(Url),
}

/// Run the `watch` subcommand: drive a reconciler for one task and print
/// what changes until the task reaches a terminal state.
pub async fn run(config: &Config, target: Target) -> anyhow::Result<()> {
    let api = Arc::new(api_client(config)?);
    let factory = Arc::new(WsTransportFactory::new(config.api.ws_base()));
    let store = ViewStore::new(config.logs.max_per_step);
    let handle = Reconciler::spawn(api, factory, store, config.sync.clone());

    match target {
        Target::Task {
            task_id,
            roadmap_id,
        } => handle.open(&task_id, roadmap_id.as_deref())?,
        Target::Url(url) => {
            if !handle.open_url(&url)? {
                anyhow::bail!("{url} does not carry a task_id parameter");
            }
        }
    }

    let result = follow(&handle).await;
    handle.shutdown().await;
    result
}

async fn follow(handle: &SyncHandle) -> anyhow::Result<()> {
    let mut view = handle.view();
    let mut printer = Printer::default();

    loop {
        let finished = {
            let state = view.borrow_and_update();
            if state.task.is_none() {
                if let Some(err) = &state.load_error {
                    anyhow::bail!("Could not load task: {err}");
                }
            }
            printer.show(&state);
            is_finished(&state)
        };
        if finished {
            break;
        }
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    anyhow::bail!("sync engine stopped unexpectedly");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("interrupted");
                return Ok(());
            }
        }
    }

    // the final refresh lands shortly after the terminal event
    while let Ok(Ok(())) = tokio::time::timeout(SETTLE, view.changed()).await {
        printer.show(&view.borrow_and_update());
    }
    println!();
    print!("{}", render::final_report(&view.borrow()));
    Ok(())
}

fn is_finished(view: &TaskViewState) -> bool {
    view.status().is_some_and(|s| s.is_terminal())
        && view.connection != ConnectionState::Connected
        && !view.polling
}

/// Prints only what is new since the previous snapshot.
#[derive(Default)]
struct Printer {
    status: String,
    seen_logs: HashSet<String>,
    review_shown: bool,
}

impl Printer {
    fn show(&mut self, view: &TaskViewState) {
        for line in self.take(view) {
            println!("{line}");
        }
    }

    fn take(&mut self, view: &TaskViewState) -> Vec<String> {
        let mut lines = Vec::new();
        for entry in view.logs.chronological() {
            if self.seen_logs.insert(entry.id.clone()) {
                lines.push(render::log_line(entry));
            }
        }

        let status = render::view_status(view);
        if status != self.status {
            lines.push(format!("== {status}"));
            self.status = status;
        }

        match (&view.review, self.review_shown) {
            (Some(review), false) => {
                let task_id = view.task_id.as_deref().unwrap_or("<task>");
                lines.push(format!(
                    "roadmap awaiting review{}: run `wf approve {task_id}` or `wf approve {task_id} --reject`",
                    review
                        .message
                        .as_deref()
                        .map(|m| format!(" ({m})"))
                        .unwrap_or_default()
                ));
                self.review_shown = true;
            }
            (None, true) => self.review_shown = false,
            _ => {}
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use axum::extract::ws::{Message, WebSocketUpgrade};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{routing::get, Json, Router};
    use serde_json::{json, Value};
    use wf_api_types::{LogLevel, Task, TaskStatus};
    use wf_core::view_state::ReviewRequest;

    use super::*;
    use crate::commands::test_server;

    fn task_json(status: &str) -> Value {
        json!({
            "task_id": "t-1",
            "status": status,
            "current_step": "content_generation",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:05:00Z"
        })
    }

    fn config_for(base: &str) -> Config {
        let mut config = Config::default();
        config.api.base_url = base.to_string();
        config
    }

    fn empty_logs() -> Json<Value> {
        Json(json!({"logs": [], "total": 0}))
    }

    #[test]
    fn printer_only_prints_changes() {
        let mut view = TaskViewState::for_task("t-1", 10);
        view.set_task_info(Task::new("t-1", TaskStatus::Processing));
        let entry = view.local_log(LogLevel::Info, "workflow", None, "started", Value::Null);
        view.append_log(entry);

        let mut printer = Printer::default();
        let first = printer.take(&view);
        assert_eq!(first.len(), 2);
        assert!(printer.take(&view).is_empty());

        view.review = Some(ReviewRequest {
            roadmap_id: Some("r-1".into()),
            message: None,
        });
        let lines = printer.take(&view);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("wf approve t-1"));
        assert!(printer.take(&view).is_empty());
    }

    #[tokio::test]
    async fn finished_task_returns_immediately() {
        let app = Router::new()
            .route("/api/v1/tasks/{id}", get(|| async { Json(task_json("completed")) }))
            .route("/api/v1/tasks/{id}/logs", get(|| async { empty_logs() }))
            .route(
                "/api/v1/tasks/{id}/intent-analysis",
                get(|| async { StatusCode::NOT_FOUND }),
            );
        let base = test_server::serve(app).await;

        let target = Target::Task {
            task_id: "t-1".into(),
            roadmap_id: None,
        };
        let result = tokio::time::timeout(Duration::from_secs(10), run(&config_for(&base), target)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn follows_live_events_to_completion() {
        let done = Arc::new(AtomicBool::new(false));
        let app = Router::new()
            .route(
                "/api/v1/tasks/{id}",
                get(|State(done): State<Arc<AtomicBool>>| async move {
                    let status = if done.load(Ordering::SeqCst) { "completed" } else { "processing" };
                    Json(task_json(status))
                }),
            )
            .route("/api/v1/tasks/{id}/logs", get(|| async { empty_logs() }))
            .route(
                "/api/v1/tasks/{id}/intent-analysis",
                get(|| async { StatusCode::NOT_FOUND }),
            )
            .route(
                "/ws/tasks/{id}",
                get(|ws: WebSocketUpgrade, State(done): State<Arc<AtomicBool>>| async move {
                    ws.on_upgrade(move |mut socket| async move {
                        let frames = [
                            json!({"type": "connected", "task_id": "t-1"}),
                            json!({"type": "status", "status": "processing",
                                   "current_step": "content_generation"}),
                        ];
                        for frame in frames {
                            let _ = socket.send(Message::Text(frame.to_string().into())).await;
                        }
                        done.store(true, Ordering::SeqCst);
                        let _ = socket
                            .send(Message::Text(json!({"type": "completed"}).to_string().into()))
                            .await;
                        // stay open until the client hangs up
                        while let Some(Ok(_)) = socket.recv().await {}
                    })
                    .into_response()
                }),
            )
            .with_state(done);
        let base = test_server::serve(app).await;

        let target = Target::Task {
            task_id: "t-1".into(),
            roadmap_id: None,
        };
        let result = tokio::time::timeout(Duration::from_secs(10), run(&config_for(&base), target)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let base = test_server::serve(Router::new()).await;
        let target = Target::Task {
            task_id: "nope".into(),
            roadmap_id: None,
        };
        let result = tokio::time::timeout(Duration::from_secs(10), run(&config_for(&base), target))
            .await
            .expect("watch gives up on a missing task");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn url_without_task_is_rejected() {
        let config = config_for("http://127.0.0.1:1");
        let url = Url::parse("https://app.example/roadmap?tab=plan").unwrap();
        assert!(run(&config, Target::Url(url)).await.is_err());
    }
}
