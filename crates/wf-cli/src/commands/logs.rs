use wf_api_types::LogQuery;
use wf_sync::{HttpTaskApi, TaskApi};

use super::friendly_error;
use crate::render;

/// Run the `logs` subcommand: print the newest `limit` entries, oldest first.
pub async fn run(
    api: &HttpTaskApi,
    task_id: &str,
    category: Option<String>,
    limit: u32,
) -> anyhow::Result<()> {
    let query = LogQuery {
        category,
        limit: Some(limit),
        offset: None,
    };
    let page = api.get_logs(task_id, &query).await.map_err(friendly_error)?;

    let mut entries = page.logs;
    entries.sort_by_key(|e| e.created_at);
    for entry in &entries {
        println!("{}", render::log_line(entry));
    }
    if page.total > entries.len() as u64 {
        println!("({} of {} entries shown)", entries.len(), page.total);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    use super::*;
    use crate::commands::test_server;

    #[tokio::test]
    async fn logs_forward_filters() {
        let app = Router::new().route(
            "/api/v1/tasks/{id}/logs",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("category").map(String::as_str), Some("agent"));
                assert_eq!(q.get("limit").map(String::as_str), Some("2"));
                Json(json!({
                    "logs": [
                        {"id": "b", "task_id": "t-1", "level": "success", "step": "intent_analysis",
                         "message": "goal parsed", "created_at": "2026-01-01T00:00:02Z"},
                        {"id": "a", "task_id": "t-1", "level": "info", "step": "intent_analysis",
                         "message": "analysing", "created_at": "2026-01-01T00:00:01Z"}
                    ],
                    "total": 7
                }))
            }),
        );
        let api = test_server::api(app).await;

        assert!(run(&api, "t-1", Some("agent".into()), 2).await.is_ok());
    }
}
