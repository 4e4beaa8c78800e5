use wf_api_types::RetryFailedRequest;
use wf_sync::{HttpTaskApi, TaskApi};

use super::friendly_error;

/// Run the `retry` subcommand.
pub async fn run(api: &HttpTaskApi, roadmap_id: &str, user_id: &str) -> anyhow::Result<()> {
    let accepted = api
        .retry_failed_concepts(
            roadmap_id,
            &RetryFailedRequest {
                user_id: user_id.to_string(),
                preferences: None,
            },
        )
        .await
        .map_err(friendly_error)?;

    println!(
        "retrying {} items as task {} (follow with `wf watch {}`)",
        accepted.items_to_retry, accepted.task_id, accepted.task_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    use super::*;
    use crate::commands::test_server;

    #[tokio::test]
    async fn retry_starts_new_task() {
        let app = Router::new().route(
            "/api/v1/roadmaps/{id}/retry-failed",
            post(|| async { Json(json!({"task_id": "t-r", "items_to_retry": 2})) }),
        );
        let api = test_server::api(app).await;
        assert!(run(&api, "r-1", "u-1").await.is_ok());
    }

    #[tokio::test]
    async fn nothing_to_retry() {
        let app = Router::new().route(
            "/api/v1/roadmaps/{id}/retry-failed",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"detail": "No failed concepts"})),
                )
            }),
        );
        let api = test_server::api(app).await;
        let err = run(&api, "r-1", "u-1").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 400"));
    }
}
