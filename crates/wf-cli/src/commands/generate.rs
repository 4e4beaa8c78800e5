use wf_api_types::GenerateRequest;
use wf_sync::{HttpTaskApi, TaskApi};

use super::friendly_error;

/// Run the `generate` subcommand; returns the id of the accepted task.
pub async fn run(api: &HttpTaskApi, user_id: &str, request: &str) -> anyhow::Result<String> {
    let user_request: serde_json::Value = serde_json::from_str(request)
        .map_err(|e| anyhow::anyhow!("--request is not valid JSON: {e}"))?;
    if !user_request.is_object() {
        anyhow::bail!("--request must be a JSON object");
    }

    let accepted = api
        .start_generation(&GenerateRequest {
            user_id: user_id.to_string(),
            user_request,
        })
        .await
        .map_err(friendly_error)?;

    println!("task {} accepted ({})", accepted.task_id, accepted.status);
    if let Some(message) = &accepted.message {
        println!("{message}");
    }
    Ok(accepted.task_id)
}

#[cfg(test)]
mod tests {
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::commands::test_server;

    #[tokio::test]
    async fn generate_posts_request() {
        let app = Router::new().route(
            "/api/v1/roadmaps/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["user_id"], json!("u-1"));
                assert_eq!(body["user_request"]["learning_goal"], json!("rust backend"));
                Json(json!({"task_id": "t-42", "status": "pending"}))
            }),
        );
        let api = test_server::api(app).await;

        let task_id = run(&api, "u-1", r#"{"learning_goal": "rust backend"}"#)
            .await
            .unwrap();
        assert_eq!(task_id, "t-42");
    }

    #[tokio::test]
    async fn generate_rejects_non_object() {
        let api = test_server::api(Router::new()).await;
        assert!(run(&api, "u-1", "[1, 2]").await.is_err());
        assert!(run(&api, "u-1", "{oops").await.is_err());
    }
}
