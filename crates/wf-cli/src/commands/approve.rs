use wf_api_types::ApprovalRequest;
use wf_sync::{HttpTaskApi, TaskApi};

use super::friendly_error;

/// Run the `approve` subcommand; `approved == false` sends the roadmap back
/// for revision.
pub async fn run(
    api: &HttpTaskApi,
    task_id: &str,
    approved: bool,
    feedback: Option<String>,
) -> anyhow::Result<()> {
    let ack = api
        .approve_roadmap(task_id, &ApprovalRequest { approved, feedback })
        .await
        .map_err(friendly_error)?;

    let verdict = if approved { "approved" } else { "sent back" };
    match ack.message {
        Some(message) => println!("roadmap {verdict}: {message}"),
        None => println!("roadmap {verdict}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::commands::test_server;

    #[tokio::test]
    async fn reject_sends_feedback() {
        let app = Router::new().route(
            "/api/v1/roadmaps/{id}/approve",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["approved"], json!(false));
                assert_eq!(body["feedback"], json!("shorter"));
                Json(json!({"success": true}))
            }),
        );
        let api = test_server::api(app).await;
        assert!(run(&api, "t-1", false, Some("shorter".into())).await.is_ok());
    }
}
