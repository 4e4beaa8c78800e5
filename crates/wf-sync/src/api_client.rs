//! HTTP side of the backend contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;
use wf_api_types::{
    ApprovalRequest, GenerateRequest, GenerationAccepted, IntentAnalysis, LogPage, LogQuery,
    MutationAck, RetryAccepted, RetryFailedRequest, RoadmapFramework, Task,
};
use wf_core::config::ApiConfig;

use crate::error::SyncError;

/// Point-in-time reads and mutations the sync engine needs from the backend.
#[async_trait]
pub trait TaskApi: Send + Sync + 'static {
    async fn get_task(&self, task_id: &str) -> Result<Task, SyncError>;

    async fn get_logs(&self, task_id: &str, query: &LogQuery) -> Result<LogPage, SyncError>;

    async fn get_roadmap(&self, roadmap_id: &str) -> Result<RoadmapFramework, SyncError>;

    async fn get_intent_analysis(&self, task_id: &str) -> Result<IntentAnalysis, SyncError>;

    async fn start_generation(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerationAccepted, SyncError>;

    async fn approve_roadmap(
        &self,
        task_id: &str,
        request: &ApprovalRequest,
    ) -> Result<MutationAck, SyncError>;

    async fn cancel_task(&self, task_id: &str) -> Result<MutationAck, SyncError>;

    async fn retry_failed_concepts(
        &self,
        roadmap_id: &str,
        request: &RetryFailedRequest,
    ) -> Result<RetryAccepted, SyncError>;
}

/// [`TaskApi`] over the backend's REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpTaskApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let base = Url::parse(base_url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, SyncError> {
        Self::new(&config.base_url, config.request_timeout())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        what: String,
    ) -> Result<T, SyncError> {
        tracing::debug!(%url, "GET");
        let resp = self.client.get(url).send().await?;
        decode(resp, what).await
    }

    async fn post_json<B: serde::Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<&B>,
        what: String,
    ) -> Result<T, SyncError> {
        tracing::debug!(%url, "POST");
        let mut req = self.client.post(url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        decode(resp, what).await
    }

    /// POST a mutation. A success without a body (`204 No Content`) is an
    /// acknowledgement too.
    async fn post_ack<B: serde::Serialize + Sync>(
        &self,
        url: Url,
        body: Option<&B>,
        what: String,
    ) -> Result<MutationAck, SyncError> {
        tracing::debug!(%url, "POST");
        let mut req = self.client.post(url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let bytes = success_body(req.send().await?, what).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(MutationAck {
                success: true,
                message: None,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Body of a successful response; error statuses become [`SyncError`]s.
async fn success_body(resp: reqwest::Response, what: String) -> Result<Vec<u8>, SyncError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(SyncError::NotFound(what));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SyncError::Http {
            status: status.as_u16(),
            message: error_detail(&body),
        });
    }
    Ok(resp.bytes().await?.to_vec())
}

async fn decode<T: DeserializeOwned>(
    resp: reqwest::Response,
    what: String,
) -> Result<T, SyncError> {
    let bytes = success_body(resp, what).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Pull `detail` / `error` / `message` out of a JSON error body.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    body.trim().to_string()
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn get_task(&self, task_id: &str) -> Result<Task, SyncError> {
        let url = self.endpoint(&["tasks", task_id])?;
        self.get_json(url, format!("task {task_id}")).await
    }

    async fn get_logs(&self, task_id: &str, query: &LogQuery) -> Result<LogPage, SyncError> {
        let url = self.endpoint(&["tasks", task_id, "logs"])?;
        tracing::debug!(%url, ?query, "GET logs");
        let resp = self.client.get(url).query(query).send().await?;
        decode(resp, format!("logs of task {task_id}")).await
    }

    async fn get_roadmap(&self, roadmap_id: &str) -> Result<RoadmapFramework, SyncError> {
        let url = self.endpoint(&["roadmaps", roadmap_id])?;
        self.get_json(url, format!("roadmap {roadmap_id}")).await
    }

    async fn get_intent_analysis(&self, task_id: &str) -> Result<IntentAnalysis, SyncError> {
        let url = self.endpoint(&["tasks", task_id, "intent-analysis"])?;
        self.get_json(url, format!("intent analysis of task {task_id}"))
            .await
    }

    async fn start_generation(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerationAccepted, SyncError> {
        let url = self.endpoint(&["roadmaps", "generate"])?;
        self.post_json(url, Some(request), "generation".to_string())
            .await
    }

    async fn approve_roadmap(
        &self,
        task_id: &str,
        request: &ApprovalRequest,
    ) -> Result<MutationAck, SyncError> {
        let url = self.endpoint(&["roadmaps", task_id, "approve"])?;
        self.post_ack(url, Some(request), format!("review of task {task_id}"))
            .await
    }

    async fn cancel_task(&self, task_id: &str) -> Result<MutationAck, SyncError> {
        let url = self.endpoint(&["tasks", task_id, "cancel"])?;
        self.post_ack::<()>(url, None, format!("task {task_id}"))
            .await
    }

    async fn retry_failed_concepts(
        &self,
        roadmap_id: &str,
        request: &RetryFailedRequest,
    ) -> Result<RetryAccepted, SyncError> {
        let url = self.endpoint(&["roadmaps", roadmap_id, "retry-failed"])?;
        self.post_json(url, Some(request), format!("roadmap {roadmap_id}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_segments_under_api_prefix() {
        let api = HttpTaskApi::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        let url = api.endpoint(&["tasks", "t 1", "logs"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/tasks/t%201/logs");

        let nested = HttpTaskApi::new("http://gw.local/roadmap", Duration::from_secs(5)).unwrap();
        assert_eq!(
            nested.endpoint(&["roadmaps", "r-1"]).unwrap().as_str(),
            "http://gw.local/roadmap/api/v1/roadmaps/r-1"
        );
    }

    #[test]
    fn rejects_unusable_base() {
        assert!(HttpTaskApi::new("mailto:someone@example.com", Duration::from_secs(1)).is_err());
        assert!(HttpTaskApi::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn error_detail_prefers_json_fields() {
        assert_eq!(error_detail(r#"{"detail":"Task not running"}"#), "Task not running");
        assert_eq!(error_detail(r#"{"error":"boom"}"#), "boom");
        assert_eq!(error_detail(" plain text \n"), "plain text");
    }
}
