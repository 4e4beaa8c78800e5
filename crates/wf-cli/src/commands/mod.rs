pub mod approve;
pub mod cancel;
pub mod generate;
pub mod logs;
pub mod retry;
pub mod status;
pub mod watch;

use wf_core::config::{Config, API_URL_ENV};
use wf_sync::{HttpTaskApi, SyncError};

/// Build the HTTP client from config.
pub fn api_client(config: &Config) -> anyhow::Result<HttpTaskApi> {
    HttpTaskApi::from_config(&config.api).map_err(friendly_error)
}

/// The explicit `--user-id`, else the configured one.
pub fn user_id(config: &Config, explicit: Option<String>) -> anyhow::Result<String> {
    explicit
        .or_else(|| config.api.user_id.clone())
        .ok_or_else(|| anyhow::anyhow!("No user id. Pass --user-id or set api.user_id in the config."))
}

/// Map common sync errors to user-friendly messages.
pub fn friendly_error(err: SyncError) -> anyhow::Error {
    match err {
        SyncError::Request(e) if e.is_connect() => anyhow::anyhow!(
            "Could not connect to the roadmap backend. Is it running?\n  \
             (hint: check --api-url or {API_URL_ENV})"
        ),
        SyncError::Request(e) if e.is_timeout() => {
            anyhow::anyhow!("Request timed out. The backend may be overloaded.")
        }
        SyncError::NotFound(what) => anyhow::anyhow!("Not found: {what}"),
        SyncError::Http { status, message } => {
            anyhow::anyhow!("Backend rejected the request (HTTP {status}): {message}")
        }
        other => anyhow::anyhow!("API request failed: {other}"),
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::time::Duration;

    use axum::Router;
    use wf_sync::HttpTaskApi;

    /// Serve `app` on an ephemeral port; returns its base URL.
    pub async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub async fn api(app: Router) -> HttpTaskApi {
        HttpTaskApi::new(&serve(app).await, Duration::from_secs(5)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_user_id_wins() {
        let mut config = Config::default();
        config.api.user_id = Some("from-config".into());
        assert_eq!(user_id(&config, Some("cli".into())).unwrap(), "cli");
        assert_eq!(user_id(&config, None).unwrap(), "from-config");
        config.api.user_id = None;
        assert!(user_id(&config, None).is_err());
    }

    #[test]
    fn http_errors_carry_detail() {
        let err = friendly_error(SyncError::Http {
            status: 409,
            message: "Task already finished".into(),
        });
        assert_eq!(
            err.to_string(),
            "Backend rejected the request (HTTP 409): Task already finished"
        );
    }

    #[tokio::test]
    async fn refused_connection_gets_hint() {
        let api = HttpTaskApi::new("http://127.0.0.1:1", std::time::Duration::from_secs(2)).unwrap();
        let err = wf_sync::TaskApi::get_task(&api, "t-1").await.unwrap_err();
        let msg = friendly_error(err).to_string();
        assert!(msg.contains("Could not connect"), "got {msg}");
    }
}
