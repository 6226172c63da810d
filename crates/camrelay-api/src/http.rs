use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, post, put},
};
use camrelay_model::Command;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, handler::ApiHandler};

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST /api/v1/commands - Any command as tagged JSON
    /// - POST /api/v1/start, /api/v1/stop, /api/v1/resume
    /// - PUT /api/v1/target - Pin the fetch URL
    /// - DELETE /api/v1/target - Drop the pinned URL
    /// - GET /api/v1/health - Health snapshot
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/commands", post(command::<H>))
            .route("/api/v1/start", post(start::<H>))
            .route("/api/v1/stop", post(stop::<H>))
            .route("/api/v1/resume", post(resume::<H>))
            .route("/api/v1/target", put(set_target::<H>).delete(reset_target::<H>))
            .route("/api/v1/health", get(health::<H>))
            .with_state(self.handler)
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct SetTargetRequest {
    url: String,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))
}

// ============================================================================
// Handlers
// ============================================================================

async fn dispatch<H: ApiHandler>(handler: &H, cmd: Command) -> Result<impl IntoResponse + use<H>, ApiError> {
    let reply = handler.command(cmd).await?;
    Ok(Json(reply))
}

/// POST /api/v1/commands
async fn command<H: ApiHandler>(
    State(handler): State<Arc<H>>,
    payload: Result<Json<Command>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    dispatch(handler.as_ref(), body(payload)?).await
}

/// POST /api/v1/start
async fn start<H: ApiHandler>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError> {
    dispatch(handler.as_ref(), Command::Start).await
}

/// POST /api/v1/stop
async fn stop<H: ApiHandler>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError> {
    dispatch(handler.as_ref(), Command::Stop).await
}

/// POST /api/v1/resume
async fn resume<H: ApiHandler>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError> {
    dispatch(handler.as_ref(), Command::Resume).await
}

/// PUT /api/v1/target
async fn set_target<H: ApiHandler>(
    State(handler): State<Arc<H>>,
    payload: Result<Json<SetTargetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = body(payload)?;
    dispatch(handler.as_ref(), Command::SetTarget { url: req.url }).await
}

/// DELETE /api/v1/target
async fn reset_target<H: ApiHandler>(
    State(handler): State<Arc<H>>,
) -> Result<impl IntoResponse, ApiError> {
    dispatch(handler.as_ref(), Command::ResetTarget).await
}

/// GET /api/v1/health
async fn health<H: ApiHandler>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError> {
    let report = handler.health().await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use camrelay_model::{CommandReply, HealthReport, WorkerPhase};
    use serde_json::{Value, json};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Command>>,
        unavailable: bool,
    }

    #[async_trait]
    impl ApiHandler for Recorder {
        async fn command(&self, command: Command) -> Result<CommandReply, ApiError> {
            if self.unavailable {
                return Err(ApiError::Unavailable("worker context down".into()));
            }
            let reply = CommandReply::accepted(format!("{} ok", command.name()));
            self.seen.lock().unwrap().push(command);
            Ok(reply)
        }

        async fn health(&self) -> Result<HealthReport, ApiError> {
            Ok(HealthReport {
                running: true,
                worker_active: true,
                last_liveness_age_ms: 12,
                last_error: None,
                phase: WorkerPhase::Sleeping,
                restarts: 1,
                target: Some("http://cam/x.jpg".into()),
            })
        }
    }

    async fn serve(handler: Arc<Recorder>) -> String {
        let app = HttpApi::new(handler).router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/v1")
    }

    #[tokio::test]
    async fn routes_map_to_commands() {
        let handler = Arc::new(Recorder::default());
        let base = serve(handler.clone()).await;
        let client = reqwest::Client::new();

        client.post(format!("{base}/stop")).send().await.unwrap();
        client.post(format!("{base}/resume")).send().await.unwrap();
        client
            .put(format!("{base}/target"))
            .json(&json!({ "url": "http://cam/y.jpg" }))
            .send()
            .await
            .unwrap();
        client.delete(format!("{base}/target")).send().await.unwrap();
        let reply: Value = client
            .post(format!("{base}/commands"))
            .json(&json!({ "command": "start" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(reply, json!({ "accepted": true, "message": "start ok" }));
        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec![
                Command::Stop,
                Command::Resume,
                Command::SetTarget {
                    url: "http://cam/y.jpg".into()
                },
                Command::ResetTarget,
                Command::Start,
            ]
        );
    }

    #[tokio::test]
    async fn health_is_camel_case_json() {
        let base = serve(Arc::new(Recorder::default())).await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["workerActive"], json!(true));
        assert_eq!(body["phase"], json!("sleeping"));
        assert_eq!(body["lastLivenessAgeMs"], json!(12));
        assert!(body.get("lastError").is_none());
    }

    #[tokio::test]
    async fn malformed_command_is_bad_request() {
        let handler = Arc::new(Recorder::default());
        let base = serve(handler.clone()).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/commands"))
            .json(&json!({ "command": "explode" }))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("invalid request"));
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_failure_maps_to_status() {
        let handler = Arc::new(Recorder {
            unavailable: true,
            ..Recorder::default()
        });
        let base = serve(handler).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/start"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    }
}
