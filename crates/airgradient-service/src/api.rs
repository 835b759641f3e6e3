//! HTTP endpoints of the bridge.
//!
//! - `POST /sensors/{id}/measures`: ingest a reading posted by a monitor
//! - `GET /metrics`: the current reading in Prometheus text format
//!
//! The public listener serves both through [`router`]; the internal listener
//! serves only the scrape endpoint through [`metrics_router`].
//!
//! # Error Handling
//!
//! Errors are returned as plain text via [`AppError`]. An unreadable or
//! undecodable body is a 400; failing to format the metrics body is a 500.
//! Backup failures never reach the client.
//!
//! # Example
//!
//! ```ignore
//! use airgradient_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State, rejection::BytesRejection},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use tracing::error;

use crate::exposition;
use crate::state::AppState;

/// Create the public router: ingest and metrics.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sensors/{id}/measures", post(ingest))
        .merge(metrics_router())
}

/// Create the scrape-only router.
pub fn metrics_router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics))
}

/// Accept a reading from a monitor.
///
/// The body is committed as the current reading; the backup write continues
/// after the response is sent.
async fn ingest(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, AppError> {
    let body = body.map_err(|e| {
        error!("Cannot read body from {}: {}", token, e);
        AppError::MalformedInput("cannot read body".to_string())
    })?;

    match state.ingest(&token, &body).await {
        Ok(_) => Ok(StatusCode::OK),
        Err(e) => {
            error!("Failed to unmarshal measures from {}: {}", token, e);
            Err(AppError::MalformedInput("failed to unmarshal".to_string()))
        }
    }
}

/// Expose the current reading.
///
/// The body is formatted into memory before anything is sent, so
/// `OutputWriteFailed` only covers a formatting error. A client that goes
/// away while the body is being written is handled by hyper after this
/// handler has returned.
async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let reading = state.snapshot().await;
    let body = exposition::render(&reading).map_err(|_| AppError::OutputWriteFailed)?;
    Ok(([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body))
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    MalformedInput(String),
    #[error("failed to write response")]
    OutputWriteFailed,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            AppError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            AppError::OutputWriteFailed => {
                error!("{}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::{BackupConfig, Config};

    fn create_test_state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let config = Config {
            backup: BackupConfig {
                path: dir.path().join("backup.json"),
                max_time_delta: 60,
            },
            ..Config::default()
        };
        AppState::new(config)
    }

    async fn response_body(response: axum::response::Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_measures(token: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(format!("/sensors/{}/measures", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_metrics() -> Request<Body> {
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);
        let app = router().with_state(Arc::clone(&state));

        let response = app
            .oneshot(post_measures(
                "airgradient:a1b2c3",
                r#"{"wifi":-73,"pm02":297,"rco2":1009,"atmp":26.10,"rhum":51}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response_body(response).await.is_empty());

        let reading = state.cache.get().await.unwrap();
        assert_eq!(reading.id, "a1b2c3");
        assert_eq!(reading.co2, 1009);
    }

    #[tokio::test]
    async fn test_ingest_malformed_body() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);
        let app = router().with_state(Arc::clone(&state));

        let response = app
            .oneshot(post_measures("airgradient:a1b2c3", "not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_body(response).await, "failed to unmarshal");
        assert!(state.cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_ingest_lenient_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);
        let app = router().with_state(Arc::clone(&state));

        for body in [
            "null",
            r#"{"pm02":null,"rco2":null}"#,
            r#"{"PM02":5,"RCO2":3000000000}"#,
        ] {
            let response = app
                .clone()
                .oneshot(post_measures("airgradient:a1b2c3", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "body {body}");
        }

        let reading = state.cache.get().await.unwrap();
        assert_eq!(reading.pm25, 5);
        assert_eq!(reading.co2, 3_000_000_000);
    }

    #[tokio::test]
    async fn test_ingest_get_not_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(&dir));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sensors/airgradient:a1b2c3/measures")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let app = router().with_state(create_test_state(&dir));

        let response = app.oneshot(get_metrics()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            exposition::CONTENT_TYPE
        );
        let body = response_body(response).await;
        assert!(body.contains("# instance null\n"));
        assert!(body.contains("\nrco2 0\n"));
    }

    #[tokio::test]
    async fn test_metrics_after_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state(&dir);
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(post_measures(
                "airgradient:a1b2c3",
                r#"{"wifi":-73,"pm02":297,"rco2":1009,"atmp":26.10,"rhum":51}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(app.oneshot(get_metrics()).await.unwrap()).await;
        assert!(body.contains("# instance a1b2c3\n"));
        assert!(body.contains("\nwifi -73\n"));
        assert!(body.contains("\npm02 297\n"));
        assert!(body.contains("\nrco2 1009\n"));
        assert!(body.contains("\natmp 26.100000\n"));
        assert!(body.contains("\nrhum 51\n"));
    }

    #[tokio::test]
    async fn test_metrics_router_has_no_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let app = metrics_router().with_state(create_test_state(&dir));

        let response = app
            .oneshot(post_measures("airgradient:a1b2c3", "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_app_error_status() {
        let response = AppError::MalformedInput("cannot read body".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::OutputWriteFailed.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_app_error_display() {
        assert_eq!(
            AppError::OutputWriteFailed.to_string(),
            "failed to write response"
        );
        assert_eq!(
            AppError::MalformedInput("failed to unmarshal".to_string()).to_string(),
            "failed to unmarshal"
        );
    }
}
