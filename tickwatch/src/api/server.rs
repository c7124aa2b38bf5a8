//! Router assembly and the server task.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use super::commands::AlertCommand;
use super::v0;
use crate::api_client::types::{AlertView, ErrorBody};
use crate::error::Result;
use crate::service::ServiceHandle;
use crate::tracing::prelude::*;
use crate::types::AlertRecord;

/// How long a handler waits for the service actor to answer.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(OpenApi)]
#[openapi(info(
    title = "tickwatch",
    description = "Ticker alert deduplication and suppression service"
))]
struct ApiDoc;

/// State shared by every handler.
#[derive(Clone)]
pub struct SharedState {
    pub cmd_tx: mpsc::Sender<AlertCommand>,
    pub visible: watch::Receiver<Vec<AlertRecord>>,
    pub store_error: watch::Receiver<Option<String>>,
}

impl SharedState {
    pub fn new(service: ServiceHandle, store_error: watch::Receiver<Option<String>>) -> Self {
        Self {
            cmd_tx: service.cmd_tx,
            visible: service.visible,
            store_error,
        }
    }

    /// Current visible alerts, most recent first.
    pub fn alerts(&self) -> Vec<AlertView> {
        self.visible.borrow().iter().map(AlertView::from).collect()
    }

    /// Send a command to the service actor and wait for its reply.
    pub async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> AlertCommand,
    ) -> std::result::Result<T, ApiError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| ApiError::unavailable())?;
        // Result layers: timeout / channel-closed.
        let Ok(Ok(value)) = tokio::time::timeout(COMMAND_TIMEOUT, rx).await else {
            return Err(ApiError::unavailable());
        };
        Ok(value)
    }
}

/// An error response with a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "alert service unavailable")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Build the full application router, including the OpenAPI document.
pub fn router(state: SharedState) -> Router {
    let (router, openapi) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/v0", v0::routes())
        .split_for_parts();

    router
        .route(
            "/api/v0/openapi.json",
            get(move || {
                let doc = openapi.clone();
                async move { Json(doc) }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `running` is canceled.
pub async fn serve(listen: SocketAddr, state: SharedState, running: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { running.cancelled().await })
        .await?;

    trace!("API server stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use http::{Method, Request, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use time::macros::datetime;
    use tower::ServiceExt;

    use super::*;
    use crate::clock::AnchoredClock;
    use crate::config::Config;
    use crate::notify::MemorySink;
    use crate::service::Service;
    use crate::store::{PersistQueue, Snapshot, Write};

    struct TestApp {
        router: Router,
        running: CancellationToken,
        _writes: mpsc::UnboundedReceiver<Write>,
        _store_error: watch::Sender<Option<String>>,
    }

    impl TestApp {
        fn new() -> Self {
            let clock = Arc::new(AnchoredClock::new(datetime!(2025-03-03 14:30 UTC)));
            let (persist, writes) = PersistQueue::new();
            let (service, handle) = Service::new(
                &Config::default(),
                Snapshot::default(),
                clock,
                persist,
                Arc::new(MemorySink::new()),
            );
            let running = CancellationToken::new();
            tokio::spawn(service.run(running.clone()));

            let (store_error_tx, store_error) = watch::channel(None);
            let router = router(SharedState::new(handle, store_error));
            Self {
                router,
                running,
                _writes: writes,
                _store_error: store_error_tx,
            }
        }

        async fn call(&self, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if body.is_some() {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
            }
            let request = builder
                .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
                .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                })
            };
            (status, value)
        }

        async fn alert(&self, body: &str) -> (StatusCode, Value) {
            self.call(Method::POST, "/api/v0/alert", Some(body)).await
        }
    }

    impl Drop for TestApp {
        fn drop(&mut self) {
            self.running.cancel();
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/api/v0/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["visible"], 0);
    }

    #[tokio::test]
    async fn alert_then_list() {
        let app = TestApp::new();

        let (status, body) = app.alert(r#"{"symbol":"aapl"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["surfaced"], true);
        assert_eq!(body["was_new"], true);

        let (status, body) = app.alert(r#"{"symbol":"AAPL"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reason"], "duplicate");

        let (status, body) = app.call(Method::GET, "/api/v0/alerts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn bad_alerts_are_rejected_with_error_body() {
        let app = TestApp::new();

        for raw in ["not json", "{}", r#"{"symbol":"1BAD"}"#, r#"["AAPL", true]"#] {
            let (status, body) = app.alert(raw).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "payload {raw}");
            assert!(body["error"].is_string(), "payload {raw}");
        }

        let (_, body) = app.call(Method::GET, "/api/v0/alerts", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn hide_and_reveal() {
        let app = TestApp::new();
        app.alert(r#"{"symbol":"AMD"}"#).await;

        let (status, body) = app.call(Method::POST, "/api/v0/alerts/amd/hide", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"symbol": "AMD", "changed": true}));

        let (_, body) = app.alert(r#"{"symbol":"AMD","highPriority":true}"#).await;
        assert_eq!(body["reason"], "cooldown");

        let (_, body) = app.call(Method::POST, "/api/v0/alerts/AMD/reveal", None).await;
        assert_eq!(body["changed"], true);

        let (_, body) = app.alert(r#"{"symbol":"AMD"}"#).await;
        assert_eq!(body["reason"], "duplicate");
    }

    #[tokio::test]
    async fn patch_alert() {
        let app = TestApp::new();
        app.alert(r#"{"symbol":"NVDA"}"#).await;

        let (status, body) = app
            .call(
                Method::PATCH,
                "/api/v0/alerts/NVDA",
                Some(r#"{"starred":true,"direction":"bullish"}"#),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_starred"], true);
        assert_eq!(body["direction"], "bullish");

        let (status, body) = app
            .call(Method::PATCH, "/api/v0/alerts/MSFT", Some(r#"{"starred":true}"#))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn mark_read_and_clear() {
        let app = TestApp::new();
        app.alert(r#"{"symbol":"AAPL"}"#).await;
        app.alert(r#"{"symbol":"MSFT"}"#).await;

        let (_, body) = app.call(Method::POST, "/api/v0/alerts/read", None).await;
        assert_eq!(body["changed"], 2);

        let (status, _) = app.call(Method::DELETE, "/api/v0/alerts", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = app.alert(r#"{"symbol":"AAPL"}"#).await;
        assert_eq!(body["was_new"], true);
    }

    #[tokio::test]
    async fn ignore_and_snooze_lists() {
        let app = TestApp::new();

        let (status, body) = app.call(Method::PUT, "/api/v0/ignored/tsla", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        let (_, body) = app.call(Method::PUT, "/api/v0/snoozed/NVDA", None).await;
        assert_eq!(body["changed"], true);

        let (_, body) = app.call(Method::GET, "/api/v0/ignored", None).await;
        assert_eq!(body, json!(["TSLA"]));
        let (_, body) = app.call(Method::GET, "/api/v0/snoozed", None).await;
        assert_eq!(body, json!(["NVDA"]));

        let (_, body) = app.alert(r#"{"symbol":"TSLA","highPriority":true}"#).await;
        assert_eq!(body["reason"], "ignored");
        let (_, body) = app.alert(r#"{"symbol":"NVDA"}"#).await;
        assert_eq!(body["reason"], "snoozed");
        let (_, body) = app.alert(r#"{"symbol":"NVDA","highPriority":true}"#).await;
        assert_eq!(body["surfaced"], true);

        let (_, body) = app.call(Method::GET, "/api/v0/snoozed", None).await;
        assert_eq!(body, json!([]));

        let (_, body) = app.call(Method::DELETE, "/api/v0/ignored/TSLA", None).await;
        assert_eq!(body["changed"], true);
        let (status, _) = app.call(Method::DELETE, "/api/v0/ignored", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app.call(Method::PUT, "/api/v0/ignored/not%20a%20ticker", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let app = TestApp::new();

        let (status, body) = app.call(Method::GET, "/api/v0/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hiding_timeout_secs"], 1800);
        assert_eq!(body["snooze_clear_time"], "09:00");
        assert_eq!(body["app_foreground"], false);

        let (status, body) = app
            .call(
                Method::PATCH,
                "/api/v0/settings",
                Some(r#"{"hiding_timeout_secs":60,"snooze_clear_time":"17:30","app_foreground":true}"#),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hiding_timeout_secs"], 60);
        assert_eq!(body["snooze_clear_time"], "17:30");
        assert_eq!(body["app_foreground"], true);

        let (status, body) = app
            .call(Method::PATCH, "/api/v0/settings", Some(r#"{"snooze_clear_time":"late"}"#))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn oversized_hiding_timeout_is_rejected() {
        let app = TestApp::new();

        let (status, body) = app
            .call(
                Method::PATCH,
                "/api/v0/settings",
                Some(r#"{"hiding_timeout_secs":18446744073709551615}"#),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = app.call(Method::GET, "/api/v0/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hiding_timeout_secs"], 1800);

        app.alert(r#"{"symbol":"AAPL"}"#).await;
        let (status, _) = app.call(Method::POST, "/api/v0/alerts/AAPL/hide", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/api/v0/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/v0/alert"].is_object());
        assert!(body["paths"]["/api/v0/alerts/{symbol}/hide"].is_object());
    }

    #[tokio::test]
    async fn events_stream_is_sse() {
        let app = TestApp::new();
        let request = Request::builder()
            .uri("/api/v0/events")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
    }
}
