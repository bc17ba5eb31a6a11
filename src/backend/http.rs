//! reqwest-backed implementation of [`ChatBackend`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use tracing::{debug, warn};

use super::{BackendError, ChatBackend, HealthStatus};
use crate::protocol::{ChatRequest, ChatResponse, ErrorBody, HealthBody};

/// Health checks get a short leash regardless of the request timeout.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the chat backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    /// Create a backend client rooted at `base_url`.
    pub fn new(base_url: Url, request_timeout: Duration) -> Result<Self, BackendError> {
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::NetworkUnreachable(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `base_url` with `segments` appended.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn check_endpoint(&self, segments: &[&str]) -> Result<HealthStatus, BackendError> {
        let url = self.endpoint(segments);
        let response = self
            .client
            .get(url.clone())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;
        let body: HealthBody = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let status = classify_health(&body)?;
        debug!("Health check {} -> {}", url, status);
        Ok(status)
    }
}

/// Interpret either health body shape.
fn classify_health(body: &HealthBody) -> Result<HealthStatus, BackendError> {
    if let Some(status) = &body.status {
        return Ok(match status.to_ascii_lowercase().as_str() {
            "ok" | "healthy" => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        });
    }
    match body.connected {
        Some(true) => Ok(HealthStatus::Healthy),
        Some(false) => Ok(HealthStatus::Unreachable),
        None => Err(BackendError::InvalidResponse(
            "health response has neither `status` nor `connected`".to_string(),
        )),
    }
}

fn map_reqwest_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_decode() {
        BackendError::InvalidResponse(e.to_string())
    } else {
        BackendError::NetworkUnreachable(e.to_string())
    }
}

/// Turn a non-2xx response into [`BackendError::HttpStatus`].
async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(BackendError::HttpStatus {
        status: status.as_u16(),
        message: error_message(status, &text),
    })
}

fn error_message(status: StatusCode, text: &str) -> String {
    serde_json::from_str::<ErrorBody>(text)
        .ok()
        .and_then(|body| body.message())
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let url = self.endpoint(&["api", "chat"]);
        debug!(
            "POST {} (thread: {})",
            url,
            request.thread_id.as_deref().unwrap_or("new")
        );

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        if !body.success {
            let reason = if body.response.is_empty() {
                "request was not successful".to_string()
            } else {
                body.response
            };
            return Err(BackendError::Rejected(reason));
        }
        if body.thread_id.is_empty() {
            return Err(BackendError::InvalidResponse(
                "response is missing a thread id".to_string(),
            ));
        }
        Ok(body)
    }

    async fn health(&self) -> Result<HealthStatus, BackendError> {
        match self.check_endpoint(&["api", "health"]).await {
            Ok(status) => Ok(status),
            Err(e) => {
                warn!("Health endpoint failed ({}), trying confirm endpoint", e);
                self.check_endpoint(&["api", "confirm"]).await
            }
        }
    }

    async fn clear_thread(&self, thread_id: &str) -> Result<(), BackendError> {
        let url = self.endpoint(&["api", "chat", thread_id]);
        debug!("DELETE {}", url);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the HTTP backend.
    //!
    //! Coverage:
    //! - Endpoint building
    //! - Health body classification
    //! - Error body extraction
    //! - Round trips against a local axum server

    use super::*;
    use axum::{
        extract::{Json, Path},
        http::StatusCode as AxumStatus,
        routing::{delete, get, post},
        Router,
    };
    use serde_json::{json, Value};
    use std::net::SocketAddr;

    // =========================================================================
    // Test Helpers
    // =========================================================================

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn backend_for(addr: SocketAddr) -> HttpBackend {
        let url = Url::parse(&format!("http://{}", addr)).unwrap();
        HttpBackend::new(url, Duration::from_secs(5)).unwrap()
    }

    // =========================================================================
    // Pure Helpers
    // =========================================================================

    #[test]
    fn test_endpoint_joins_segments() {
        let backend = HttpBackend::new(
            Url::parse("http://localhost:8001/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            backend.endpoint(&["api", "chat"]).as_str(),
            "http://localhost:8001/api/chat"
        );

        let prefixed = HttpBackend::new(
            Url::parse("https://example.com/chat-backend").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            prefixed.endpoint(&["api", "chat", "t 1"]).as_str(),
            "https://example.com/chat-backend/api/chat/t%201"
        );
    }

    #[test]
    fn test_new_rejects_non_base_url() {
        let result = HttpBackend::new(Url::parse("mailto:a@b.c").unwrap(), Duration::from_secs(1));
        assert!(matches!(result, Err(BackendError::InvalidUrl(_))));
    }

    #[test]
    fn test_classify_health() {
        let body = |v: Value| serde_json::from_value::<HealthBody>(v).unwrap();
        assert_eq!(classify_health(&body(json!({"status": "ok"}))).unwrap(), HealthStatus::Healthy);
        assert_eq!(
            classify_health(&body(json!({"status": "healthy", "components": {}}))).unwrap(),
            HealthStatus::Healthy
        );
        assert_eq!(
            classify_health(&body(json!({"status": "degraded"}))).unwrap(),
            HealthStatus::Degraded
        );
        assert_eq!(classify_health(&body(json!({"connected": true}))).unwrap(), HealthStatus::Healthy);
        assert_eq!(
            classify_health(&body(json!({"connected": false}))).unwrap(),
            HealthStatus::Unreachable
        );
        assert!(classify_health(&body(json!({}))).is_err());
    }

    #[test]
    fn test_error_message_sources() {
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail":"agent down"}"#),
            "agent down"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":"bad input"}"#),
            "bad input"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream gone\n"), "upstream gone");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }

    // =========================================================================
    // Round Trips
    // =========================================================================

    #[tokio::test]
    async fn test_send_message_bootstrap() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["thread_id"], Value::Null);
                Json(json!({
                    "response": format!("echo: {}", body["message"].as_str().unwrap()),
                    "thread_id": "t1",
                    "success": true,
                    "is_first_message": true
                }))
            }),
        );
        let backend = backend_for(serve(app).await);

        let resp = backend
            .send_message(&ChatRequest {
                message: "Hello".into(),
                thread_id: None,
            })
            .await
            .unwrap();
        assert_eq!(resp.response, "echo: Hello");
        assert_eq!(resp.thread_id, "t1");
    }

    #[tokio::test]
    async fn test_send_message_http_error() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                (
                    AxumStatus::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": "agent crashed"})),
                )
            }),
        );
        let backend = backend_for(serve(app).await);

        let err = backend
            .send_message(&ChatRequest {
                message: "Hello".into(),
                thread_id: Some("t1".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::HttpStatus { status: 500, ref message } if message == "agent crashed"
        ));
    }

    #[tokio::test]
    async fn test_send_message_success_false_is_rejected() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async { Json(json!({"response": "", "thread_id": "t1", "success": false})) }),
        );
        let backend = backend_for(serve(app).await);
        let err = backend
            .send_message(&ChatRequest {
                message: "x".into(),
                thread_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_send_message_unreachable() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let backend = backend_for(addr);
        let err = backend
            .send_message(&ChatRequest {
                message: "x".into(),
                thread_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NetworkUnreachable(_)));
    }

    #[tokio::test]
    async fn test_health_falls_back_to_confirm() {
        let app = Router::new()
            .route("/api/health", get(|| async { AxumStatus::NOT_FOUND }))
            .route("/api/confirm", get(|| async { Json(json!({"connected": true})) }));
        let backend = backend_for(serve(app).await);
        assert_eq!(backend.health().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_health_primary_endpoint() {
        let app = Router::new().route(
            "/api/health",
            get(|| async { Json(json!({"status": "degraded", "active_connections": 0})) }),
        );
        let backend = backend_for(serve(app).await);
        assert_eq!(backend.health().await.unwrap(), HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_clear_thread() {
        let app = Router::new().route(
            "/api/chat/:thread_id",
            delete(|Path(thread_id): Path<String>| async move {
                assert_eq!(thread_id, "t1");
                Json(json!({"status": "success"}))
            }),
        );
        let backend = backend_for(serve(app).await);
        backend.clear_thread("t1").await.unwrap();
    }
}
