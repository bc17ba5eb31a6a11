//! One-shot HTTP side of the chat backend.
//!
//! Used for the first message of a thread (which is how the backend issues
//! a thread id), as the fallback whenever the streaming connection is not
//! available, and for health checks.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{ChatRequest, ChatResponse};

pub use http::HttpBackend;

/// Backend liveness as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unreachable,
}

impl HealthStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// Errors from the HTTP side of the backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Backend unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("Request to backend timed out")]
    Timeout,
    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),
    #[error("Backend reported failure: {0}")]
    Rejected(String),
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    /// HTTP status code, when the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The one-shot request surface of a chat backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `POST /api/chat`.
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError>;

    /// Check liveness.
    async fn health(&self) -> Result<HealthStatus, BackendError>;

    /// Ask the backend to forget a thread.
    async fn clear_thread(&self, thread_id: &str) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::HttpStatus {
            status: 500,
            message: "agent crashed".into(),
        };
        assert_eq!(err.to_string(), "Backend returned HTTP 500: agent crashed");
        assert_eq!(err.status(), Some(500));
        assert_eq!(BackendError::Timeout.status(), None);
    }

    #[test]
    fn test_health_status_usable() {
        assert!(HealthStatus::Healthy.is_usable());
        assert!(HealthStatus::Degraded.is_usable());
        assert!(!HealthStatus::Unreachable.is_usable());
        assert!(!HealthStatus::Unknown.is_usable());
        assert_eq!(HealthStatus::default(), HealthStatus::Unknown);
    }
}
