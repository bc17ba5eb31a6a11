//! Wire types shared with the chat backend.
//!
//! These mirror the JSON the backend speaks on `POST /api/chat`,
//! `/ws/chat/{thread_id}` and the health endpoints. Anything that only
//! matters to the client lives elsewhere.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// `None` asks the backend to start a new thread.
    pub thread_id: Option<String>,
}

/// Successful `POST /api/chat` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub thread_id: String,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_first_message: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Body carried by non-2xx responses. FastAPI-style backends use
/// `detail`, others use `error`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Best human-readable message in the body, if any.
    pub fn message(&self) -> Option<String> {
        if let Some(e) = &self.error {
            return Some(e.clone());
        }
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }
}

/// Client → server frame on the streaming connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub message: String,
    pub thread_id: Option<String>,
    pub is_first_message: bool,
}

/// Server → client frame on the streaming connection.
///
/// Decoding is lenient about the error payload key: some backends send the
/// text as `content`, others as `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Chunk {
        content: String,
    },
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Either shape a health endpoint may answer with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub connected: Option<bool>,
}
