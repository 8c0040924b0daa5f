use facemark_core::CoreError;
use facemark_hw::{FrameError, WebcamError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Input rejected before any request was made.
    #[error("{0}")]
    Validation(String),
    #[error("backend returned {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Backend { status: u16, detail: Option<String> },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid backend response: {0}")]
    Decode(String),
    #[error("camera error: {0}")]
    Webcam(#[from] WebcamError),
    #[error("image error: {0}")]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} already in progress")]
    Busy(&'static str),
    #[error("config error: {0}")]
    Config(String),
    #[error("recognition task exited")]
    TaskExited,
}

impl ClientError {
    /// Text for a transient notification: the backend's `detail` when it sent
    /// one, the camera's classified message, or `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Backend {
                detail: Some(detail),
                ..
            } => detail.clone(),
            ClientError::Webcam(e) => e.user_message(),
            _ => fallback.to_string(),
        }
    }
}

/// Pull FastAPI's `detail` field out of an error body.
pub(crate) fn backend_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
