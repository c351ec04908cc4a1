// crates/api/src/error.rs
use serde::Deserialize;
use thiserror::Error;

/// Errors from the remote surfaces. A timeout is handled identically
/// to any other remote failure; it gets its own variant only so the
/// message can say so.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to build HTTP client: {0}")]
    Init(#[source] reqwest::Error),
}

impl ApiError {
    /// Classify a reqwest error into the matching variant.
    pub fn from_reqwest(source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout
        } else if source.is_decode() {
            Self::Decode(source)
        } else {
            Self::Transport(source)
        }
    }
}

/// Plain acknowledgement returned by several control operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body shape shared by the services.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Convert a non-2xx response into `ApiError::Status`, pulling the
/// server's message out of the body when it has one.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}
