//! Remote endpoint error types.

use thiserror::Error;

/// Errors from calls to the remote automation endpoint.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx HTTP status.
    #[error("remote error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// The remote answered, but its result code means failure for this operation.
    #[error("{op} failed (code {code}): {msg}")]
    Rejected { op: &'static str, code: i64, msg: String },

    /// The reply body did not have the expected shape.
    #[error("invalid {op} reply: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Staging a file for the remote endpoint failed.
    #[error("failed to stage file: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether the error happened before the remote produced an answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Request(_) | RemoteError::Status { .. })
    }
}

/// Turn a non-2xx response into [`RemoteError::Status`].
pub async fn check_response_error(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Status { status, message })
}
