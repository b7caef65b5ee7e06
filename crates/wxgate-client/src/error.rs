use thiserror::Error;

/// Errors returned by [`crate::Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx answer without an envelope, e.g. a request timeout.
    #[error("gateway error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// The account is not logged in, or the gateway stopped serving.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The gateway answered with an error envelope.
    #[error("{path} failed (code {code}): {msg}")]
    Api {
        path: &'static str,
        code: i32,
        msg: String,
    },

    /// A successful envelope without the expected payload.
    #[error("{0} returned no data")]
    MissingData(&'static str),

    #[error("invalid {path} response: {source}")]
    Decode {
        path: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("subscription task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Request(_) => true,
            ClientError::Status { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_server_errors_are_transient() {
        let timeout = ClientError::Status {
            status: 408,
            message: String::new(),
        };
        assert!(timeout.is_transient());

        let bad_gateway = ClientError::Status {
            status: 502,
            message: String::new(),
        };
        assert!(bad_gateway.is_transient());

        assert!(!ClientError::Unauthorized("logout".to_string()).is_transient());
        assert!(
            !ClientError::Api {
                path: "/api/send-text",
                code: 1,
                msg: "`to` is required".to_string(),
            }
            .is_transient()
        );
    }
}
