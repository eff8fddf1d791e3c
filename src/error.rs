use thiserror::Error;

/// Errors surfaced by the dialogue runtime.
///
/// Transport-level failures (`ConnectionFailure`, `ServerError`, `Timeout`)
/// all reach callers the same way: as a terminal error event on the session.
/// Parse failures are recovered line-by-line and only appear in logs.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    #[error("HTTP {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("malformed payload: {0}")]
    ProtocolParse(String),

    #[error("dialogue cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    /// True for failures that should trigger a local fallback line.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RuntimeError::ConnectionFailure(_) | RuntimeError::ServerError { .. } | RuntimeError::Timeout
        )
    }
}

impl From<reqwest::Error> for RuntimeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RuntimeError::Timeout
        } else if let Some(status) = err.status() {
            RuntimeError::ServerError {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            RuntimeError::ConnectionFailure(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(RuntimeError::Timeout.is_transport());
        assert!(RuntimeError::ConnectionFailure("refused".into()).is_transport());
        assert!(RuntimeError::ServerError { status: 503, body: String::new() }.is_transport());
        assert!(!RuntimeError::ProtocolParse("bad".into()).is_transport());
        assert!(!RuntimeError::Cancelled.is_transport());
    }

    #[test]
    fn server_error_message_carries_status_and_body() {
        let err = RuntimeError::ServerError {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }
}
