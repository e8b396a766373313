use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for proxyscout
#[derive(Error, Debug)]
pub enum ScoutError {
    // Harvest errors
    #[error("Source {source_name} fetch failed: {message}")]
    SourceFetch {
        source_name: String,
        message: String,
        transient: bool,
    },

    #[error("Source {source_name} returned an unexpected payload: {message}")]
    SourceParse {
        source_name: String,
        message: String,
    },

    #[error("Source {source_name} timed out after {timeout_ms}ms")]
    SourceTimeout { source_name: String, timeout_ms: u64 },

    #[error("All {count} sources failed")]
    AllSourcesFailed {
        count: usize,
        errors: Vec<String>,
    },

    // Validation errors
    #[error("Validation timed out after {timeout_ms}ms")]
    ValidationTimeout { timeout_ms: u64 },

    #[error("Validation connect failed: {message}")]
    ValidationConnect { message: String, transient: bool },

    #[error("Unsupported test site: {0}")]
    UnsupportedTestSite(String),

    // Hub errors
    #[error("Observer already registered: {id}")]
    DuplicateObserver { id: String },

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for proxyscout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ScoutError::InvalidRequest(_)
            | ScoutError::UnsupportedTestSite(_)
            | ScoutError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 409 Conflict
            ScoutError::DuplicateObserver { .. } => StatusCode::CONFLICT,

            // 502 Bad Gateway
            ScoutError::SourceFetch { .. }
            | ScoutError::SourceParse { .. }
            | ScoutError::AllSourcesFailed { .. }
            | ScoutError::ValidationConnect { .. } => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            ScoutError::SourceTimeout { .. } | ScoutError::ValidationTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }

            // 503 Service Unavailable
            ScoutError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            ScoutError::Io(_) | ScoutError::Http(_) | ScoutError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ScoutError::SourceFetch { transient, .. } => *transient,
            ScoutError::ValidationConnect { transient, .. } => *transient,
            ScoutError::ValidationTimeout { .. } | ScoutError::SourceTimeout { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for ScoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ScoutError::AllSourcesFailed { errors, .. } => json!({
                "error": self.to_string(),
                "errors": errors,
            }),
            _ => json!({
                "error": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<hyper::Error> for ScoutError {
    fn from(err: hyper::Error) -> Self {
        ScoutError::Http(err.to_string())
    }
}

impl From<url::ParseError> for ScoutError {
    fn from(err: url::ParseError) -> Self {
        ScoutError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            ScoutError::InvalidRequest("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ScoutError::DuplicateObserver { id: "c1".to_string() }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ScoutError::AllSourcesFailed {
                count: 2,
                errors: vec![]
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ScoutError::ValidationTimeout { timeout_ms: 10 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ScoutError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(ScoutError::ValidationTimeout { timeout_ms: 5 }.is_transient());
        assert!(ScoutError::SourceFetch {
            source_name: "a".into(),
            message: "reset".into(),
            transient: true
        }
        .is_transient());
        assert!(!ScoutError::SourceFetch {
            source_name: "a".into(),
            message: "404".into(),
            transient: false
        }
        .is_transient());
        assert!(!ScoutError::SourceParse {
            source_name: "a".into(),
            message: "shape".into()
        }
        .is_transient());
        assert!(!ScoutError::InvalidRequest("x".into()).is_transient());
    }

    #[test]
    fn test_error_client_server_helpers() {
        assert!(ScoutError::InvalidRequest("bad".to_string()).is_client_error());
        assert!(!ScoutError::InvalidRequest("bad".to_string()).is_server_error());

        assert!(ScoutError::Cancelled.is_server_error());
        assert!(!ScoutError::Cancelled.is_client_error());
    }
}
