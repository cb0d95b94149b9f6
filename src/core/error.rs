//! Error types for the request context layer.

use axum::http::StatusCode;

use crate::core::context::Stage;

/// Business code reported when no more specific code applies.
pub const INTERNAL_ERROR_CODE: i32 = 10101;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A business-level error recorded through [`Context::abort_with_error`].
///
/// The error decides the response status. When it declares none the
/// finalize step answers with `500 Internal Server Error`.
///
/// [`Context::abort_with_error`]: crate::core::Context::abort_with_error
#[derive(Debug, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct BusinessError {
    code: i32,
    message: String,
    status: Option<StatusCode>,
    #[source]
    source: Option<BoxError>,
}

impl BusinessError {
    /// Create an error with a business code and a client-facing message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Shorthand for an internal failure answered with a 500.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR_CODE, message).with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the underlying cause. It is logged, never sent to the client.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The status the error declared, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The status to answer with, falling back to 500.
    pub fn http_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Infrastructure failures of the context layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The request body could not be read in full. Fatal for the request.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] axum::Error),

    /// A lifecycle transition was attempted out of order.
    #[error("context is {actual:?}, expected {expected:?}")]
    Stage { expected: Stage, actual: Stage },

    /// A response header name or value was rejected.
    #[error("invalid response header {name:?}")]
    Header { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_fallback() {
        let err = BusinessError::new(20101, "user not found");
        assert_eq!(err.status(), None);
        assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = err.with_status(StatusCode::NOT_FOUND);
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_display_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = BusinessError::internal("backup failed").with_source(io);
        assert_eq!(err.to_string(), "[10101] backup failed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
