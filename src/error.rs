//! Error types for the transfer pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while transferring assets.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network, DNS, TLS, or timeout failure before a response was received.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The service returned an HTTP error response (status >= 400).
    #[error("HTTP {status}: {message}")]
    Response {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated) or status reason.
        message: String,
    },

    /// The response body ended prematurely or emitted an error mid-stream.
    #[error("response body failed: {0}")]
    Stream(String),

    /// The `Content-Range` response header was missing or malformed.
    #[error("invalid content-range: {0}")]
    ContentRange(String),

    /// A 200 response to a ranged request carried no `Content-Length`.
    #[error("content-length header missing")]
    ContentLengthMissing,

    /// A ranged read returned fewer bytes than the requested window.
    #[error("ranged read returned {actual} of {expected} bytes")]
    PartialRead {
        /// Bytes requested.
        expected: u64,
        /// Bytes actually read.
        actual: u64,
    },

    /// The response stream could not be positioned at the requested offset.
    #[error("unable to seek to byte {offset}: {reason}")]
    Seek {
        /// The requested starting offset.
        offset: u64,
        /// Why the seek failed.
        reason: String,
    },

    /// Invariant violation in pipeline data. Fatal to the pipeline.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// The asset cannot be uploaded (empty file or illegal filename).
    #[error("unsupported file upload: {0}")]
    UnsupportedFile(String),

    /// The target service does not support direct binary upload.
    #[error("direct binary upload is not supported by the target")]
    NotSupported,

    /// The asset cannot be split into parts within the allowed part size.
    #[error(
        "cannot transfer {content_length} bytes over {url_count} URL(s) with max part size {max_part_size}"
    )]
    InvalidPartSize {
        /// Total bytes to transfer.
        content_length: u64,
        /// Number of upload URLs available.
        url_count: usize,
        /// Largest part the service accepts.
        max_part_size: u64,
    },

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error in a control-plane response.
    #[error("JSON parsing error: {0}")]
    Json(String),

    /// Invalid URL construction.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Operation timed out.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Missing required field in a builder.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Invalid parameter value.
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter {
        /// The parameter name.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    /// Returns the HTTP status code for response errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransferError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for failures that happened before a response arrived.
    pub fn is_connect(&self) -> bool {
        matches!(self, TransferError::Connect(_) | TransferError::Timeout(_))
    }

    /// True for failures of an already-open response body.
    pub fn is_stream(&self) -> bool {
        matches!(self, TransferError::Stream(_))
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            TransferError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransferError::Stream(err.to_string())
        } else if let Some(status) = err.status() {
            TransferError::Response {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_builder() {
            TransferError::IllegalArgument(err.to_string())
        } else {
            TransferError::Connect(err.to_string())
        }
    }
}

/// Convert a non-success HTTP response into a [`TransferError::Response`].
///
/// Reads the response body (capped) for the error message. Falls back to
/// the canonical status reason when the body cannot be read.
pub(crate) async fn response_error(response: reqwest::Response) -> TransferError {
    const MAX_ERROR_BODY: usize = 64 * 1024;

    let status = response.status();
    let message = match response.bytes().await {
        Ok(bytes) => {
            let limited = &bytes[..bytes.len().min(MAX_ERROR_BODY)];
            let text = String::from_utf8_lossy(limited).into_owned();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("").to_string()
            } else {
                text
            }
        }
        Err(err) => {
            tracing::debug!("failed to read error response body: {err}");
            status.canonical_reason().unwrap_or("").to_string()
        }
    };

    TransferError::Response {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_response_errors() {
        let err = TransferError::Response {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(TransferError::NotSupported.status(), None);
    }

    #[test]
    fn connect_classification() {
        assert!(TransferError::Connect("refused".to_string()).is_connect());
        assert!(TransferError::Timeout(Duration::from_secs(1)).is_connect());
        assert!(!TransferError::Stream("eof".to_string()).is_connect());
    }

    #[test]
    fn stream_classification() {
        assert!(TransferError::Stream("reset".to_string()).is_stream());
        assert!(!TransferError::Connect("refused".to_string()).is_stream());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: TransferError = io_err.into();
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[test]
    fn display_formats() {
        let err = TransferError::PartialRead {
            expected: 100,
            actual: 42,
        };
        assert_eq!(err.to_string(), "ranged read returned 42 of 100 bytes");

        let err = TransferError::InvalidParameter {
            field: "max_concurrent".to_string(),
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid parameter `max_concurrent`: must be at least 1"
        );
    }

    #[test]
    fn display_invalid_part_size() {
        let err = TransferError::InvalidPartSize {
            content_length: 500,
            url_count: 2,
            max_part_size: 100,
        };
        assert_eq!(
            err.to_string(),
            "cannot transfer 500 bytes over 2 URL(s) with max part size 100"
        );
    }
}
