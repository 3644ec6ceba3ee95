use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized (check the token and its permissions): {body}")]
    Unauthorized { body: String },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Submission not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying: {body}")]
    RateLimited { body: String },

    #[error("Server error (status {status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => ApiError::Unauthorized { body: truncated },
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited { body: truncated },
            500..=599 => ApiError::ServerError {
                status,
                body: truncated,
            },
            _ => ApiError::Rejected {
                status,
                body: truncated,
            },
        }
    }

    /// HTTP status the error was derived from, when there was a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::AccessDenied(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::ServerError { status, .. } | ApiError::Rejected { status, .. } => {
                Some(*status)
            }
            ApiError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            ApiError::Timeout(_) | ApiError::InvalidRequest(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ApiError::Timeout(_) => true,
            ApiError::NetworkError(e) => e.is_timeout(),
            _ => false,
        }
    }
}
