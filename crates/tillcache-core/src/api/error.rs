use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - API key may be invalid or expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Record was changed on the server since it was loaded")]
    Conflict,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
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

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::AccessDenied(truncated),
            404 => RemoteError::NotFound(truncated),
            409 | 412 => RemoteError::Conflict,
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::ServerError(truncated),
            _ => RemoteError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Map a transport error, separating "could not reach the backend" from
    /// everything else reqwest can report.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            RemoteError::Unreachable(err.to_string())
        } else {
            RemoteError::NetworkError(err)
        }
    }

    /// True when the failure means the client cannot talk to the backend at all.
    pub fn is_connectivity(&self) -> bool {
        match self {
            RemoteError::Unreachable(_) => true,
            RemoteError::NetworkError(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    /// True when retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        self.is_connectivity()
            || matches!(self, RemoteError::RateLimited | RemoteError::ServerError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_maps_known_codes() {
        assert!(matches!(
            RemoteError::from_status(StatusCode::UNAUTHORIZED, ""),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::CONFLICT, "dup"),
            RemoteError::Conflict
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            RemoteError::ServerError(ref b) if b == "upstream"
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::BAD_REQUEST, "bad"),
            RemoteError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = RemoteError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated"));
        assert_eq!(RemoteError::truncate_body("short"), "short");
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(RemoteError::Unreachable("refused".into()).is_connectivity());
        assert!(!RemoteError::ServerError("boom".into()).is_connectivity());
        assert!(RemoteError::ServerError("boom".into()).is_transient());
        assert!(RemoteError::RateLimited.is_transient());
        assert!(!RemoteError::Conflict.is_transient());
        assert!(!RemoteError::NotFound("row".into()).is_transient());
    }
}
