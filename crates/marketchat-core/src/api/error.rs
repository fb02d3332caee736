use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unable to reach the server: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    /// Login or registration rejected the email/password pair
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Session expired: {0}")]
    SessionExpired(#[from] RefreshError),

    #[error("{0}")]
    Validation(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Why the long-lived session could not produce a new access credential.
///
/// Cloned once per waiter so that everyone queued behind one refresh sees
/// the identical failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("the identity service rejected the session")]
    Rejected,

    #[error("refresh response carried no credential")]
    MissingCredential,

    #[error("identity service unreachable: {0}")]
    Unreachable(String),

    #[error("refresh failed: {0}")]
    Failed(String),

    #[error("refresh was abandoned before completing")]
    Abandoned,
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

    /// Map a non-success status and its (already extracted) message.
    pub fn from_status(status: reqwest::StatusCode, message: &str) -> Self {
        let truncated = Self::truncate_body(message);
        match status.as_u16() {
            400 | 422 => ApiError::Validation(truncated),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Classify a transport-level failure. Decode failures mean a response
    /// arrived, so they are not connectivity problems.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Unreachable(err)
        }
    }

    /// An expired access credential, recoverable through a refresh.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unreachable(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::Unreachable(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            ApiError::Unauthorized => "You are not authorized to do that. Please log in again.".to_string(),
            ApiError::InvalidCredentials => "Invalid email or password".to_string(),
            ApiError::SessionExpired(_) => "Session expired. Please log in again.".to_string(),
            ApiError::Validation(msg) => msg.clone(),
            ApiError::RateLimited(msg) if msg.is_empty() => {
                "Too many attempts. Please wait before retrying.".to_string()
            }
            ApiError::RateLimited(msg) => msg.clone(),
            ApiError::AccessDenied(_) => "You do not have access to this resource".to_string(),
            ApiError::NotFound(_) => "Not found".to_string(),
            ApiError::ServerError(_) | ApiError::InvalidResponse(_) => {
                "Something went wrong on the server. Please try again later.".to_string()
            }
        }
    }
}

impl From<&ApiError> for RefreshError {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::InvalidCredentials | ApiError::AccessDenied(_) => {
                RefreshError::Rejected
            }
            ApiError::Unreachable(e) => RefreshError::Unreachable(e.to_string()),
            ApiError::SessionExpired(inner) => inner.clone(),
            other => RefreshError::Failed(other.to_string()),
        }
    }
}
