use serde::{Deserialize, Serialize};

use crate::api::ApiError;

/// Result of a UI-initiated action, flattened for frontends that cannot
/// consume a Rust `Result` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl From<ApiError> for ActionOutcome {
    fn from(err: ApiError) -> Self {
        Self::failed(err.user_message())
    }
}

impl<T> From<Result<T, ApiError>> for ActionOutcome {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => e.into(),
        }
    }
}
