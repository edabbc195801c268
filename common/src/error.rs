use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The JSON body returned for every error response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorInformation {
    /// A machine readable error type
    pub error: String,
    /// A human readable error message
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInformation {
    pub fn new(error: impl Into<String>, message: impl ToString) -> Self {
        Self {
            error: error.into(),
            message: message.to_string(),
            details: None,
        }
    }
}
