use serde::Deserialize;

/// Subset of the Messages resource returned by `POST /Messages.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub sid: String,
    pub status: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Error body Twilio returns with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}
