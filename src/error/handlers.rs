//! Standardized mapping of metadata API responses onto [`SourceError`]

use crate::error::SourceError;
use reqwest::StatusCode;
use serde::Deserialize;

/// The `Status` object the API server returns alongside error responses
#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    reason: String,
}

/// Standard error handler for metadata API responses
pub struct StatusHandler;

impl StatusHandler {
    /// Convert a non-2xx response into the matching error variant.
    ///
    /// `context` names the object being read, e.g. `imagestream ns/app`.
    pub fn handle_error(status: StatusCode, body: &[u8], context: &str) -> SourceError {
        let message = Self::status_message(body)
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

        match status.as_u16() {
            401 => SourceError::Transport(format!(
                "Unauthorized reading {}: {}",
                context, message
            )),
            403 => SourceError::Transport(format!(
                "Forbidden: insufficient permissions for {}: {}",
                context, message
            )),
            404 => SourceError::NotFound(format!("{}: {}", context, message)),
            code => SourceError::UnexpectedStatus {
                status: code,
                message: format!("{}: {}", context, message),
            },
        }
    }

    /// Extract the human-readable message of a `kind: Status` body, if any.
    pub fn status_message(body: &[u8]) -> Option<String> {
        let status: ApiStatus = serde_json::from_slice(body).ok()?;
        if status.kind != "Status" {
            return None;
        }
        match (status.message.is_empty(), status.reason.is_empty()) {
            (false, _) => Some(status.message),
            (true, false) => Some(status.reason),
            (true, true) => None,
        }
    }
}
