//! Backend API client: POSTs `{user_number, message}` and reads `{reply}`.
//! One attempt per call, bounded by the configured timeout.

use serde::Serialize;
use std::time::Duration;

/// JSON body sent to the backend for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayPayload {
    pub user_number: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend api error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("empty response from backend")]
    EmptyBody,
    #[error("backend response is not a JSON object")]
    NotAnObject,
    #[error("backend response has no 'reply' field")]
    MissingReply,
}

impl BackendError {
    /// Malformed or incomplete response, as opposed to a transport or status failure.
    pub fn is_invalid_response(&self) -> bool {
        matches!(
            self,
            BackendError::EmptyBody | BackendError::NotAnObject | BackendError::MissingReply
        )
    }
}

/// Client for the backend API.
#[derive(Clone)]
pub struct BackendClient {
    url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.unwrap_or_default(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the payload and return the validated `reply` text (possibly empty).
    pub async fn forward(&self, payload: &RelayPayload) -> Result<String, BackendError> {
        let res = self.client.post(&self.url).json(payload).send().await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        log::debug!("backend response: {}", body);
        validate_reply(&body)
    }
}

/// Validate a raw response body and extract `reply`.
///
/// Checked in order: non-empty body, JSON object, `reply` present as a string.
/// Body that is not JSON at all counts as "not an object".
pub fn validate_reply(body: &str) -> Result<String, BackendError> {
    if body.trim().is_empty() {
        return Err(BackendError::EmptyBody);
    }
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|_| BackendError::NotAnObject)?;
    if value.is_null() {
        return Err(BackendError::EmptyBody);
    }
    let obj = value.as_object().ok_or(BackendError::NotAnObject)?;
    obj.get("reply")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(BackendError::MissingReply)
}
