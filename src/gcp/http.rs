//! HTTP utilities for GCP REST API calls

use crate::error::ApiError;
use reqwest::{Client, Method, Response};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Extract `(reason, message)` from a Google API error body
///
/// ```json
/// {"error": {"code": 400, "message": "...", "errors": [{"reason": "resourceInUseByAnotherResource"}]}}
/// ```
fn parse_error_body(body: &str) -> (String, String) {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return (String::new(), sanitize_for_log(body));
    };
    let error = value.get("error");
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();
    let reason = error
        .and_then(|e| e.get("errors"))
        .and_then(|e| e.as_array())
        .and_then(|errors| errors.first())
        .and_then(|e| e.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .to_string();
    (reason, message)
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("psclink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        self.send(Method::GET, url, token, None).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        self.send(Method::POST, url, token, body).await
    }

    /// Make a PUT request to a GCP API
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> Result<Value, ApiError> {
        self.send(Method::PUT, url, token, Some(body)).await
    }

    /// Make a DELETE request to a GCP API
    pub async fn delete(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        self.send(Method::DELETE, url, token, None).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to send request: {e}")))?;

        Self::read_response(response).await
    }

    async fn read_response(response: Response) -> Result<Value, ApiError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let (reason, message) = parse_error_body(&body);
            // 404 is routine during existence probing
            if status.as_u16() == 404 {
                tracing::debug!("API not found: {}", sanitize_for_log(&message));
            } else {
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            }
            return Err(ApiError::from_status(status.as_u16(), &reason, &message));
        }

        // Handle empty response
        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::Transport(format!("failed to parse response JSON: {e}")))
    }
}

/// Format a provisioning error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_gcp_error(error: &ApiError) -> String {
    match error {
        ApiError::Status { status: 401, .. } => {
            "Authentication failed. Run 'gcloud auth application-default login'.".to_string()
        }
        ApiError::Status { status: 403, .. } => {
            "Permission denied. Check your GCP IAM permissions.".to_string()
        }
        ApiError::Status { status: 429, .. } => {
            "Rate limit exceeded. Please try again later.".to_string()
        }
        ApiError::Status { status, .. } if *status >= 500 => {
            "GCP service temporarily unavailable. Please try again.".to_string()
        }
        other => other
            .to_string()
            .chars()
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .take(160)
            .collect(),
    }
}
