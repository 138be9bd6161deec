use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;

use crate::error::ProviderError;

pub(crate) fn build_client(timeout_secs: u64, user_agent: &str) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .build()
        .map_err(|e| ProviderError::Config(e.to_string()))
}

/// Pass a successful response through, or turn a failed one into a
/// classified error carrying the provider's message.
pub(crate) async fn check_status(resp: Response) -> Result<Response, ProviderError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, error_message(&text)))
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Extract `error.message` from a JSON error body, else the trimmed body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorBody { message: Some(m) },
        }) => m,
        _ => body.trim().chars().take(300).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_from_json() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Incorrect API key provided");
    }

    #[test]
    fn error_message_from_plain_text() {
        assert_eq!(error_message("  Service Unavailable\n"), "Service Unavailable");
    }
}
