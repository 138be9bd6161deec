//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use pulse_models::config::ModelConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::http::{build_client, check_status};
use crate::traits::{CompletionRequest, LanguageModel};

const USER_AGENT: &str = concat!("pulse/", env!("CARGO_PKG_VERSION"));

pub struct OpenAiClient {
    client: Client,
    api_base: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ProviderError> {
        if config.model.trim().is_empty() {
            return Err(ProviderError::Config("model name is empty".to_string()));
        }
        Ok(Self {
            client: build_client(config.timeout_seconds, USER_AGENT)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_seconds,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Text of the first choice. An empty reply counts as malformed.
pub fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::Malformed("completion has no content".to_string()))
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout_secs))?;
        let text = check_status(resp)
            .await?
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout_secs))?;

        let content = parse_completion(&text)?;
        debug!(model = %self.model, chars = content.len(), "Completion received");
        Ok(content)
    }

    async fn list_models(&self, api_key: &str) -> Result<(), ProviderError> {
        let resp = self
            .client
            .get(format!("{}/models", self.api_base))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout_secs))?;
        check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_content() {
        let body = r###"{"id": "chatcmpl-1", "choices": [{"index": 0,
            "message": {"role": "assistant", "content": "## Daily Brief\nAll quiet."},
            "finish_reason": "stop"}]}"###;
        assert_eq!(parse_completion(body).unwrap(), "## Daily Brief\nAll quiet.");
    }

    #[test]
    fn empty_completion_is_malformed() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        assert!(matches!(parse_completion(body), Err(ProviderError::Malformed(_))));
        assert!(matches!(
            parse_completion(r#"{"choices": []}"#),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn request_serializes_messages_in_order() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "be terse",
                },
                ChatMessage {
                    role: "user",
                    content: "brief me",
                },
            ],
            temperature: 0.2,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "brief me");
        assert_eq!(json["model"], "gpt-4o-mini");
    }

    #[test]
    fn new_trims_trailing_slash() {
        let config = ModelConfig {
            api_base: "http://localhost:9999/v1/".to_string(),
            ..ModelConfig::default()
        };
        let client = OpenAiClient::new(&config).unwrap();
        assert_eq!(client.api_base, "http://localhost:9999/v1");
        assert_eq!(client.model(), "gpt-4o-mini");
    }
}
