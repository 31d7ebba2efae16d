use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use closetmind_core::config::LlmConfig;
use closetmind_core::domain::chat::Turn;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Transient backend failure: connection refused, timeout, 429/5xx.
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),
    /// The backend answered, but with nothing usable.
    #[error("generation backend returned an unusable response: {0}")]
    Malformed(String),
}

/// The opaque text-completion seam: an augmented prompt plus the prior-turn
/// history, raw text back. Shape validation happens in the responders.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, GenerationError>;
}

/// Client for OpenAI-compatible chat-completions endpoints (OpenAI, Ollama,
/// and gateways that speak the same dialect).
pub struct HttpGenerationClient {
    client: reqwest::Client,
    chat_url: String,
    model: String,
}

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

impl HttpGenerationClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&SecretString>,
        request_timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let bearer = format!("Bearer {}", key.expose_secret());
            let value = HeaderValue::from_str(&bearer)
                .map_err(|error| GenerationError::Unavailable(format!("invalid api key: {error}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| {
                GenerationError::Unavailable(format!("http client init failed: {error}"))
            })?;

        Ok(Self { client, chat_url: chat_completions_url(base_url), model: model.to_string() })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL);
        Self::new(
            base_url,
            &config.model,
            config.api_key.as_ref(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationClient {
    async fn generate(&self, prompt: &str, history: &[Turn]) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(history, prompt),
            temperature: 0.1,
        };

        let response = self
            .client
            .post(&self.chat_url)
            .json(&request)
            .send()
            .await
            .map_err(|error| GenerationError::Unavailable(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Unavailable(format!(
                "chat completion returned {status}: {body}"
            )));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::Malformed(error.to_string()))?;

        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(GenerationError::Malformed("empty completion content".to_string()));
        }
        Ok(content)
    }
}

fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn build_messages(history: &[Turn], prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    for turn in history {
        messages.push(ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        });
    }
    messages.push(ChatMessage { role: "user".to_string(), content: prompt.to_string() });
    messages
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}


#[cfg(test)]
mod tests {
    use chrono::Utc;

    use closetmind_core::domain::chat::{ConversationId, Turn, TurnId, TurnRole};

    use super::{build_messages, chat_completions_url};

    #[test]
    fn base_url_joins_without_duplicate_slashes() {
        assert_eq!(
            chat_completions_url("http://localhost:11434/v1/"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn history_precedes_the_prompt_with_original_roles() {
        let history = vec![
            Turn {
                id: TurnId(1),
                conversation_id: ConversationId(1),
                role: TurnRole::User,
                content: "find a coat".to_string(),
                created_at: Utc::now(),
            },
            Turn {
                id: TurnId(2),
                conversation_id: ConversationId(1),
                role: TurnRole::Assistant,
                content: "{\"result\":{}}".to_string(),
                created_at: Utc::now(),
            },
        ];

        let messages = build_messages(&history, "composed prompt");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content, "composed prompt");
    }
}
