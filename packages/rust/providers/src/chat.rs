//! OpenAI-compatible chat completions (OpenRouter or OpenAI).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use shallowdive_core::NarrativeGenerator;
use shallowdive_shared::{LlmEndpoint, Result, ShallowDiveError};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Narrative generator over `POST {base}/chat/completions`.
pub struct ChatNarrator {
    client: Client,
    url: String,
    endpoint: LlmEndpoint,
}

impl ChatNarrator {
    pub fn new(endpoint: LlmEndpoint) -> Result<Self> {
        Ok(Self {
            client: super::build_client(endpoint.timeout_secs)?,
            url: format!("{}/chat/completions", super::base_url(&endpoint.base_url)?),
            endpoint,
        })
    }
}

#[async_trait]
impl NarrativeGenerator for ChatNarrator {
    #[instrument(skip_all, fields(model = %self.endpoint.model, prompt_chars = prompt.len()))]
    async fn generate(&self, system_instructions: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.endpoint.model,
            temperature: self.endpoint.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_instructions,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.endpoint.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ShallowDiveError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShallowDiveError::Generation(format!(
                "HTTP {status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ShallowDiveError::Generation(format!("unreadable response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ShallowDiveError::Generation("response contained no text".into()))?;

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shallowdive_shared::LlmProvider;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(base_url: String) -> LlmEndpoint {
        LlmEndpoint {
            provider: LlmProvider::OpenRouter,
            base_url,
            api_key: "secret".into(),
            model: "openai/gpt-4o".into(),
            temperature: 0.3,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "model": "openai/gpt-4o",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "prompt"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "text cites [1]"}}]
            })))
            .mount(&server)
            .await;

        let narrator = ChatNarrator::new(endpoint(format!("{}/api/v1", server.uri()))).unwrap();
        let text = narrator.generate("sys", "prompt").await.unwrap();
        assert_eq!(text, "text cites [1]");
    }

    #[tokio::test]
    async fn http_error_is_a_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let narrator = ChatNarrator::new(endpoint(server.uri())).unwrap();
        let err = narrator.generate("sys", "prompt").await.unwrap_err();
        assert!(matches!(err, ShallowDiveError::Generation(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn empty_choices_is_a_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let narrator = ChatNarrator::new(endpoint(server.uri())).unwrap();
        assert!(matches!(
            narrator.generate("sys", "prompt").await,
            Err(ShallowDiveError::Generation(_))
        ));
    }
}
