//! AI provider clients: image description and text-to-speech
//!
//! Two traits keep the server independent of the vendor:
//! - `VisionProvider`: describe an image URL, returning the first completion choice
//! - `SpeechProvider`: render text to MPEG audio bytes
//!
//! `OpenAiClient` implements both against the OpenAI REST API. Failures are
//! surfaced as-is; nothing is retried.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::OpenAiConfig;

// ============================================================================
// Provider traits
// ============================================================================

#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Returns the first completion choice verbatim, including `message.content`.
    async fn describe_image(&self, image_url: &str) -> Result<Value, ProviderError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Returns the full audio payload (`audio/mpeg`).
    async fn synthesize(&self, text: &str) -> Result<Bytes, ProviderError>;

    fn name(&self) -> &str;
}

/// Text of a completion choice, if it has any.
pub fn choice_content(choice: &Value) -> Option<&str> {
    choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Completion response contained no choices")]
    MissingChoice,

    #[error("Missing API key")]
    MissingApiKey,
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Http(_) => "transport",
            ProviderError::Api { .. } => "api",
            ProviderError::MissingChoice => "shape",
            ProviderError::MissingApiKey => "config",
        }
    }
}

// ============================================================================
// OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig, api_key: String) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            config,
            api_key,
        })
    }

    /// Create a client with a custom base URL (for testing / proxies)
    pub fn with_base_url(
        mut config: OpenAiConfig,
        api_key: String,
        base_url: String,
    ) -> Result<Self, ProviderError> {
        config.base_url = base_url;
        Self::new(config, api_key)
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), route)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &T,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.url(route))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<OpenAiErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error)
            .map(|e| e.message)
            .unwrap_or(error_body);

        tracing::error!(code = status.as_u16(), route, message = %message, "OpenAI API error");

        Err(ProviderError::Api {
            code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl VisionProvider for OpenAiClient {
    async fn describe_image(&self, image_url: &str) -> Result<Value, ProviderError> {
        let request = ChatRequest {
            model: &self.config.vision_model,
            max_tokens: self.config.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: &self.config.vision_prompt,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                ],
            }],
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::MissingChoice)
    }

    fn name(&self) -> &str {
        "openai-vision"
    }
}

#[async_trait]
impl SpeechProvider for OpenAiClient {
    async fn synthesize(&self, text: &str) -> Result<Bytes, ProviderError> {
        let request = SpeechRequest {
            model: &self.config.speech_model,
            voice: &self.config.voice,
            input: text,
        };

        let audio = self.post("audio/speech", &request).await?.bytes().await?;
        tracing::debug!(bytes = audio.len(), "Synthesized speech");
        Ok(audio)
    }

    fn name(&self) -> &str {
        "openai-speech"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::with_base_url(
            OpenAiConfig::default(),
            "sk-test".to_string(),
            format!("{}/v1", server.uri()),
        )
        .expect("Failed to create client")
    }

    fn completion_response(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    #[tokio::test]
    async fn test_describe_image_sends_vision_prompt_and_returns_first_choice() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server);

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-4-vision-preview",
                "max_tokens": 300,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "What’s in this image?" },
                        { "type": "image_url", "image_url": { "url": "https://cdn.example/p.jpg" } }
                    ]
                }]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_response("A red valve.")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let choice = client.describe_image("https://cdn.example/p.jpg").await.unwrap();
        assert_eq!(choice_content(&choice), Some("A red valve."));
        assert_eq!(choice["finish_reason"], "stop");
        assert_eq!(choice["index"], 0);
    }

    #[tokio::test]
    async fn test_describe_image_without_choices_is_error() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&mock_server)
            .await;

        let err = client.describe_image("u").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingChoice));
    }

    #[tokio::test]
    async fn test_provider_error_message_is_extracted() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "You exceeded your current quota", "type": "insufficient_quota" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        match client.describe_image("u").await {
            Err(ProviderError::Api { code, message }) => {
                assert_eq!(code, 429);
                assert_eq!(message, "You exceeded your current quota");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_synthesize_returns_raw_audio_bytes() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server);
        let fake_mp3: Vec<u8> = vec![0x49, 0x44, 0x33, 0x04, 0x00, 0x00];

        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(body_json(json!({
                "model": "tts-1",
                "voice": "alloy",
                "input": "A red valve."
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(fake_mp3.clone()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let audio = client.synthesize("A red valve.").await.unwrap();
        assert_eq!(audio.as_ref(), fake_mp3.as_slice());
    }

    #[tokio::test]
    async fn test_synthesize_plain_text_error_body() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&mock_server)
            .await;

        match client.synthesize("hi").await {
            Err(ProviderError::Api { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "upstream down");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = OpenAiClient::new(OpenAiConfig::default(), String::new());
        assert!(matches!(result, Err(ProviderError::MissingApiKey)));
    }

    #[test]
    fn test_choice_content_handles_missing_message() {
        assert_eq!(choice_content(&json!({ "index": 0 })), None);
        assert_eq!(choice_content(&json!({ "message": { "content": null } })), None);
    }
}
