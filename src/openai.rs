//! OpenAI-backed emotion classification and speech synthesis.
//!
//! The handlers only see the [`EmotionClassifier`] and [`SpeechSynthesizer`] traits,
//! so tests can swap in canned responses.

use async_trait::async_trait;
use axum::body::Bytes;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::error::BridgeError;

/// Instruction sent alongside every snapshot.
pub const EMOTION_PROMPT: &str = "Eres un experto en reconocimiento de emociones faciales. \
Mira SOLO el rostro de la persona en la imagen y responde con la emoción predominante. \
Elige estrictamente UNA entre estas categorías: Furia, Desagrado, Temor, Alegria, Tristeza. \
No inventes otras palabras ni expliques. Responde solo con la palabra exacta.";

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    /// Returns the model's raw answer for a `data:image/jpeg;base64,...` URL.
    async fn classify(&self, image_data_url: &str) -> Result<String, BridgeError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns MP3 bytes.
    async fn synthesize(&self, text: &str) -> Result<Bytes, BridgeError>;
}

pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
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
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, BridgeError> {
        // No request timeout: a stalled provider stalls the caller
        let client = Client::builder().build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, BridgeError> {
        if self.config.api_key.is_empty() {
            return Err(BridgeError::Upstream("API key not configured".to_string()));
        }

        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(BridgeError::Upstream(describe_failure(status, &error_text)))
    }
}

fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("OpenAI API error ({}): {}", status, envelope.error.message),
        Err(_) => format!("OpenAI API error ({}): {}", status, body),
    }
}

#[async_trait]
impl EmotionClassifier for OpenAiClient {
    async fn classify(&self, image_data_url: &str) -> Result<String, BridgeError> {
        let request = ChatRequest {
            model: &self.config.vision_model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: EMOTION_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_url,
                        },
                    },
                ],
            }],
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?.json().await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BridgeError::Upstream("response contained no message".to_string()))?;

        debug!("Vision model answered: {:?}", content);
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str) -> Result<Bytes, BridgeError> {
        let request = SpeechRequest {
            model: &self.config.speech_model,
            voice: &self.config.voice,
            input: text,
        };

        let audio = self.post("audio/speech", &request).await?.bytes().await?;
        debug!("Synthesized {} bytes of audio", audio.len());
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_matches_wire_format() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: "hola" },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "data:image/jpeg;base64,AAAA",
                        },
                    },
                ],
            }],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gpt-4o-mini",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "hola"},
                        {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AAAA"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn provider_error_message_is_extracted() {
        let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
        let msg = describe_failure(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(msg.contains("429"));
        assert!(msg.contains("Rate limit reached"));

        let msg = describe_failure(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(msg.ends_with("upstream down"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_network() {
        let client = OpenAiClient::new(OpenAiConfig::default()).unwrap();
        let err = client.synthesize("hola").await.unwrap_err();
        assert!(matches!(err, BridgeError::Upstream(_)));
        assert!(err.to_string().contains("API key not configured"));
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let config = OpenAiConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            ..OpenAiConfig::default()
        };
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.endpoint("audio/speech"), "http://localhost:9000/v1/audio/speech");
    }
}
