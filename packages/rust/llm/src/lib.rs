//! Text-generation capability used by the clustering, synthesis and
//! editorial stages.
//!
//! The pipeline only ever sees [`TextGenerator`]: one prompt in, free text
//! out. [`ChatClient`] implements it against any OpenAI-compatible
//! `/chat/completions` endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use mindfulnews_shared::{LlmConfig, MindfulNewsError, Result, resolve_api_key};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("MindfulNews/", env!("CARGO_PKG_VERSION"));

/// Maximum number of error-body characters carried into an error message.
const ERROR_BODY_PREVIEW: usize = 200;

// ---------------------------------------------------------------------------
// TextGenerator
// ---------------------------------------------------------------------------

/// A single request/response text-generation call.
///
/// Implementations return the raw response text. Callers treat the output as
/// untrusted and parse it defensively.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send `prompt` and return the generated text.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Model or provider name for diagnostics.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat-completions client.
pub struct ChatClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    /// Build a client from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(config, resolve_api_key(config)?)
    }

    /// Build a client with an explicit API key.
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                MindfulNewsError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let started = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MindfulNewsError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(MindfulNewsError::Generation(format!(
                "HTTP {status}: {preview}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            MindfulNewsError::Generation(format!("invalid completion response: {e}"))
        })?;

        if let Some(usage) = &body.usage {
            debug!(
                tokens_in = usage.prompt_tokens,
                tokens_out = usage.completion_tokens,
                latency_ms = started.elapsed().as_millis() as u64,
                "completion received"
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| MindfulNewsError::Generation("response contained no choices".into()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/v1/", server.uri()),
            timeout_secs: 5,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn request_serializes_as_chat_completion() {
        let req = ChatRequest {
            model: "gpt-4o",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            max_tokens: 10,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hello"}],"max_tokens":10}"#
        );
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = LlmConfig {
            api_key_env: "MN_TEST_MISSING_LLM_KEY_98765".into(),
            ..LlmConfig::default()
        };
        let err = ChatClient::from_config(&config).err().expect("missing key");
        assert!(err.to_string().contains("MN_TEST_MISSING_LLM_KEY_98765"));
    }

    #[tokio::test]
    async fn complete_returns_trimmed_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 123
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  TITLE: Calm\n<p>Body</p>\n"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "test-key").unwrap();
        let text = client.complete("cluster these", 123).await.unwrap();
        assert_eq!(text, "TITLE: Calm\n<p>Body</p>");
    }

    #[tokio::test]
    async fn complete_maps_http_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "k").unwrap();
        let err = client.complete("x", 10).await.unwrap_err();
        assert!(matches!(err, MindfulNewsError::Generation(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn complete_rejects_empty_choices() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "k").unwrap();
        let err = client.complete("x", 10).await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn complete_reports_unreachable_endpoint_as_network_error() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = ChatClient::new(&config, "k").unwrap();
        let err = client.complete("x", 10).await.unwrap_err();
        assert!(matches!(err, MindfulNewsError::Network(_)));
    }
}
