//! Ollama text-generation client.
//!
//! Sends one prompt plus sampling options to `/api/chat` (non-streaming)
//! and returns the generated text with token/timing counters. Failures are
//! surfaced to the caller and never retried here; the pipelines own the
//! recovery policy.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use ticketforge_shared::{Result, SamplingConfig, TicketForgeError};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("TicketForge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options & result types
// ---------------------------------------------------------------------------

/// Sampling options forwarded verbatim in the request's `options` object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_ctx: u32,
    pub repeat_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

impl From<&SamplingConfig> for GenerationOptions {
    fn from(cfg: &SamplingConfig) -> Self {
        Self {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            num_ctx: cfg.num_ctx,
            repeat_penalty: cfg.repeat_penalty,
            seed: cfg.seed,
            num_predict: cfg.num_predict,
        }
    }
}

/// One completed generation: raw text plus the counters the endpoint reports.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The model's message content, unmodified.
    pub text: String,
    /// Tokens generated (`eval_count`), 0 when the endpoint omits it.
    pub eval_tokens: u64,
    /// Tokens in the prompt (`prompt_eval_count`), 0 when omitted.
    pub prompt_tokens: u64,
    /// Wall-clock duration of the call as measured client-side.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// TextGeneration trait
// ---------------------------------------------------------------------------

/// The text-generation seam.
///
/// Pipelines depend on this trait rather than on [`OllamaClient`] so tests
/// can substitute a scripted generator.
pub trait TextGeneration {
    /// Generate text for `prompt` with an optional system instruction.
    fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> impl Future<Output = Result<Generation>>;
}

// ---------------------------------------------------------------------------
// Wire types (/api/chat, stream=false)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: &'a GenerationOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: ResponseMessage,
    /// Token counters are optional in the response; malformed or absent
    /// values count as zero rather than failing the call.
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

// ---------------------------------------------------------------------------
// OllamaClient
// ---------------------------------------------------------------------------

/// HTTP client for a single Ollama server and model.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: Url,
    model: String,
}

impl OllamaClient {
    /// Create a client for `base_url` (e.g. `http://localhost:11434`).
    ///
    /// The timeout applies per request; there is no retry on top.
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TicketForgeError::config(format!("invalid Ollama URL '{base_url}': {e}")))?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TicketForgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            model: model.into(),
        })
    }

    /// The model this client sends requests for.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TextGeneration for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<Generation> {
        let url = self
            .base_url
            .join("/api/chat")
            .map_err(|e| TicketForgeError::config(format!("invalid endpoint URL: {e}")))?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options,
        };

        debug!(%url, model = %self.model, prompt_len = prompt.len(), "sending generation request");

        let started = Instant::now();
        let response = self
            .client
            .post(url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| TicketForgeError::Network(format!("{url}: {e}")))?;
        let duration = started.elapsed();

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TicketForgeError::Network(format!(
                "{url}: HTTP {status}: {}",
                truncate(&body, 500)
            )));
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| TicketForgeError::Network(format!("{url}: invalid response body: {e}")))?;

        if data.message.content.is_empty() {
            warn!(model = %self.model, "empty content in generation response");
        }

        Ok(Generation {
            text: data.message.content,
            eval_tokens: data.eval_count.unwrap_or(0),
            prompt_tokens: data.prompt_eval_count.unwrap_or(0),
            duration,
        })
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> GenerationOptions {
        GenerationOptions {
            temperature: 0.2,
            top_p: 0.9,
            num_ctx: 2048,
            repeat_penalty: 1.1,
            seed: Some(12345),
            num_predict: Some(1024),
        }
    }

    #[test]
    fn options_serialization_skips_unset_fields() {
        let mut opts = options();
        opts.seed = None;
        opts.num_predict = None;
        let json = serde_json::to_string(&opts).unwrap();
        assert!(!json.contains("seed"));
        assert!(!json.contains("num_predict"));
        assert!(json.contains(r#""num_ctx":2048"#));
    }

    #[test]
    fn options_from_sampling_config() {
        let cfg = SamplingConfig::kb();
        let opts = GenerationOptions::from(&cfg);
        assert_eq!(opts.temperature, 0.5);
        assert_eq!(opts.num_ctx, 4096);
        assert_eq!(opts.seed, None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "aä".repeat(200);
        let cut = truncate(&text, 5);
        assert!(cut.len() <= 5);
        assert!(text.starts_with(cut));
        assert_eq!(truncate("short", 500), "short");
    }

    #[tokio::test]
    async fn generate_returns_text_and_counters() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "stream": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "[1,2,3]"},
                "eval_count": 42,
                "prompt_eval_count": 17,
            })))
            .mount(&server)
            .await;

        let client =
            OllamaClient::new(&server.uri(), "test-model", Duration::from_secs(5)).unwrap();
        let result = client
            .generate("make tickets", Some("you are a generator"), &options())
            .await
            .unwrap();

        assert_eq!(result.text, "[1,2,3]");
        assert_eq!(result.eval_tokens, 42);
        assert_eq!(result.prompt_tokens, 17);
    }

    #[tokio::test]
    async fn missing_counters_default_to_zero() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "hello"},
            })))
            .mount(&server)
            .await;

        let client =
            OllamaClient::new(&server.uri(), "test-model", Duration::from_secs(5)).unwrap();
        let result = client.generate("prompt", None, &options()).await.unwrap();

        assert_eq!(result.eval_tokens, 0);
        assert_eq!(result.prompt_tokens, 0);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string("model runner has crashed"),
            )
            .mount(&server)
            .await;

        let client =
            OllamaClient::new(&server.uri(), "test-model", Duration::from_secs(5)).unwrap();
        let err = client.generate("prompt", None, &options()).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("500"), "got: {message}");
        assert!(message.contains("model runner has crashed"), "got: {message}");
    }

    #[tokio::test]
    async fn connection_failure_is_an_error() {
        // Nothing listens on this port.
        let client = OllamaClient::new(
            "http://127.0.0.1:1",
            "test-model",
            Duration::from_millis(500),
        )
        .unwrap();
        let err = client.generate("prompt", None, &options()).await;
        assert!(err.is_err());
    }

    #[test]
    fn invalid_base_url_rejected() {
        let err = OllamaClient::new("not a url", "m", Duration::from_secs(1));
        assert!(err.is_err());
    }
}
