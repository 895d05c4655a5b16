//! Completion provider abstraction and the OpenAI chat-completions client.
//!
//! Defines the [`CompletionProvider`] trait and one concrete implementation:
//! - **[`OpenAiClient`]**: calls `POST {base_url}/chat/completions` on any
//!   OpenAI-compatible service.
//!
//! Every call sends the fixed system message [`SYSTEM_PROMPT`] followed by
//! the built prompt as the user message.
//!
//! # Failure Handling
//!
//! There is no retry. A transport failure, a non-2xx status, an undecodable
//! body, or an empty `choices` array is returned to the caller as a
//! [`ProviderError`] without modification.
//!
//! # Streaming
//!
//! [`CompletionProvider::complete_stream`] yields [`StreamEvent::Delta`]
//! fragments and ends with exactly one [`StreamEvent::Done`]. Dropping the
//! stream aborts the underlying HTTP request. Providers that do not stream
//! natively inherit a default that performs one [`complete`] call and
//! replays it as a single fragment.
//!
//! [`complete`]: CompletionProvider::complete

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::config::Config;
use crate::error::ProviderError;
use crate::sse;

/// Fixed system role sent with every completion.
pub const SYSTEM_PROMPT: &str = "You are a helpful AI Assistant";

/// Environment variable holding the provider API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Parameters for one completion call. Unset fields use the client defaults.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Generated text plus total token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: u64,
}

/// One item of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text fragment.
    Delta(String),
    /// Terminal event. `usage` is `None` when the provider did not report it.
    Done { usage: Option<u64> },
}

/// A cancellable sequence of completion fragments.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send>>;

/// A hosted chat-completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Perform one blocking (non-streamed) completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Stream a completion as it is generated.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        let completion = self.complete(request).await?;
        let events = vec![
            Ok(StreamEvent::Delta(completion.text)),
            Ok(StreamEvent::Done {
                usage: Some(completion.usage),
            }),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

// ============ OpenAI wire types ============

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

fn messages(prompt: &str) -> Vec<ChatMessage<'_>> {
    vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        },
        ChatMessage {
            role: "user",
            content: prompt,
        },
    ]
}

fn parse_chat_response(body: &str) -> Result<Completion, ProviderError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::NoChoices)?;

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        usage: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
    })
}

// ============ OpenAI client ============

/// Chat-completions client for OpenAI and compatible services.
///
/// Built once at startup and shared behind an `Arc`; the inner
/// `reqwest::Client` pools connections across requests.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    stream_model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    /// Create a client from configuration and an explicit API key.
    pub fn new(config: &Config, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.completion.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let endpoint = format!(
            "{}/chat/completions",
            config.completion.base_url.trim_end_matches('/')
        );

        Ok(Self {
            http: builder.build()?,
            endpoint,
            api_key: api_key.into(),
            model: config.completion.model.clone(),
            stream_model: config.stream_model().to_string(),
            temperature: config.completion.temperature,
            max_tokens: config.completion.max_tokens,
        })
    }

    /// Create a client reading the API key from `OPENAI_API_KEY`.
    ///
    /// # Errors
    ///
    /// Fails if the variable is missing or empty.
    pub fn from_env(config: &Config) -> anyhow::Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing {} environment variable", API_KEY_ENV))?;
        Self::new(config, api_key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> ChatRequest<'a> {
        let default_model: &str = if stream {
            &self.stream_model
        } else {
            &self.model
        };
        ChatRequest {
            model: request.model.as_deref().unwrap_or(default_model),
            messages: messages(&request.prompt),
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = self.body(&request, false);
        tracing::debug!(model = body.model, "requesting chat completion");

        let response = self.send(&body).await?;
        let text = response.text().await?;
        parse_chat_response(&text)
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        let body = self.body(&request, true);
        tracing::debug!(model = body.model, "requesting streamed chat completion");

        let response = self.send(&body).await?;
        let frames = Box::pin(sse::frames(Box::pin(response.bytes_stream())));

        Ok(Box::pin(stream_events(frames)))
    }
}

/// Translate provider SSE frames into [`StreamEvent`]s.
///
/// Ends after `data: [DONE]`. A body that closes before `[DONE]` is reported
/// as malformed rather than silently treated as complete.
fn stream_events<S>(frames: S) -> impl Stream<Item = Result<StreamEvent, ProviderError>>
where
    S: Stream<Item = Result<sse::SseFrame, reqwest::Error>> + Unpin,
{
    futures::stream::unfold(Some((frames, None::<u64>)), |state| async move {
        let (mut frames, mut usage) = state?;
        loop {
            let frame = match frames.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Some((Err(ProviderError::Transport(e)), None)),
                None => {
                    let err = ProviderError::Malformed("stream ended before [DONE]".to_string());
                    return Some((Err(err), None));
                }
            };

            if frame.data == "[DONE]" {
                return Some((Ok(StreamEvent::Done { usage }), None));
            }

            let chunk: ChatStreamChunk = match serde_json::from_str(&frame.data) {
                Ok(chunk) => chunk,
                Err(e) => return Some((Err(ProviderError::Malformed(e.to_string())), None)),
            };
            if let Some(u) = chunk.usage {
                usage = Some(u.total_tokens);
            }

            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if !text.is_empty() {
                return Some((Ok(StreamEvent::Delta(text)), Some((frames, usage))));
            }
        }
    })
}
