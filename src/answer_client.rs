//! Client for the answer server (`POST /answer`, `POST /answer/stream`).

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;

use crate::completion::StreamEvent;
use crate::config::AnswerConfig;
use crate::error::UpstreamError;
use crate::models::{Answer, AnswerRequest};
use crate::sse::{self, SseFrame};

/// Streamed answer fragments, ending with [`StreamEvent::Done`].
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, UpstreamError>> + Send>>;

/// Obtains an answer for a question and its search results.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    async fn answer(&self, request: &AnswerRequest) -> Result<Answer, UpstreamError>;

    /// Stream the answer. Defaults to a single [`answer`](AnswerClient::answer) call.
    async fn answer_stream(&self, request: &AnswerRequest) -> Result<AnswerStream, UpstreamError> {
        let answer = self.answer(request).await?;
        let events = vec![
            Ok(StreamEvent::Delta(answer.text)),
            Ok(StreamEvent::Done {
                usage: Some(answer.usage),
            }),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// HTTP implementation of [`AnswerClient`].
pub struct HttpAnswerClient {
    http: reqwest::Client,
    url: String,
    stream_url: String,
}

impl HttpAnswerClient {
    pub fn new(config: &AnswerConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let url = config.url.trim_end_matches('/').to_string();
        Ok(Self {
            http: builder.build()?,
            stream_url: format!("{}/stream", url),
            url,
        })
    }

    async fn post(&self, url: &str, request: &AnswerRequest) -> Result<reqwest::Response, UpstreamError> {
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl AnswerClient for HttpAnswerClient {
    async fn answer(&self, request: &AnswerRequest) -> Result<Answer, UpstreamError> {
        let response = self.post(&self.url, request).await?;
        response.json().await.map_err(|e| UpstreamError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }

    async fn answer_stream(&self, request: &AnswerRequest) -> Result<AnswerStream, UpstreamError> {
        let response = self.post(&self.stream_url, request).await?;
        let url = self.stream_url.clone();
        let frames = Box::pin(sse::frames(Box::pin(response.bytes_stream())));

        let events = frames
            .map(move |frame| match frame {
                Ok(frame) => decode_frame(frame),
                Err(source) => Some(Err(UpstreamError::Transport {
                    url: url.clone(),
                    source,
                })),
            })
            .filter_map(futures::future::ready);

        Ok(Box::pin(events))
    }
}

#[derive(Deserialize)]
struct DeltaData {
    text: String,
}

#[derive(Deserialize)]
struct DoneData {
    usage: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorData {
    error: String,
}

/// Decode one frame of the `/answer/stream` protocol. Unknown events are skipped.
fn decode_frame(frame: SseFrame) -> Option<Result<StreamEvent, UpstreamError>> {
    let decode_err = |e: serde_json::Error| UpstreamError::Decode {
        url: "answer stream".to_string(),
        message: e.to_string(),
    };

    match frame.event.as_deref() {
        Some("delta") => Some(
            serde_json::from_str::<DeltaData>(&frame.data)
                .map(|d| StreamEvent::Delta(d.text))
                .map_err(decode_err),
        ),
        Some("done") => Some(
            serde_json::from_str::<DoneData>(&frame.data)
                .map(|d| StreamEvent::Done { usage: d.usage })
                .map_err(decode_err),
        ),
        Some("error") => Some(Err(match serde_json::from_str::<ErrorData>(&frame.data) {
            Ok(d) => UpstreamError::Stream(d.error),
            Err(_) => UpstreamError::Stream(frame.data),
        })),
        _ => None,
    }
}
