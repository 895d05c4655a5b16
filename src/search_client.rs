//! Client for the external file-chunk search endpoint.
//!
//! The search service itself (chunking, embeddings, ranking) lives outside
//! this crate. Its contract is:
//!
//! ```text
//! POST <search.url>
//! { "searchQuery": "...", "files": [FileLite], "maxResults": 10 }
//! → 200 { "searchResults": [FileChunk] }
//! ```

use async_trait::async_trait;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::UpstreamError;
use crate::models::{FileChunk, FileLite, SearchRequest, SearchResponse};

/// Retrieves the chunks most relevant to a question.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        files: &[FileLite],
        max_results: usize,
    ) -> Result<Vec<FileChunk>, UpstreamError>;
}

/// HTTP implementation of [`SearchClient`].
pub struct HttpSearchClient {
    http: reqwest::Client,
    url: String,
}

impl HttpSearchClient {
    pub fn new(config: &SearchConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            http: builder.build()?,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(
        &self,
        query: &str,
        files: &[FileLite],
        max_results: usize,
    ) -> Result<Vec<FileChunk>, UpstreamError> {
        let body = SearchRequest {
            search_query: query,
            files,
            max_results,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| UpstreamError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(results = parsed.search_results.len(), "search complete");
        Ok(parsed.search_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let files = vec![FileLite::named("report.pdf")];
        let body = SearchRequest {
            search_query: "What changed?",
            files: &files,
            max_results: 10,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "searchQuery": "What changed?",
                "files": [{ "name": "report.pdf" }],
                "maxResults": 10
            })
        );
    }

    #[test]
    fn test_file_metadata_passes_through() {
        let file: FileLite = serde_json::from_value(json!({
            "name": "notes.txt",
            "url": "blob:abc",
            "size": 12
        }))
        .unwrap();
        assert_eq!(file.name, "notes.txt");
        let back = serde_json::to_value(&file).unwrap();
        assert_eq!(back["url"], "blob:abc");
        assert_eq!(back["size"], 12);
    }

    #[test]
    fn test_response_parsing() {
        let parsed: SearchResponse = serde_json::from_value(json!({
            "searchResults": [
                { "filename": "a.md", "text": "one" },
                { "filename": "b.md", "text": "two" }
            ]
        }))
        .unwrap();
        assert_eq!(
            parsed.search_results,
            vec![FileChunk::new("a.md", "one"), FileChunk::new("b.md", "two")]
        );
    }
}
