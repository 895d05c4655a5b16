//! Core data models used throughout File Q&A.
//!
//! These types represent the uploaded files, the retrieved chunks, and the
//! answers that flow through the search → prompt → completion pipeline. The
//! wire names follow the camelCase JSON used by the browser client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An uploaded file as known to the client.
///
/// Created on upload by the front end and read-only here. Only `name` is
/// interpreted; any other metadata (URL, size, extracted text, ...) is
/// preserved verbatim so it can be forwarded to the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLite {
    pub name: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl FileLite {
    /// A file with no metadata beyond its name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Map::new(),
        }
    }
}

/// A filename-tagged excerpt of document text returned by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub filename: String,
    pub text: String,
}

impl FileChunk {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// Request body for the external `POST /search` collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest<'a> {
    pub search_query: &'a str,
    pub files: &'a [FileLite],
    pub max_results: usize,
}

/// Response body of the external `POST /search` collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub search_results: Vec<FileChunk>,
}

/// Request body for `POST /answer` and `POST /answer/stream`.
///
/// The server validates this shape by hand so that it can name the
/// offending field; this type is what clients serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question: String,
    pub file_chunks: Vec<FileChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_format: Option<String>,
}

/// Successful response body of `POST /answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "answer")]
    pub text: String,
    /// Total tokens consumed, as reported by the provider.
    pub usage: u64,
}
