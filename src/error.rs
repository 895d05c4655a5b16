//! Typed errors for the answer pipeline.
//!
//! Application plumbing (config loading, CLI commands, server startup) uses
//! `anyhow`; these enums cover the failures callers need to tell apart.

use thiserror::Error;

/// Failures reported by a completion provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider answered but returned an empty choice list.
    #[error("No text returned from the completions endpoint.")]
    NoChoices,

    /// The request never produced an HTTP response (DNS, connect, TLS, reset).
    #[error("completion transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider replied with a non-success status (auth, rate limit, 5xx).
    #[error("completion provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider replied 2xx but the body could not be decoded.
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

/// Request-shape problems detected by the answer endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    NotJson,

    #[error("fileChunks must be an array")]
    FileChunks,

    #[error("question must be a string")]
    Question,

    #[error("promptFormat must be a string")]
    PromptFormat,
}

/// Failures calling the search or answer endpoints from the client side.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("answer stream ended with an error: {0}")]
    Stream(String),
}
