//! # File Q&A
//!
//! Ask natural-language questions about uploaded files and get a
//! model-written answer that names its source files.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  question   ┌──────────────┐
//! │ Controller │────────────▶│ Search (ext) │
//! │ (ask/view) │◀────────────│  top chunks  │
//! └─────┬──────┘   chunks    └──────────────┘
//!       │ question + chunks
//!       ▼
//! ┌──────────────────────────────────────────┐
//! │ Answer server  POST /answer[/stream]     │
//! │   PromptBuilder ──▶ CompletionProvider   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! fqa serve                                   # start the answer server
//! fqa ask "What changed in Q1?" --file q1.md  # search, answer, list sources
//! fqa prompt "What changed?" --chunks chunks.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Files, chunks, request and answer types |
//! | [`prompt`] | Files block rendering and prompt templating |
//! | [`completion`] | Completion provider trait and OpenAI client |
//! | [`server`] | Answer HTTP server |
//! | [`search_client`] | Client for the external search endpoint |
//! | [`answer_client`] | Client for the answer server |
//! | [`controller`] | Ask state machine and view state |
//! | [`sources`] | Filename-based source attribution |
//! | [`render`] | Markdown rendering |
//! | [`sse`] | Server-sent events reader |
//! | [`error`] | Typed errors |

pub mod answer_client;
pub mod completion;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod prompt;
pub mod render;
pub mod search_client;
pub mod server;
pub mod sources;
pub mod sse;
