//! Question-and-answer controller.
//!
//! Drives one "ask" interaction: validate input, call the search endpoint,
//! forward its results to the answer endpoint, and hold the view state the
//! front end renders (phase, answer text, error banner, sources).
//!
//! # Phases
//!
//! ```text
//!            ask (invalid input)
//!   Idle ───────────────────────────────▶ Failed
//!    │  ask                                 ▲  ▲
//!    ▼            search error              │  │
//!  Searching ───────────────────────────────┘  │
//!    │  search ok                              │ answer error
//!    ▼                                         │
//!  Answering ──────────────────────────────────┘
//!    │  answer ok
//!    ▼
//!   Done
//! ```
//!
//! While `Searching` or `Answering`, further calls to [`QaController::ask`]
//! are ignored, so rapid repeated submission produces one search only.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;

use crate::answer_client::AnswerClient;
use crate::completion::StreamEvent;
use crate::models::{AnswerRequest, FileLite};
use crate::render::{markdown_to_html, CURSOR};
use crate::search_client::SearchClient;
use crate::sources::cited_files;

pub const MISSING_QUESTION: &str = "Please ask a question.";
pub const MISSING_FILES: &str = "Please upload files before asking a question.";
pub const FAILURE_PREFIX: &str = "Sorry, something went wrong!\n";

/// Default number of chunks requested from search.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Where the current interaction stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Searching,
    Answering,
    Done,
    Failed { message: String },
}

impl Phase {
    /// A request is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Searching | Phase::Answering)
    }
}

/// Result of one [`QaController::ask`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskOutcome {
    /// Another ask was in flight; nothing happened.
    Ignored,
    /// Question or file list missing; no request was made.
    Rejected,
    SearchFailed,
    AnswerFailed,
    Answered,
}

#[derive(Debug)]
struct ViewState {
    phase: Phase,
    answer: String,
    usage: Option<u64>,
    has_asked_question: bool,
}

/// Orchestrates search then answer for a single user session.
pub struct QaController {
    search: Arc<dyn SearchClient>,
    answer: Arc<dyn AnswerClient>,
    max_results: usize,
    prompt_format: Mutex<Option<String>>,
    state: Mutex<ViewState>,
}

impl QaController {
    pub fn new(search: Arc<dyn SearchClient>, answer: Arc<dyn AnswerClient>) -> Self {
        Self {
            search,
            answer,
            max_results: DEFAULT_MAX_RESULTS,
            prompt_format: Mutex::new(None),
            state: Mutex::new(ViewState {
                phase: Phase::Idle,
                answer: String::new(),
                usage: None,
                has_asked_question: false,
            }),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Override the instruction block sent with the next asks.
    pub fn set_prompt_format(&self, format: Option<String>) {
        *lock(&self.prompt_format) = format;
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        lock(&self.state)
    }

    // ============ Actions ============

    /// Ask a question over `files`, waiting for the whole answer.
    pub async fn ask(&self, question: &str, files: &[FileLite]) -> AskOutcome {
        self.run(question, files, None).await
    }

    /// Ask a question, appending answer fragments as they arrive.
    ///
    /// `on_fragment` sees each fragment once, in order.
    pub async fn ask_streaming<F>(
        &self,
        question: &str,
        files: &[FileLite],
        mut on_fragment: F,
    ) -> AskOutcome
    where
        F: FnMut(&str) + Send,
    {
        let on_fragment: &mut (dyn FnMut(&str) + Send) = &mut on_fragment;
        self.run(question, files, Some(on_fragment)).await
    }

    async fn run(
        &self,
        question: &str,
        files: &[FileLite],
        on_fragment: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> AskOutcome {
        {
            let mut st = self.state();
            if st.phase.is_busy() {
                tracing::debug!("ask ignored, request already in flight");
                return AskOutcome::Ignored;
            }

            st.answer.clear();
            st.usage = None;

            if question.is_empty() {
                st.phase = Phase::Failed {
                    message: MISSING_QUESTION.to_string(),
                };
                return AskOutcome::Rejected;
            }
            if files.is_empty() {
                st.phase = Phase::Failed {
                    message: MISSING_FILES.to_string(),
                };
                return AskOutcome::Rejected;
            }

            st.phase = Phase::Searching;
        }

        let chunks = match self.search.search(question, files, self.max_results).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!(error = %e, "error in search file chunks");
                self.fail(&e);
                return AskOutcome::SearchFailed;
            }
        };

        {
            let mut st = self.state();
            st.has_asked_question = true;
            st.phase = Phase::Answering;
        }

        let request = AnswerRequest {
            question: question.to_string(),
            file_chunks: chunks,
            prompt_format: lock(&self.prompt_format).clone(),
        };

        match on_fragment {
            None => self.answer_whole(&request).await,
            Some(cb) => self.answer_streamed(&request, cb).await,
        }
    }

    async fn answer_whole(&self, request: &AnswerRequest) -> AskOutcome {
        match self.answer.answer(request).await {
            Ok(answer) => {
                let mut st = self.state();
                st.answer = answer.text;
                st.usage = Some(answer.usage);
                st.phase = Phase::Done;
                AskOutcome::Answered
            }
            Err(e) => {
                tracing::error!(error = %e, "get answer from files failed");
                self.fail(&e);
                AskOutcome::AnswerFailed
            }
        }
    }

    async fn answer_streamed(
        &self,
        request: &AnswerRequest,
        on_fragment: &mut (dyn FnMut(&str) + Send),
    ) -> AskOutcome {
        let mut stream = match self.answer.answer_stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "answer stream failed to start");
                self.fail(&e);
                return AskOutcome::AnswerFailed;
            }
        };

        while let Some(event) = stream.next().await {
            match event {
                Ok(StreamEvent::Delta(text)) => {
                    on_fragment(&text);
                    self.state().answer.push_str(&text);
                }
                Ok(StreamEvent::Done { usage }) => {
                    let mut st = self.state();
                    st.usage = usage;
                    st.phase = Phase::Done;
                    return AskOutcome::Answered;
                }
                Err(e) => {
                    tracing::error!(error = %e, "answer stream failed");
                    self.fail(&e);
                    return AskOutcome::AnswerFailed;
                }
            }
        }

        self.fail(&"answer stream ended before completion");
        AskOutcome::AnswerFailed
    }

    fn fail(&self, err: &dyn std::fmt::Display) {
        self.state().phase = Phase::Failed {
            message: format!("{}{}", FAILURE_PREFIX, err),
        };
    }

    // ============ View ============

    pub fn phase(&self) -> Phase {
        self.state().phase.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().phase.is_busy()
    }

    /// The error banner, if any.
    pub fn error(&self) -> Option<String> {
        match &self.state().phase {
            Phase::Failed { message } => Some(message.clone()),
            _ => None,
        }
    }

    /// Stored answer text, without any cursor marker.
    pub fn answer(&self) -> String {
        self.state().answer.clone()
    }

    pub fn usage(&self) -> Option<u64> {
        self.state().usage
    }

    /// Whether the answer panel should be visible.
    pub fn has_asked_question(&self) -> bool {
        self.state().has_asked_question
    }

    /// Answer as displayed: the cursor marker trails it while in progress.
    pub fn display_text(&self) -> String {
        let st = self.state();
        if st.answer.is_empty() {
            return String::new();
        }
        match st.phase {
            Phase::Answering => format!("{}{}", st.answer, CURSOR),
            _ => st.answer.clone(),
        }
    }

    /// [`display_text`](Self::display_text) rendered as HTML.
    pub fn render_html(&self) -> String {
        markdown_to_html(&self.display_text())
    }

    /// Uploaded files whose names appear in the answer.
    pub fn sources<'a>(&self, files: &'a [FileLite]) -> Vec<&'a FileLite> {
        cited_files(files, &self.state().answer)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
