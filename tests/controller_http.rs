use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use file_qa::answer_client::HttpAnswerClient;
use file_qa::completion::{Completion, CompletionProvider, CompletionRequest};
use file_qa::config::{AnswerConfig, Config, SearchConfig};
use file_qa::controller::{AskOutcome, Phase, QaController, FAILURE_PREFIX};
use file_qa::error::ProviderError;
use file_qa::models::FileLite;
use file_qa::server::{self, AppState};
use file_qa::search_client::HttpSearchClient;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

type Seen = Arc<Mutex<Vec<Value>>>;

/// Search stub: records the request and returns one chunk per file.
async fn spawn_search(seen: Seen) -> String {
    async fn handler(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        let results: Vec<Value> = body["files"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|f| json!({ "filename": f["name"], "text": "Revenue grew 12%." }))
            .collect();
        seen.lock().unwrap().push(body);
        Json(json!({ "searchResults": results }))
    }
    let app = Router::new()
        .route("/api/search-file-chunks", post(handler))
        .with_state(seen);
    format!("{}/api/search-file-chunks", spawn(app).await)
}

async fn spawn_failing_search() -> String {
    let app = Router::new().route(
        "/api/search-file-chunks",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "index unavailable") }),
    );
    format!("{}/api/search-file-chunks", spawn(app).await)
}

/// Answers by citing the first file named in the prompt.
struct CitingProvider;

#[async_trait]
impl CompletionProvider for CitingProvider {
    fn name(&self) -> &str {
        "citing"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let cited = request
            .prompt
            .split("Files:\n###\n\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap_or("nothing")
            .to_string();
        Ok(Completion {
            text: format!("Revenue grew 12% according to {}.", cited),
            usage: 42,
        })
    }
}

async fn spawn_answer() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(&Config::minimal(), Arc::new(CitingProvider));
    tokio::spawn(async move {
        server::serve(listener, state).await.unwrap();
    });
    format!("http://{}/answer", addr)
}

fn controller(search_url: String, answer_url: String) -> QaController {
    let search = HttpSearchClient::new(&SearchConfig {
        url: search_url,
        max_results: 4,
        timeout_secs: Some(10),
    })
    .unwrap();
    let answer = HttpAnswerClient::new(&AnswerConfig {
        url: answer_url,
        timeout_secs: Some(10),
    })
    .unwrap();
    QaController::new(Arc::new(search), Arc::new(answer)).with_max_results(4)
}

fn uploads() -> Vec<FileLite> {
    let mut report = FileLite::named("report.pdf");
    report
        .metadata
        .insert("url".to_string(), json!("https://files.local/report.pdf"));
    vec![report, FileLite::named("notes.txt")]
}

#[tokio::test]
async fn test_ask_end_to_end() {
    let seen: Seen = Arc::default();
    let search_url = spawn_search(seen.clone()).await;
    let answer_url = spawn_answer().await;
    let c = controller(search_url, answer_url);

    let outcome = c.ask("How did revenue change?", &uploads()).await;
    assert_eq!(outcome, AskOutcome::Answered);
    assert_eq!(c.phase(), Phase::Done);
    assert_eq!(c.answer(), "Revenue grew 12% according to report.pdf.");
    assert_eq!(c.usage(), Some(42));

    let files = uploads();
    let sources: Vec<&str> = c.sources(&files).iter().map(|f| f.name.as_str()).collect();
    assert_eq!(sources, vec!["report.pdf"]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["searchQuery"], "How did revenue change?");
    assert_eq!(seen[0]["maxResults"], 4);
    assert_eq!(seen[0]["files"][0]["url"], "https://files.local/report.pdf");
}

#[tokio::test]
async fn test_ask_streaming_end_to_end() {
    let search_url = spawn_search(Arc::default()).await;
    let answer_url = spawn_answer().await;
    let c = controller(search_url, answer_url);

    let mut fragments = Vec::new();
    let outcome = c
        .ask_streaming("How did revenue change?", &uploads(), |f| {
            fragments.push(f.to_string())
        })
        .await;

    assert_eq!(outcome, AskOutcome::Answered);
    assert_eq!(fragments.concat(), "Revenue grew 12% according to report.pdf.");
    assert_eq!(c.answer(), fragments.concat());
    assert_eq!(c.usage(), Some(42));
    assert!(!c.display_text().ends_with("  |"));
}

#[tokio::test]
async fn test_search_failure_reported() {
    let search_url = spawn_failing_search().await;
    let answer_url = spawn_answer().await;
    let c = controller(search_url, answer_url);

    assert_eq!(c.ask("What?", &uploads()).await, AskOutcome::SearchFailed);
    let err = c.error().unwrap();
    assert!(err.starts_with(FAILURE_PREFIX));
    assert!(err.contains("500"));
    assert!(!c.has_asked_question());
}

#[tokio::test]
async fn test_unreachable_answer_server() {
    let search_url = spawn_search(Arc::default()).await;
    // Bind then drop to get a port nothing listens on.
    let port = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let c = controller(search_url, format!("http://127.0.0.1:{}/answer", port));

    assert_eq!(c.ask("What?", &uploads()).await, AskOutcome::AnswerFailed);
    assert!(c.has_asked_question());
    assert!(!c.is_loading());
    assert!(c.error().unwrap().starts_with(FAILURE_PREFIX));
}
