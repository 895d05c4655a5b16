//! # File Q&A CLI (`fqa`)
//!
//! The `fqa` binary runs the answer server and drives the question flow
//! from a terminal.
//!
//! ## Usage
//!
//! ```bash
//! fqa --config ./config/fqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fqa serve` | Start the answer server |
//! | `fqa ask "<question>" --file <name>...` | Search, answer, and list sources |
//! | `fqa prompt "<question>" --chunks <file>` | Print the prompt that would be sent |
//!
//! ## Examples
//!
//! ```bash
//! # Start the answer server (needs OPENAI_API_KEY)
//! fqa serve --config ./config/fqa.toml
//!
//! # Ask about two uploaded files, streaming the answer
//! fqa ask "What were the Q1 takeaways?" --file q1.md --file notes.txt --stream
//!
//! # Inspect the prompt for a saved set of chunks
//! fqa prompt "What changed?" --chunks ./chunks.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use file_qa::answer_client::HttpAnswerClient;
use file_qa::config::{self, Config};
use file_qa::controller::{AskOutcome, QaController};
use file_qa::models::{FileChunk, FileLite};
use file_qa::prompt::PromptBuilder;
use file_qa::search_client::HttpSearchClient;
use file_qa::server;

/// File Q&A: answer questions about your files with a hosted language model.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/fqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "fqa",
    about = "File Q&A: answer questions about uploaded files",
    version,
    long_about = "File Q&A searches uploaded files for the excerpts most relevant to a \
    question, sends them to a completion model with a grounding prompt, and reports the \
    answer together with the files it cites."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/fqa.toml`. When the file is missing, `ask` and
    /// `prompt` fall back to built-in defaults.
    #[arg(long, global = true, default_value = "./config/fqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the answer server.
    ///
    /// Binds to `[server].bind` and serves `POST /answer`,
    /// `POST /answer/stream` and `GET /health`. Reads `OPENAI_API_KEY`.
    Serve,

    /// Ask a question about uploaded files.
    ///
    /// Calls the configured search endpoint, forwards the results to the
    /// answer endpoint, then prints the answer and the files it mentions.
    Ask {
        /// The question to ask.
        question: String,

        /// Name of an uploaded file to search. Repeat for several files.
        #[arg(long = "file")]
        files: Vec<String>,

        /// Replace the built-in instruction block with the contents of this file.
        #[arg(long)]
        prompt_format_file: Option<PathBuf>,

        /// Print the answer as HTML instead of markdown.
        #[arg(long)]
        html: bool,

        /// Print fragments as they arrive.
        #[arg(long)]
        stream: bool,
    },

    /// Print the prompt that would be sent for a question and a set of chunks.
    ///
    /// `--chunks` is a JSON array of `{ "filename", "text" }` objects. Nothing
    /// is sent over the network.
    Prompt {
        /// The question to ask.
        question: String,

        /// JSON file holding the file chunks.
        #[arg(long)]
        chunks: PathBuf,

        /// Replace the built-in instruction block with the contents of this file.
        #[arg(long)]
        prompt_format_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("file_qa=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Ask {
            question,
            files,
            prompt_format_file,
            html,
            stream,
        } => {
            let cfg = load_or_default(&cli.config)?;
            let format = read_prompt_format(prompt_format_file.as_deref())?;
            run_ask(&cfg, &question, &files, format, html, stream).await?;
        }
        Commands::Prompt {
            question,
            chunks,
            prompt_format_file,
        } => {
            let cfg = load_or_default(&cli.config)?;
            let format = read_prompt_format(prompt_format_file.as_deref())?;
            run_prompt(&cfg, &question, &chunks, format.as_deref())?;
        }
    }

    Ok(())
}

/// Load the config file, or use defaults when it does not exist.
///
/// A file that exists but fails to parse is still an error.
fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn read_prompt_format(path: Option<&Path>) -> anyhow::Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read prompt format file: {}", p.display()))
    })
    .transpose()
}

async fn run_ask(
    cfg: &Config,
    question: &str,
    file_names: &[String],
    prompt_format: Option<String>,
    html: bool,
    stream: bool,
) -> anyhow::Result<()> {
    let search = Arc::new(HttpSearchClient::new(&cfg.search)?);
    let answer = Arc::new(HttpAnswerClient::new(&cfg.answer)?);
    let controller = QaController::new(search, answer).with_max_results(cfg.search.max_results);
    controller.set_prompt_format(prompt_format);

    let files: Vec<FileLite> = file_names.iter().map(FileLite::named).collect();

    let outcome = if stream && !html {
        let mut sink = FragmentSink::new(std::io::stdout());
        let outcome = controller
            .ask_streaming(question, &files, |fragment| sink.push(fragment))
            .await;
        sink.finish().context("Failed to write answer to stdout")?;
        println!();
        outcome
    } else {
        controller.ask(question, &files).await
    };

    match outcome {
        AskOutcome::Answered => {}
        AskOutcome::Ignored => return Ok(()),
        AskOutcome::Rejected | AskOutcome::SearchFailed | AskOutcome::AnswerFailed => {
            let message = controller.error().unwrap_or_default();
            anyhow::bail!("{}", message.trim_end());
        }
    }

    if html {
        println!("{}", controller.render_html());
    } else if !stream {
        println!("{}", controller.answer());
    }

    let sources = controller.sources(&files);
    if !sources.is_empty() {
        println!();
        println!("Sources:");
        for file in sources {
            println!("  - {}", file.name);
        }
    }

    if let Some(usage) = controller.usage() {
        tracing::info!(usage, "answer complete");
    }

    Ok(())
}

/// Writes streamed fragments as they arrive, keeping the first write error.
///
/// After a failed write further fragments are dropped; the error surfaces
/// from [`finish`](FragmentSink::finish).
struct FragmentSink<W> {
    out: W,
    error: Option<std::io::Error>,
}

impl<W: Write> FragmentSink<W> {
    fn new(out: W) -> Self {
        Self { out, error: None }
    }

    fn push(&mut self, fragment: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self
            .out
            .write_all(fragment.as_bytes())
            .and_then(|()| self.out.flush())
        {
            self.error = Some(e);
        }
    }

    fn finish(self) -> std::io::Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn run_prompt(
    cfg: &Config,
    question: &str,
    chunks_path: &Path,
    prompt_format: Option<&str>,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(chunks_path)
        .with_context(|| format!("Failed to read chunks file: {}", chunks_path.display()))?;
    let chunks: Vec<FileChunk> =
        serde_json::from_str(&raw).with_context(|| "chunks file must be a JSON array of { filename, text }")?;

    let builder = PromptBuilder::new(cfg.prompt.max_files_chars, cfg.prompt.format.clone());
    print!("{}", builder.build(question, &chunks, prompt_format));
    println!();
    Ok(())
}
