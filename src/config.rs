use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used by `/answer/stream`; falls back to `model`.
    #[serde(default)]
    pub stream_model: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Unset means the request may hang for as long as the provider does.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            stream_model: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_max_tokens() -> u32 {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_max_files_chars")]
    pub max_files_chars: usize,
    /// Server-side replacement for the built-in instruction block.
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_files_chars: default_max_files_chars(),
            format: None,
        }
    }
}

fn default_max_files_chars() -> usize {
    crate::prompt::MAX_FILES_LENGTH
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            max_results: default_max_results(),
            timeout_secs: None,
        }
    }
}

fn default_search_url() -> String {
    "http://127.0.0.1:3000/api/search-file-chunks".to_string()
}
fn default_max_results() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_answer_url")]
    pub url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            url: default_answer_url(),
            timeout_secs: None,
        }
    }
}

fn default_answer_url() -> String {
    "http://127.0.0.1:7341/answer".to_string()
}

impl Config {
    /// All-defaults configuration for commands that can run without a file.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn stream_model(&self) -> &str {
        self.completion
            .stream_model
            .as_deref()
            .unwrap_or(&self.completion.model)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate completion
    if config.completion.max_tokens == 0 {
        anyhow::bail!("completion.max_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&config.completion.temperature) {
        anyhow::bail!("completion.temperature must be in [0.0, 2.0]");
    }
    if config.completion.base_url.trim().is_empty() {
        anyhow::bail!("completion.base_url must not be empty");
    }
    if config.completion.model.trim().is_empty() {
        anyhow::bail!("completion.model must not be empty");
    }

    // Validate prompt
    if config.prompt.max_files_chars == 0 {
        anyhow::bail!("prompt.max_files_chars must be > 0");
    }

    // Validate search
    if config.search.max_results == 0 {
        anyhow::bail!("search.max_results must be >= 1");
    }
    if config.search.url.trim().is_empty() {
        anyhow::bail!("search.url must not be empty");
    }

    if config.answer.url.trim().is_empty() {
        anyhow::bail!("answer.url must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert_eq!(cfg.completion.model, "gpt-3.5-turbo");
        assert_eq!(cfg.completion.max_tokens, 800);
        assert_eq!(cfg.completion.temperature, 0.0);
        assert!(cfg.completion.timeout_secs.is_none());
        assert_eq!(cfg.prompt.max_files_chars, 6000);
        assert_eq!(cfg.search.max_results, 10);
    }

    #[test]
    fn test_overrides() {
        let cfg = parse_config(
            r#"
[server]
bind = "0.0.0.0:9000"

[completion]
base_url = "http://localhost:8080/v1"
model = "gpt-4o-mini"
stream_model = "gpt-4o"
temperature = 0.3
max_tokens = 256
timeout_secs = 20

[search]
url = "http://search.local/api"
max_results = 4
"#,
        )
        .unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.completion.model, "gpt-4o-mini");
        assert_eq!(cfg.stream_model(), "gpt-4o");
        assert_eq!(cfg.completion.timeout_secs, Some(20));
        assert_eq!(cfg.search.max_results, 4);
    }

    #[test]
    fn test_stream_model_falls_back() {
        let cfg = Config::minimal();
        assert_eq!(cfg.stream_model(), "gpt-3.5-turbo");
    }

    #[test]
    fn test_rejects_zero_max_tokens() {
        let err = parse_config("[completion]\nmax_tokens = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn test_rejects_out_of_range_temperature() {
        assert!(parse_config("[completion]\ntemperature = 3.5\n").is_err());
    }

    #[test]
    fn test_rejects_zero_budget() {
        assert!(parse_config("[prompt]\nmax_files_chars = 0\n").is_err());
    }

    #[test]
    fn test_rejects_zero_max_results() {
        assert!(parse_config("[search]\nmax_results = 0\n").is_err());
    }
}
