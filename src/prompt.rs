//! Prompt construction.
//!
//! Renders retrieved [`FileChunk`]s into a single delimited "files" block,
//! caps that block at a fixed character budget, and interpolates it into a
//! template together with the user's question.
//!
//! ```text
//! <template>Question: <question>
//!
//! Files:
//! ###
//! "<filename 1>"
//! <text 1>
//! ###
//! "<filename 2>"
//! <text 2>
//!
//! Answer:
//! ```
//!
//! The cap is a crude token budget (2000 tokens × 3 chars/token), not a
//! tokenizer. Truncation ignores chunk boundaries.

use crate::models::FileChunk;

/// Approximate chars-per-token ratio used for the files budget.
const CHARS_PER_TOKEN: usize = 3;

/// Token budget reserved for the files block.
const FILES_TOKEN_BUDGET: usize = 2000;

/// Maximum length of the files block, in characters.
pub const MAX_FILES_LENGTH: usize = FILES_TOKEN_BUDGET * CHARS_PER_TOKEN;

/// Instruction block used when the caller supplies no prompt format.
pub const DEFAULT_PROMPT_FORMAT: &str = concat!(
    "Given a question, try to answer it using the content of the file extracts below, ",
    "and if you cannot answer, or find a relevant file, just output ",
    "\"I couldn't find the answer to that question in your files.\".\n\n",
    "If the answer is not contained in the files or if there are no file extracts, ",
    "respond with \"I couldn't find the answer to that question in your files.\" ",
    "If the question is not actually a question, respond with \"That's not a valid question.\"\n\n",
    "In the cases where you can find the answer, first give the answer. ",
    "Then explain how you found the answer from the source or sources, ",
    "and use the exact filenames of the source files you mention. ",
    "Do not make up the names of any other files other than those mentioned in the files context. ",
    "Give the answer in markdown format.",
    "Use the following format:\n\n",
    "Question: <question>\n\n",
    "Files:\n<###\n\"filename 1\"\nfile text>\n<###\n\"filename 2\"\nfile text>...\n\n",
    "Answer: <answer or \"I couldn't find the answer to that question in your files\" ",
    "or \"That's not a valid question.\">\n\n",
);

/// Builds prompts with a fixed files budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_files_chars: usize,
    default_format: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            max_files_chars: MAX_FILES_LENGTH,
            default_format: DEFAULT_PROMPT_FORMAT.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new(max_files_chars: usize, default_format: Option<String>) -> Self {
        Self {
            max_files_chars,
            default_format: default_format.unwrap_or_else(|| DEFAULT_PROMPT_FORMAT.to_string()),
        }
    }

    /// Render chunks into the delimited files block, truncated to budget.
    pub fn files_block(&self, chunks: &[FileChunk]) -> String {
        let joined = chunks
            .iter()
            .map(|c| format!("###\n\"{}\"\n{}", c.filename, c.text))
            .collect::<Vec<_>>()
            .join("\n");
        truncate_chars(&joined, self.max_files_chars).to_string()
    }

    /// Assemble the full prompt.
    ///
    /// `format` replaces the default instruction block as-is, so an empty
    /// string yields a prompt with no instructions. `None` uses the default.
    pub fn build(&self, question: &str, chunks: &[FileChunk], format: Option<&str>) -> String {
        let files = self.files_block(chunks);
        tracing::debug!(chars = files.chars().count(), "rendered files block");

        let template = format.unwrap_or(self.default_format.as_str());

        format!(
            "{}Question: {}\n\nFiles:\n{}\n\nAnswer:",
            template, question, files
        )
    }
}

/// Cut `s` to at most `max` characters without splitting a code point.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PromptBuilder {
        PromptBuilder::default()
    }

    fn files_section(prompt: &str) -> &str {
        let start = prompt.rfind("\n\nFiles:\n").unwrap() + "\n\nFiles:\n".len();
        let end = prompt.rfind("\n\nAnswer:").unwrap();
        &prompt[start..end]
    }

    #[test]
    fn test_max_files_length_is_6000() {
        assert_eq!(MAX_FILES_LENGTH, 6000);
    }

    #[test]
    fn test_single_chunk_rendering() {
        let block = builder().files_block(&[FileChunk::new("a.txt", "hello")]);
        assert_eq!(block, "###\n\"a.txt\"\nhello");
    }

    #[test]
    fn test_chunks_joined_with_newline() {
        let block = builder().files_block(&[
            FileChunk::new("a.txt", "one"),
            FileChunk::new("b.txt", "two"),
        ]);
        assert_eq!(block, "###\n\"a.txt\"\none\n###\n\"b.txt\"\ntwo");
    }

    #[test]
    fn test_full_prompt_layout() {
        let prompt = builder().build(
            "What is up?",
            &[FileChunk::new("a.txt", "sky")],
            Some("FORMAT\n"),
        );
        assert_eq!(
            prompt,
            "FORMAT\nQuestion: What is up?\n\nFiles:\n###\n\"a.txt\"\nsky\n\nAnswer:"
        );
    }

    #[test]
    fn test_default_format_used_when_missing() {
        let chunks = [FileChunk::new("a.txt", "x")];
        let prompt = builder().build("q?", &chunks, None);
        assert!(prompt.starts_with(DEFAULT_PROMPT_FORMAT));
    }

    #[test]
    fn test_empty_format_means_no_instructions() {
        let prompt = builder().build("q", &[], Some(""));
        assert!(!prompt.starts_with(DEFAULT_PROMPT_FORMAT));
        assert_eq!(prompt, "Question: q\n\nFiles:\n\n\nAnswer:");
    }

    #[test]
    fn test_zero_chunks_still_builds() {
        let prompt = builder().build("Anything?", &[], None);
        assert!(prompt.contains("Question: Anything?"));
        assert!(prompt.ends_with("Files:\n\n\nAnswer:"));
        assert!(prompt.contains("if there are no file extracts"));
    }

    #[test]
    fn test_files_block_never_exceeds_cap() {
        let big = "x".repeat(2500);
        let chunks: Vec<FileChunk> = (0..10)
            .map(|i| FileChunk::new(format!("file{}.txt", i), big.clone()))
            .collect();
        let prompt = builder().build("q?", &chunks, None);
        assert_eq!(files_section(&prompt).chars().count(), MAX_FILES_LENGTH);
    }

    #[test]
    fn test_cap_respected_for_custom_budget() {
        let b = PromptBuilder::new(10, None);
        let block = b.files_block(&[FileChunk::new("long-name.txt", "body text")]);
        assert_eq!(block, "###\n\"long-");
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let b = PromptBuilder::new(14, None);
        let block = b.files_block(&[FileChunk::new("é.txt", "ééééééé")]);
        assert_eq!(block.chars().count(), 14);
        assert!(block.ends_with('é'));
    }

    #[test]
    fn test_chunk_order_preserved() {
        let chunks: Vec<FileChunk> = ["zeta.md", "alpha.md", "mid.md", "beta.md"]
            .iter()
            .map(|n| FileChunk::new(*n, "content"))
            .collect();
        let block = builder().files_block(&chunks);
        let positions: Vec<usize> = chunks
            .iter()
            .map(|c| block.find(&format!("\"{}\"", c.filename)).unwrap())
            .collect();
        for w in positions.windows(2) {
            assert!(w[0] < w[1], "chunks reordered: {:?}", positions);
        }
    }

    #[test]
    fn test_deterministic() {
        let chunks = vec![
            FileChunk::new("a.md", "Alpha"),
            FileChunk::new("b.md", "Beta"),
        ];
        let p1 = builder().build("Why?", &chunks, None);
        let p2 = builder().build("Why?", &chunks, None);
        assert_eq!(p1, p2);
    }
}
