//! Source attribution for answers.
//!
//! A file counts as a source when its name occurs anywhere in the answer
//! text. This is a plain substring scan, not citation parsing: a name that
//! is embedded in a longer word (`report.pdf` inside `prereport.pdf`) still
//! matches.

use crate::models::FileLite;

/// Whether `file_name` occurs in `text`. Empty names never match.
pub fn is_file_name_in_string(file_name: &str, text: &str) -> bool {
    !file_name.is_empty() && text.contains(file_name)
}

/// Files mentioned in `answer`, in upload order.
pub fn cited_files<'a>(files: &'a [FileLite], answer: &str) -> Vec<&'a FileLite> {
    files
        .iter()
        .filter(|f| is_file_name_in_string(&f.name, answer))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(files: &[&FileLite]) -> Vec<String> {
        files.iter().map(|f| f.name.clone()).collect()
    }

    fn uploads() -> Vec<FileLite> {
        vec![FileLite::named("report.pdf"), FileLite::named("notes.txt")]
    }

    #[test]
    fn test_only_mentioned_files_listed() {
        let files = uploads();
        let answer = "Revenue grew 12%, as stated in report.pdf.";
        assert_eq!(names(&cited_files(&files, answer)), vec!["report.pdf"]);
    }

    #[test]
    fn test_substring_false_positive_is_kept() {
        let files = uploads();
        let answer = "See prereport.pdf for details.";
        assert_eq!(names(&cited_files(&files, answer)), vec!["report.pdf"]);
    }

    #[test]
    fn test_no_mentions() {
        let files = uploads();
        assert!(cited_files(&files, "I couldn't find the answer to that question in your files.").is_empty());
    }

    #[test]
    fn test_upload_order_preserved() {
        let files = uploads();
        let answer = "notes.txt agrees with report.pdf";
        assert_eq!(
            names(&cited_files(&files, answer)),
            vec!["report.pdf", "notes.txt"]
        );
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!is_file_name_in_string("Report.pdf", "see report.pdf"));
    }

    #[test]
    fn test_empty_name_never_matches() {
        assert!(!is_file_name_in_string("", "anything"));
    }
}
