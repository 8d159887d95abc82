//! Textual views of a codebase for prompts.

use crate::core::codebase::CodeBase;

/// Render every file in full, sorted by name, with 1-based line numbers.
///
/// The numbers are the coordinates the model must use for its edits.
pub fn summarize_codebase(code: &CodeBase) -> String {
    let mut files: Vec<_> = code.files().iter().collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    for file in files {
        out.push_str(&format!("{}:\n", file.name));
        for (idx, line) in file.lines.iter().enumerate() {
            out.push_str(&format!("{:<4}{}\n", idx + 1, line));
        }
        out.push('\n');
    }
    out
}
