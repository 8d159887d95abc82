//! Line-indexed merge of a [`CodeChange`] into a [`CodeBase`].
//!
//! Every edit position refers to the file as it was before the change-set.
//! Edits for one file are therefore applied from the bottom up (descending
//! start line): an edit can only shift lines below its own position, and all
//! of those have already been handled. Overlapping ranges are a caller error.
//!
//! Changes that name a file absent from the codebase are dropped with a
//! warning; no file is created.

use thiserror::Error;
use tracing::{debug, warn};

use crate::core::change::{CodeChange, EditOp};
use crate::core::codebase::{CodeBase, CodeFile, CodeLine};

/// An edit addressed lines outside the file it targets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid line range {start}..={end} for '{file}' ({len} lines)")]
pub struct RangeError {
    pub file: String,
    pub start: usize,
    pub end: usize,
    pub len: usize,
}

/// Apply `change` to `base`, returning the successor snapshot.
///
/// `base` is never modified. On error no snapshot is produced.
pub fn apply_change(base: &CodeBase, change: &CodeChange) -> Result<CodeBase, RangeError> {
    let mut next = base.clone();
    for file_change in &change.files {
        let Some(file) = next.file_mut(&file_change.name) else {
            warn!(file = %file_change.name, "dropping change for unknown file");
            continue;
        };
        for op in file_change.ordered_ops() {
            apply_op(file, op)?;
        }
        debug!(
            file = %file_change.name,
            ops = file_change.changes.len(),
            lines = file.lines.len(),
            "applied file change"
        );
    }
    Ok(next)
}

fn apply_op(file: &mut CodeFile, op: &EditOp) -> Result<(), RangeError> {
    match op {
        EditOp::Insertion { start, new_lines } => insert_after(file, *start, new_lines),
        EditOp::Deletion { start, end } => delete_range(file, *start, *end),
        EditOp::Replacement {
            start,
            end,
            new_lines,
        } => {
            delete_range(file, *start, *end)?;
            insert_after(file, start - 1, new_lines)
        }
    }
}

/// Insert so the first new line lands at 1-based position `after + 1`.
fn insert_after(file: &mut CodeFile, after: usize, new_lines: &[String]) -> Result<(), RangeError> {
    let len = file.lines.len();
    if after > len {
        return Err(RangeError {
            file: file.name.clone(),
            start: after,
            end: after,
            len,
        });
    }
    if new_lines.is_empty() {
        return Ok(());
    }
    file.lines.splice(
        after..after,
        new_lines.iter().map(|line| CodeLine::new(line.as_str())),
    );
    Ok(())
}

fn delete_range(file: &mut CodeFile, start: usize, end: usize) -> Result<(), RangeError> {
    let len = file.lines.len();
    if start < 1 || end < start || end > len {
        return Err(RangeError {
            file: file.name.clone(),
            start,
            end,
            len,
        });
    }
    file.lines.drain(start - 1..end);
    Ok(())
}
