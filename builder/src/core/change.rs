//! Structured change-sets proposed by the model.
//!
//! Line numbers are 1-based and always refer to the file as it was before the
//! change-set is applied. See [`crate::core::patch`] for the merge rules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One line-range edit scoped to a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op_type")]
pub enum EditOp {
    /// Insert `new_lines` so the first new line becomes line `start + 1`.
    Insertion {
        #[serde(rename = "line_number_start")]
        start: usize,
        new_lines: Vec<String>,
    },
    /// Remove lines `start..=end`.
    Deletion {
        #[serde(rename = "line_number_start")]
        start: usize,
        #[serde(rename = "line_number_end")]
        end: usize,
    },
    /// Remove lines `start..=end`, then insert `new_lines` at `start`.
    #[serde(alias = "Update")]
    Replacement {
        #[serde(rename = "line_number_start")]
        start: usize,
        #[serde(rename = "line_number_end")]
        end: usize,
        new_lines: Vec<String>,
    },
}

impl EditOp {
    pub fn start(&self) -> usize {
        match self {
            EditOp::Insertion { start, .. }
            | EditOp::Deletion { start, .. }
            | EditOp::Replacement { start, .. } => *start,
        }
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOp::Insertion { start, new_lines } => {
                write!(f, "Insertion at {}:\n{}", start, new_lines.join("\n"))
            }
            EditOp::Deletion { start, end } => write!(f, "Deletion from {} to {}", start, end),
            EditOp::Replacement {
                start,
                end,
                new_lines,
            } => write!(
                f,
                "Replace from {} to {}:\n{}",
                start,
                end,
                new_lines.join("\n")
            ),
        }
    }
}

/// All edits proposed for one file. Order of `changes` carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub name: String,
    pub changes: Vec<EditOp>,
}

impl FileChange {
    /// Edits in application order: descending start line, ties in input order.
    pub fn ordered_ops(&self) -> Vec<&EditOp> {
        let mut ops: Vec<&EditOp> = self.changes.iter().collect();
        ops.sort_by(|a, b| b.start().cmp(&a.start()));
        ops
    }
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ops: Vec<&EditOp> = self.changes.iter().collect();
        ops.sort_by_key(|op| op.start());
        let rendered: Vec<String> = ops.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("\n\n"))
    }
}

/// A change-set derived from one model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    pub files: Vec<FileChange>,
}

impl CodeChange {
    pub fn is_empty(&self) -> bool {
        self.files.iter().all(|file| file.changes.is_empty())
    }
}

impl fmt::Display for CodeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, file) in self.files.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "> {}:", file.name)?;
            writeln!(f, "{}", file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_ops_descend_and_keep_input_order_on_ties() {
        let change = FileChange {
            name: "a.py".to_string(),
            changes: vec![
                EditOp::Insertion {
                    start: 1,
                    new_lines: vec!["x".to_string()],
                },
                EditOp::Deletion { start: 4, end: 4 },
                EditOp::Insertion {
                    start: 4,
                    new_lines: vec!["y".to_string()],
                },
            ],
        };

        let ordered = change.ordered_ops();
        assert_eq!(ordered[0], &EditOp::Deletion { start: 4, end: 4 });
        assert!(matches!(ordered[1], EditOp::Insertion { start: 4, .. }));
        assert!(matches!(ordered[2], EditOp::Insertion { start: 1, .. }));
    }

    #[test]
    fn deserializes_tagged_ops_and_update_alias() {
        let raw = r#"{
            "files": [{
                "name": "main.py",
                "changes": [
                    {"op_type": "Insertion", "line_number_start": 0, "new_lines": ["import os"]},
                    {"op_type": "Deletion", "line_number_start": 3, "line_number_end": 4},
                    {"op_type": "Update", "line_number_start": 7, "line_number_end": 7, "new_lines": ["pass"]}
                ]
            }]
        }"#;

        let change: CodeChange = serde_json::from_str(raw).expect("parse change");
        let ops = &change.files[0].changes;
        assert_eq!(
            ops[0],
            EditOp::Insertion {
                start: 0,
                new_lines: vec!["import os".to_string()]
            }
        );
        assert_eq!(ops[1], EditOp::Deletion { start: 3, end: 4 });
        assert_eq!(
            ops[2],
            EditOp::Replacement {
                start: 7,
                end: 7,
                new_lines: vec!["pass".to_string()]
            }
        );
    }

    #[test]
    fn display_lists_ops_in_ascending_order() {
        let change = CodeChange {
            files: vec![FileChange {
                name: "a.py".to_string(),
                changes: vec![
                    EditOp::Deletion { start: 5, end: 6 },
                    EditOp::Insertion {
                        start: 1,
                        new_lines: vec!["import sys".to_string()],
                    },
                ],
            }],
        };

        let rendered = change.to_string();
        assert!(rendered.starts_with("> a.py:\nInsertion at 1:\nimport sys"));
        assert!(rendered.contains("Deletion from 5 to 6"));
    }

    #[test]
    fn change_without_ops_is_empty() {
        let change = CodeChange {
            files: vec![
                FileChange {
                    name: "a.py".to_string(),
                    changes: Vec::new(),
                },
                FileChange {
                    name: "a.py".to_string(),
                    changes: Vec::new(),
                },
            ],
        };
        assert!(change.is_empty());
    }
}
