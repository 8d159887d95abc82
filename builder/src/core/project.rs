//! Structured outputs of the planning phases (goal understanding and skeletons).

use serde::{Deserialize, Serialize};

use crate::core::codebase::CodeLine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assumption {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuestion {
    pub content: String,
}

/// The model's reading of the user goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescription {
    pub user_goal: String,
    pub requirements: Vec<Requirement>,
    pub assumptions: Vec<Assumption>,
    #[serde(default)]
    pub questions: Option<Vec<UserQuestion>>,
}

impl ProjectDescription {
    /// Render as plain text for later prompts.
    pub fn to_prompt_text(&self) -> String {
        let mut out = format!("The user's goal is {}\n\n", self.user_goal);

        out.push_str("Therefore, the requirements are:\n");
        for req in &self.requirements {
            out.push_str(&format!("- {}\n", req.content));
        }
        out.push('\n');

        out.push_str("In this, I have made the following assumptions:\n");
        for assumption in &self.assumptions {
            out.push_str(&format!("- {}\n", assumption.content));
        }
        out.push('\n');

        match self.questions.as_deref() {
            Some(questions) if !questions.is_empty() => {
                out.push_str("I have these questions to the user:\n");
                for q in questions {
                    out.push_str(&format!("- {}\n", q.content));
                }
                out.push('\n');
            }
            _ => out.push_str("I have no question to the user."),
        }

        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub signature: String,
}

/// One planned file: what it is for and which functions it will hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonFile {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub functions: Option<Vec<Function>>,
}

impl SkeletonFile {
    fn signatures(&self) -> impl Iterator<Item = &str> {
        self.functions
            .iter()
            .flatten()
            .map(|func| func.signature.as_str())
    }

    fn comment_prefix(&self) -> &'static str {
        if self.name.ends_with(".py") {
            "# "
        } else {
            "// "
        }
    }

    /// Lines of the generated stub: the description, then one signature per
    /// block, all commented out so the stub is valid source.
    pub(crate) fn initial_lines(&self) -> Vec<CodeLine> {
        let prefix = self.comment_prefix();
        let mut lines = vec![
            CodeLine::new(format!("{prefix}{}", self.description)),
            CodeLine::new(""),
        ];
        for signature in self.signatures() {
            lines.push(CodeLine::new(format!("{prefix}{signature}")));
            lines.push(CodeLine::new(""));
        }
        lines
    }
}

/// Function-signature-only plan of a codebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSkeleton {
    pub files: Vec<SkeletonFile>,
}

impl CodeSkeleton {
    /// Render as plain text, files sorted by name.
    pub fn to_prompt_text(&self) -> String {
        let mut files: Vec<&SkeletonFile> = self.files.iter().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = String::new();
        for file in files {
            out.push_str(&format!("{}:\n", file.name));
            let signatures: Vec<String> = file.signatures().map(|s| format!("   {s}")).collect();
            if signatures.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&signatures.join("\n\n"));
                out.push('\n');
            }
        }
        out
    }
}
