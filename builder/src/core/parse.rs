//! Decoding of structured model output.
//!
//! The model is asked (via format instructions) to answer with a JSON
//! document matching one of the bundled schemas. Responses are located inside
//! the text (a fenced block or the outermost braces), checked against the
//! schema, then deserialized.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::core::change::CodeChange;
use crate::core::project::{CodeSkeleton, ProjectDescription};

const PROJECT_DESCRIPTION_SCHEMA: &str =
    include_str!("../../schemas/project_description.schema.json");
const CODE_SKELETON_SCHEMA: &str = include_str!("../../schemas/code_skeleton.schema.json");
const CODE_CHANGE_SCHEMA: &str = include_str!("../../schemas/code_change.schema.json");

/// Structured output kinds the model can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    ProjectDescription,
    CodeSkeleton,
    CodeChange,
}

impl OutputKind {
    pub fn name(self) -> &'static str {
        match self {
            OutputKind::ProjectDescription => "project description",
            OutputKind::CodeSkeleton => "code skeleton",
            OutputKind::CodeChange => "code change",
        }
    }

    pub fn schema(self) -> &'static str {
        match self {
            OutputKind::ProjectDescription => PROJECT_DESCRIPTION_SCHEMA,
            OutputKind::CodeSkeleton => CODE_SKELETON_SCHEMA,
            OutputKind::CodeChange => CODE_CHANGE_SCHEMA,
        }
    }

    /// Instructions appended to the final prompt of a request.
    pub fn format_instructions(self) -> String {
        format!(
            "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\
             Answer with the JSON instance only, inside a ```json fenced block.\n\n\
             ```json\n{}\n```",
            self.schema().trim()
        )
    }
}

/// The model's response could not be decoded into the expected structure.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in {kind} response")]
    NoJson { kind: &'static str },
    #[error("{kind} response is not valid JSON: {source}")]
    Json {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} response does not match schema:\n- {}", .messages.join("\n- "))]
    Schema {
        kind: &'static str,
        messages: Vec<String>,
    },
    #[error("{kind} response has unexpected shape: {source}")]
    Shape {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub fn parse_project_description(text: &str) -> Result<ProjectDescription, ParseError> {
    parse_structured(OutputKind::ProjectDescription, text)
}

pub fn parse_code_skeleton(text: &str) -> Result<CodeSkeleton, ParseError> {
    parse_structured(OutputKind::CodeSkeleton, text)
}

pub fn parse_code_change(text: &str) -> Result<CodeChange, ParseError> {
    parse_structured(OutputKind::CodeChange, text)
}

fn parse_structured<T: DeserializeOwned>(kind: OutputKind, text: &str) -> Result<T, ParseError> {
    let raw = extract_json(text).ok_or(ParseError::NoJson { kind: kind.name() })?;
    let value: Value = serde_json::from_str(raw).map_err(|source| ParseError::Json {
        kind: kind.name(),
        source,
    })?;
    validate_schema(kind, &value)?;
    serde_json::from_value(value).map_err(|source| ParseError::Shape {
        kind: kind.name(),
        source,
    })
}

fn validate_schema(kind: OutputKind, instance: &Value) -> Result<(), ParseError> {
    let schema_error = |messages: Vec<String>| ParseError::Schema {
        kind: kind.name(),
        messages,
    };
    let schema: Value = serde_json::from_str(kind.schema())
        .map_err(|err| schema_error(vec![format!("bundled schema is invalid: {err}")]))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|err| schema_error(vec![format!("bundled schema is invalid: {err}")]))?;
    let messages: Vec<String> = validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(schema_error(messages));
    }
    Ok(())
}

/// Locate the JSON payload: the first fenced block, else the outermost braces.
fn extract_json(text: &str) -> Option<&str> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```(?:json)?[ \t]*\r?\n(.*?)```").expect("fence regex is valid")
    });

    if let Some(caps) = FENCE_RE.captures(text)
        && let Some(body) = caps.get(1)
    {
        let body = body.as_str().trim();
        if body.starts_with('{') {
            return Some(body);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change::EditOp;

    #[test]
    fn parses_fenced_code_change() {
        let text = "Here is the change:\n```json\n{\"files\":[{\"name\":\"a.py\",\"changes\":[{\"op_type\":\"Deletion\",\"line_number_start\":1,\"line_number_end\":2}]}]}\n```\nDone.";
        let change = parse_code_change(text).expect("parse");
        assert_eq!(
            change.files[0].changes,
            vec![EditOp::Deletion { start: 1, end: 2 }]
        );
    }

    #[test]
    fn parses_bare_json_surrounded_by_prose() {
        let text = "Sure! {\"files\": [{\"name\": \"a.py\", \"description\": \"app\"}]} Hope this helps.";
        let skeleton = parse_code_skeleton(text).expect("parse");
        assert_eq!(skeleton.files[0].name, "a.py");
        assert_eq!(skeleton.files[0].functions, None);
    }

    #[test]
    fn missing_json_is_reported() {
        let err = parse_code_change("I could not do it.").unwrap_err();
        assert!(matches!(err, ParseError::NoJson { .. }));
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = parse_code_change("{\"files\": [}").unwrap_err();
        assert!(matches!(err, ParseError::Json { .. }));
    }

    #[test]
    fn schema_violations_are_listed() {
        let err = parse_project_description("{\"user_goal\": \"g\", \"requirements\": []}")
            .unwrap_err();
        match err {
            ParseError::Schema { kind, messages } => {
                assert_eq!(kind, "project description");
                assert!(messages.iter().any(|m| m.contains("assumptions")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_op_type_is_rejected() {
        let text = r#"{"files":[{"name":"a.py","changes":[{"op_type":"Move","line_number_start":1}]}]}"#;
        assert!(matches!(
            parse_code_change(text).unwrap_err(),
            ParseError::Schema { .. }
        ));
    }

    #[test]
    fn format_instructions_embed_schema() {
        let text = OutputKind::CodeChange.format_instructions();
        assert!(text.contains("\"title\": \"CodeChange\""));
        assert!(text.contains("```json"));
    }
}
