//! Prompt library: renders `[system, user]` message pairs per phase and step.
//!
//! The user message is a step template (ideate, critique, resolve) wrapped
//! around the phase task template. Both render from the same variables; the
//! rendered task is exposed to the step template as `task`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use tracing::debug;

use crate::core::types::{InferenceStep, Message, Phase};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

const PHASE_TEMPLATES: [(&str, &str); 5] = [
    ("understand", include_str!("prompts/understand.md")),
    ("architecture", include_str!("prompts/architecture.md")),
    ("structure_code", include_str!("prompts/structure_code.md")),
    ("structure_tests", include_str!("prompts/structure_tests.md")),
    ("write_code", include_str!("prompts/write_code.md")),
];

const STEP_TEMPLATES: [(&str, &str); 3] = [
    ("ideate", include_str!("prompts/ideate.md")),
    ("critique", include_str!("prompts/critique.md")),
    ("resolve", include_str!("prompts/resolve.md")),
];

/// Template variables, keyed by name.
pub type PromptVars = BTreeMap<String, String>;

/// Compiled prompt templates.
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for &(name, source) in PHASE_TEMPLATES.iter().chain(STEP_TEMPLATES.iter()) {
            env.add_template(name, source)
                .with_context(|| format!("compile prompt template {name}"))?;
        }
        Ok(Self { env })
    }

    /// Build the messages for `phase` at `step`.
    ///
    /// A variable referenced by a template but absent from `vars` is an error,
    /// except the optional blocks guarded with `is defined`.
    pub fn build(
        &self,
        phase: Phase,
        step: InferenceStep,
        vars: &PromptVars,
    ) -> Result<Vec<Message>> {
        let task = self
            .env
            .get_template(phase.template_name())?
            .render(vars)
            .with_context(|| format!("render {} prompt", phase.template_name()))?;

        let mut step_vars = vars.clone();
        step_vars.insert("task".to_string(), task.trim().to_string());
        let user = self
            .env
            .get_template(step.template_name())?
            .render(&step_vars)
            .with_context(|| {
                format!(
                    "render {} step of {} prompt",
                    step.template_name(),
                    phase.template_name()
                )
            })?;

        debug!(
            phase = phase.template_name(),
            step = step.template_name(),
            bytes = user.len(),
            "prompt built"
        );
        Ok(vec![
            Message::system(SYSTEM_TEMPLATE.trim()),
            Message::user(user),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;

    fn vars(pairs: &[(&str, &str)]) -> PromptVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn every_phase_and_step_compiles() {
        let library = PromptLibrary::new().expect("library");
        let all = vars(&[
            ("goal", "g"),
            ("project_description", "pd"),
            ("architecture", "arch"),
            ("code_skeleton", "skel"),
            ("code_base", "cb"),
            ("requirement", "req"),
            ("initial_response", "init"),
            ("critique", "crit"),
        ]);
        for phase in [
            Phase::Understand,
            Phase::Architecture,
            Phase::StructureCode,
            Phase::StructureTests,
            Phase::WriteCode,
        ] {
            for step in [
                InferenceStep::Ideate,
                InferenceStep::Critique,
                InferenceStep::Resolve,
            ] {
                let messages = library.build(phase, step, &all).expect("build");
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].role, Role::System);
                assert_eq!(messages[1].role, Role::User);
            }
        }
    }

    #[test]
    fn step_wraps_phase_task() {
        let library = PromptLibrary::new().expect("library");
        let messages = library
            .build(
                Phase::Understand,
                InferenceStep::Critique,
                &vars(&[("goal", "a todo app"), ("initial_response", "FIRST")]),
            )
            .expect("build");
        let user = &messages[1].content;
        assert!(user.contains("a todo app"));
        assert!(user.contains("FIRST"));
        assert!(user.find("a todo app") < user.find("FIRST"));
    }

    #[test]
    fn missing_variable_is_an_error() {
        let library = PromptLibrary::new().expect("library");
        let err = library
            .build(Phase::Architecture, InferenceStep::Ideate, &vars(&[("goal", "g")]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("architecture"));
    }

    #[test]
    fn optional_blocks_render_only_when_present() {
        let library = PromptLibrary::new().expect("library");
        let base = vars(&[("goal", "g"), ("code_base", "cb"), ("requirement", "req")]);

        let plain = library
            .build(Phase::WriteCode, InferenceStep::Resolve, &base)
            .expect("build");
        assert!(!plain[1].content.contains("rejected"));
        assert!(!plain[1].content.contains("critique"));

        let mut retry = base.clone();
        retry.insert("errors".to_string(), "> app.py:\nbad indent".to_string());
        retry.insert("format_instructions".to_string(), "ANSWER IN JSON".to_string());
        let with_errors = library
            .build(Phase::WriteCode, InferenceStep::Resolve, &retry)
            .expect("build");
        assert!(with_errors[1].content.contains("bad indent"));
        assert!(with_errors[1].content.ends_with("ANSWER IN JSON"));
    }

    #[test]
    fn same_inputs_render_identically() {
        let library = PromptLibrary::new().expect("library");
        let v = vars(&[("goal", "g")]);
        let a = library
            .build(Phase::Understand, InferenceStep::Ideate, &v)
            .expect("a");
        let b = library
            .build(Phase::Understand, InferenceStep::Ideate, &v)
            .expect("b");
        assert_eq!(a, b);
    }
}
