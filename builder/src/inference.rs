//! Reasoning protocol: one-shot or ideate → critique → resolve.
//!
//! Every model call goes through the [`ResponseCache`], so re-running a build
//! with the same prompts replays earlier completions without calling the
//! model. Each stage's raw output is written to the stage log when one is
//! configured.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::types::{InferenceStep, Message, Mode, Phase};
use crate::io::cache::ResponseCache;
use crate::io::model::Model;
use crate::io::prompt::{PromptLibrary, PromptVars};
use crate::io::stage_log::StageLog;

/// One question put to the model.
#[derive(Debug, Clone)]
pub struct Request {
    pub phase: Phase,
    pub mode: Mode,
    pub vars: PromptVars,
    /// Appended to the final prompt only.
    pub format_instructions: Option<String>,
    /// Attempt number, used to keep stage logs of retries apart.
    pub attempt: u32,
    /// Optional sub-directory of the run's stage log.
    pub log_scope: Option<String>,
}

impl Request {
    pub fn new(phase: Phase, mode: Mode, vars: PromptVars) -> Self {
        Self {
            phase,
            mode,
            vars,
            format_instructions: None,
            attempt: 0,
            log_scope: None,
        }
    }

    pub fn with_format_instructions(mut self, instructions: String) -> Self {
        self.format_instructions = Some(instructions);
        self
    }
}

/// Drives the model through the cache and the prompt library.
pub struct Inferer<M: Model> {
    model: M,
    cache: ResponseCache,
    prompts: PromptLibrary,
    stage_log: Option<StageLog>,
}

impl<M: Model> Inferer<M> {
    pub fn new(model: M, cache: ResponseCache, prompts: PromptLibrary) -> Self {
        Self {
            model,
            cache,
            prompts,
            stage_log: None,
        }
    }

    pub fn with_stage_log(mut self, stage_log: StageLog) -> Self {
        self.stage_log = Some(stage_log);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Answer `request`, returning the final stage's raw output.
    #[instrument(skip_all, fields(phase = request.phase.template_name(), mode = ?request.mode, attempt = request.attempt))]
    pub fn respond(&mut self, request: &Request) -> Result<String> {
        info!("inference started");
        let response = match request.mode {
            Mode::Simple => {
                let vars = with_format_instructions(request.vars.clone(), request);
                self.run_stage(request, InferenceStep::Resolve, &vars)?
            }
            Mode::ThreeStage => {
                let mut vars = request.vars.clone();
                let initial = self.run_stage(request, InferenceStep::Ideate, &vars)?;

                vars.insert("initial_response".to_string(), initial);
                let critique = self.run_stage(request, InferenceStep::Critique, &vars)?;

                vars.insert("critique".to_string(), critique);
                let vars = with_format_instructions(vars, request);
                self.run_stage(request, InferenceStep::Resolve, &vars)?
            }
        };
        Ok(response)
    }

    fn run_stage(
        &mut self,
        request: &Request,
        step: InferenceStep,
        vars: &PromptVars,
    ) -> Result<String> {
        let prompt: Vec<Message> = self.prompts.build(request.phase, step, vars)?;
        let output = self.cache.get(&self.model, &prompt).with_context(|| {
            format!(
                "{} step of {} phase",
                step.template_name(),
                request.phase.template_name()
            )
        })?;
        debug!(step = step.template_name(), bytes = output.len(), "stage finished");

        if let Some(log) = &self.stage_log {
            log.write(
                request.log_scope.as_deref(),
                request.phase,
                step,
                request.attempt,
                &output,
            )?;
        }
        Ok(output)
    }
}

fn with_format_instructions(mut vars: PromptVars, request: &Request) -> PromptVars {
    if let Some(instructions) = &request.format_instructions {
        vars.insert("format_instructions".to_string(), instructions.clone());
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingModel, ScriptedModel};
    use std::fs;

    fn vars() -> PromptVars {
        let mut vars = PromptVars::new();
        vars.insert("goal".to_string(), "a calculator".to_string());
        vars
    }

    fn inferer<M: Model>(model: M, dir: &std::path::Path) -> Inferer<M> {
        let cache = ResponseCache::open(&dir.join("cache.json")).expect("cache");
        Inferer::new(model, cache, PromptLibrary::new().expect("prompts"))
    }

    #[test]
    fn three_stage_feeds_each_output_forward() {
        let temp = tempfile::tempdir().expect("tempdir");
        let model = ScriptedModel::new(["IDEA", "CRITIQUE", "FINAL"]);
        let mut inferer = inferer(model, temp.path());

        let request = Request::new(Phase::Understand, Mode::ThreeStage, vars())
            .with_format_instructions("USE JSON".to_string());
        let answer = inferer.respond(&request).expect("respond");

        assert_eq!(answer, "FINAL");
        let prompts = inferer.model().prompts();
        assert_eq!(prompts.len(), 3);
        assert!(!prompts[0][1].content.contains("USE JSON"));
        assert!(prompts[1][1].content.contains("IDEA"));
        assert!(!prompts[1][1].content.contains("USE JSON"));
        assert!(prompts[2][1].content.contains("IDEA"));
        assert!(prompts[2][1].content.contains("CRITIQUE"));
        assert!(prompts[2][1].content.contains("USE JSON"));
    }

    #[test]
    fn simple_mode_makes_one_call_with_instructions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut inferer = inferer(ScriptedModel::new(["ONLY"]), temp.path());

        let request = Request::new(Phase::Understand, Mode::Simple, vars())
            .with_format_instructions("USE JSON".to_string());
        assert_eq!(inferer.respond(&request).expect("respond"), "ONLY");
        let prompts = inferer.model().prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0][1].content.contains("USE JSON"));
    }

    #[test]
    fn repeated_request_is_served_from_cache() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut inferer = inferer(CountingModel::new("out"), temp.path());
        let request = Request::new(Phase::Understand, Mode::ThreeStage, vars());

        let first = inferer.respond(&request).expect("first");
        let second = inferer.respond(&request).expect("second");
        assert_eq!(first, second);
        assert_eq!(inferer.model().calls(), 3);
        assert_eq!(inferer.cache().len(), 3);
    }

    #[test]
    fn stage_outputs_are_logged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = StageLog::new(&temp.path().join("logs"), 7);
        let mut inferer =
            inferer(ScriptedModel::new(["A", "B", "C"]), temp.path()).with_stage_log(log);

        let mut request = Request::new(Phase::Understand, Mode::ThreeStage, vars());
        request.log_scope = Some("scope".to_string());
        request.attempt = 2;
        inferer.respond(&request).expect("respond");

        let dir = temp.path().join("logs").join("run_7").join("scope");
        let read = |name: &str| fs::read_to_string(dir.join(name)).expect(name);
        assert_eq!(read("1_understand__a_ideation__attempt_2.txt"), "A");
        assert_eq!(read("1_understand__b_critique__attempt_2.txt"), "B");
        assert_eq!(read("1_understand__c_resolution__attempt_2.txt"), "C");
    }

    #[test]
    fn model_failure_propagates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut inferer = inferer(ScriptedModel::new(Vec::<String>::new()), temp.path());
        let request = Request::new(Phase::Understand, Mode::Simple, vars());
        assert!(inferer.respond(&request).is_err());
        assert!(inferer.cache().is_empty());
    }
}
