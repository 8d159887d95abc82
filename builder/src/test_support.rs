//! Test-only doubles for the model and syntax validators.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::types::Message;
use crate::io::model::Model;
use crate::io::validators::{SyntaxValidator, Validation};

/// Model that replays a fixed list of completions and records every prompt.
///
/// Runs out with an error once the list is exhausted.
pub struct ScriptedModel {
    responses: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl Model for ScriptedModel {
    fn complete(&self, prompt: &[Message]) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_vec());
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model has no response left"))
    }
}

/// Model answering `"<prefix> <n>"` for its n-th call.
pub struct CountingModel {
    prefix: String,
    calls: Cell<usize>,
}

impl CountingModel {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Model for CountingModel {
    fn complete(&self, _prompt: &[Message]) -> Result<String> {
        let n = self.calls.get() + 1;
        self.calls.set(n);
        Ok(format!("{} {n}", self.prefix))
    }
}

#[derive(Debug, Clone)]
enum Fallback {
    Passthrough,
    Invalid(String),
}

/// Validator that replays scripted verdicts, then falls back to a fixed one.
pub struct ScriptedValidator {
    language: String,
    script: RefCell<VecDeque<Validation>>,
    fallback: Option<Fallback>,
    checked: RefCell<Vec<String>>,
}

impl ScriptedValidator {
    /// No verdicts and no fallback: every check errors until scripted.
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            script: RefCell::new(VecDeque::new()),
            fallback: None,
            checked: RefCell::new(Vec::new()),
        }
    }

    pub fn always_valid_passthrough(language: &str) -> Self {
        Self {
            fallback: Some(Fallback::Passthrough),
            ..Self::new(language)
        }
    }

    pub fn always_invalid(language: &str, detail: &str) -> Self {
        Self {
            fallback: Some(Fallback::Invalid(detail.to_string())),
            ..Self::new(language)
        }
    }

    pub fn then_valid(self, formatted: &str) -> Self {
        self.script.borrow_mut().push_back(Validation::Valid {
            formatted: formatted.to_string(),
        });
        self
    }

    pub fn then_invalid(self, detail: &str) -> Self {
        self.script.borrow_mut().push_back(Validation::Invalid {
            detail: detail.to_string(),
        });
        self
    }

    /// Texts submitted for checking, in call order.
    pub fn checked(&self) -> Vec<String> {
        self.checked.borrow().clone()
    }
}

impl SyntaxValidator for ScriptedValidator {
    fn language(&self) -> &str {
        &self.language
    }

    fn check_and_format(&self, code: &str) -> Result<Validation> {
        self.checked.borrow_mut().push(code.to_string());
        if let Some(verdict) = self.script.borrow_mut().pop_front() {
            return Ok(verdict);
        }
        match &self.fallback {
            Some(Fallback::Passthrough) => Ok(Validation::Valid {
                formatted: code.to_string(),
            }),
            Some(Fallback::Invalid(detail)) => Ok(Validation::Invalid {
                detail: detail.clone(),
            }),
            None => Err(anyhow!("scripted {} validator has no verdict left", self.language)),
        }
    }
}
