//! Builder configuration stored in `builder.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::model::CommandModel;

/// Builder configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuilderConfig {
    /// Proposals allowed per requirement before the run gives up.
    pub max_attempts: u32,
    pub model: ModelConfig,
    pub paths: PathsConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Command that reads a JSON message array on stdin and prints a completion.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub cache_file: PathBuf,
    /// Root of the per-run stage logs.
    pub log_dir: PathBuf,
    /// Root of the per-run generated code.
    pub output_dir: PathBuf,
    pub runs_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Extensions that are never validated.
    pub ignore: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Registered languages keyed by file extension.
    pub languages: BTreeMap<String, LanguageConfig>,
}

/// A validated language. Without a command, files pass through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageConfig {
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm-complete".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from("cache/cache.json"),
            log_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("output"),
            runs_file: PathBuf::from("runs.json"),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let passthrough = |language: &str| LanguageConfig {
            language: language.to_string(),
            command: None,
        };
        let mut languages = BTreeMap::new();
        languages.insert(
            "py".to_string(),
            LanguageConfig {
                language: "Python".to_string(),
                command: Some(vec!["black".to_string(), "-q".to_string(), "-".to_string()]),
            },
        );
        languages.insert("js".to_string(), passthrough("JavaScript"));
        languages.insert("html".to_string(), passthrough("HTML"));
        languages.insert("css".to_string(), passthrough("CSS"));
        languages.insert("vue".to_string(), passthrough("Vue"));

        Self {
            ignore: ["env", "replit", "json", "jsx"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            timeout_secs: 60,
            output_limit_bytes: 100_000,
            languages,
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            model: ModelConfig::default(),
            paths: PathsConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl BuilderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        if self.model.output_limit_bytes == 0 {
            return Err(anyhow!("model.output_limit_bytes must be > 0"));
        }
        if self.model.command.is_empty() || self.model.command[0].trim().is_empty() {
            return Err(anyhow!("model.command must be a non-empty array"));
        }
        if self.validation.timeout_secs == 0 {
            return Err(anyhow!("validation.timeout_secs must be > 0"));
        }
        if self.validation.output_limit_bytes == 0 {
            return Err(anyhow!("validation.output_limit_bytes must be > 0"));
        }
        for (ext, lang) in &self.validation.languages {
            if let Some(command) = &lang.command
                && (command.is_empty() || command[0].trim().is_empty())
            {
                return Err(anyhow!(
                    "validation.languages.{ext}.command must be a non-empty array"
                ));
            }
            if self.validation.ignore.contains(ext) {
                return Err(anyhow!(
                    "extension {ext} is both ignored and registered for validation"
                ));
            }
        }
        Ok(())
    }

    pub fn model(&self) -> CommandModel {
        CommandModel {
            command: self.model.command.clone(),
            timeout: Duration::from_secs(self.model.timeout_secs),
            output_limit_bytes: self.model.output_limit_bytes,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BuilderConfig::default()`.
pub fn load_config(path: &Path) -> Result<BuilderConfig> {
    if !path.exists() {
        let cfg = BuilderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BuilderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BuilderConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write the default config to `path` unless it already exists.
///
/// Returns whether a file was written; `force` overwrites an existing file.
pub fn init_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    write_config(path, &BuilderConfig::default())?;
    Ok(true)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
