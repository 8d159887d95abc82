//! Persistent prompt → completion cache.
//!
//! Entries are filed under the SHA-256 of the serialized prompt and keep the
//! full prompt next to the response; a hit requires the stored prompt to be
//! structurally equal to the requested one. The whole store is rewritten
//! (temp file + rename) after every insertion.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::core::types::Message;
use crate::io::model::Model;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CacheEntry {
    prompt: Vec<Message>,
    response: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: BTreeMap<String, CacheEntry>,
}

/// Hex SHA-256 of the prompt's canonical JSON form.
pub fn prompt_hash(prompt: &[Message]) -> Result<String> {
    let json = serde_json::to_vec(prompt).context("serialize prompt for hashing")?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(hex::encode(hasher.finalize()))
}

/// File-backed memo of model completions.
#[derive(Debug)]
pub struct ResponseCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl ResponseCache {
    /// Open the cache at `path`, loading it whole if present.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read cache {}", path.display()))?;
            let file: CacheFile = serde_json::from_str(&contents)
                .with_context(|| format!("parse cache {}", path.display()))?;
            file.entries
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "cache opened");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored response for `prompt`, if any.
    pub fn lookup(&self, prompt: &[Message]) -> Result<Option<&str>> {
        let key = prompt_hash(prompt)?;
        Ok(self
            .entries
            .get(&key)
            .filter(|entry| entry.prompt == prompt)
            .map(|entry| entry.response.as_str()))
    }

    /// Return the cached response, or ask `model` once and remember the answer.
    #[instrument(skip_all, fields(messages = prompt.len()))]
    pub fn get<M: Model + ?Sized>(&mut self, model: &M, prompt: &[Message]) -> Result<String> {
        if let Some(hit) = self.lookup(prompt)? {
            debug!("cache hit");
            return Ok(hit.to_string());
        }
        debug!("cache miss");
        let response = model.complete(prompt)?;
        self.insert(prompt, &response)?;
        Ok(response)
    }

    /// Store (or override) the response for `prompt` and persist.
    pub fn insert(&mut self, prompt: &[Message], response: &str) -> Result<()> {
        let key = prompt_hash(prompt)?;
        self.entries.insert(
            key,
            CacheEntry {
                prompt: prompt.to_vec(),
                response: response.to_string(),
            },
        );
        self.persist()
    }

    /// Drop every entry and remove the backing file.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("remove cache {}", self.path.display()))?;
        }
        info!(path = %self.path.display(), "cache cleared");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let file = CacheFile {
            entries: self.entries.clone(),
        };
        let mut buf = serde_json::to_string_pretty(&file).context("serialize cache")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("cache path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp cache {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace cache {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingModel;

    fn prompt(text: &str) -> Vec<Message> {
        vec![Message::system("You are a coder."), Message::user(text)]
    }

    #[test]
    fn repeated_prompt_calls_model_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cache = ResponseCache::open(&temp.path().join("cache.json")).expect("open");
        let model = CountingModel::new("answer");

        let first = cache.get(&model, &prompt("hello")).expect("first");
        let second = cache.get(&model, &prompt("hello")).expect("second");

        assert_eq!(first, "answer 1");
        assert_eq!(second, first);
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn distinct_prompts_are_distinct_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cache = ResponseCache::open(&temp.path().join("cache.json")).expect("open");
        let model = CountingModel::new("answer");

        cache.get(&model, &prompt("a")).expect("a");
        cache.get(&model, &prompt("b")).expect("b");
        // Same contents, different role order.
        cache
            .get(&model, &[Message::user("You are a coder."), Message::system("a")])
            .expect("swapped");

        assert_eq!(model.calls(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn entries_survive_reopen() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("cache.json");
        let model = CountingModel::new("answer");
        {
            let mut cache = ResponseCache::open(&path).expect("open");
            cache.get(&model, &prompt("hello")).expect("get");
        }

        let mut reopened = ResponseCache::open(&path).expect("reopen");
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            reopened.get(&model, &prompt("hello")).expect("get"),
            "answer 1"
        );
        assert_eq!(model.calls(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn insert_overrides_response() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cache = ResponseCache::open(&temp.path().join("cache.json")).expect("open");
        let model = CountingModel::new("answer");

        cache.insert(&prompt("hello"), "manual").expect("insert");
        assert_eq!(cache.get(&model, &prompt("hello")).expect("get"), "manual");
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn clear_removes_entries_and_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("cache.json");
        let mut cache = ResponseCache::open(&path).expect("open");
        cache.insert(&prompt("hello"), "manual").expect("insert");
        assert!(path.exists());

        cache.clear().expect("clear");
        assert!(cache.is_empty());
        assert!(!path.exists());
        assert_eq!(cache.lookup(&prompt("hello")).expect("lookup"), None);
    }

    #[test]
    fn hash_is_stable_hex() {
        let hash = prompt_hash(&prompt("hello")).expect("hash");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, prompt_hash(&prompt("hello")).expect("hash"));
        assert_ne!(hash, prompt_hash(&prompt("hello ")).expect("hash"));
    }
}
