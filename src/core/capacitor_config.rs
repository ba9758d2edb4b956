// src/core/capacitor_config.rs

use crate::{
    core::collaborators::ConfigPreparer,
    models::{BuildConfig, Target},
};
use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct ConfigState {
    /// The last file handed to `prepare`. Outlives `reset` so SSL settings can follow.
    file: Option<PathBuf>,
    /// The pristine contents, kept until `reset` writes them back.
    original: Option<String>,
}

/// Points `capacitor.config.json` at the app URL for the duration of a run and
/// restores the file byte-for-byte on `reset`.
#[derive(Debug, Default)]
pub struct CapacitorConfig {
    state: Mutex<ConfigState>,
}

impl CapacitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, ConfigState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a `reset` would write anything back.
    pub fn has_pending_restore(&self) -> bool {
        self.lock_state().original.is_some()
    }
}

impl ConfigPreparer for CapacitorConfig {
    fn prepare(&self, config: &BuildConfig) -> Result<()> {
        let path = config.paths.capacitor_config_file();
        let original = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let mut json = parse_object(&original, &path)?;

        let server = server_section(&mut json)?;
        match &config.app_url {
            Some(url) => {
                server.insert("url".to_string(), Value::String(url.clone()));
                server.insert("cleartext".to_string(), Value::Bool(url.starts_with("http://")));
            }
            None => {
                server.remove("url");
                server.remove("cleartext");
            }
        }
        write_json(&path, &json)?;

        // Keep the first original: a second prepare must not save the patched copy.
        let mut state = self.lock_state();
        if state.original.is_none() || state.file.as_ref() != Some(&path) {
            state.original = Some(original);
        }
        state.file = Some(path);
        Ok(())
    }

    fn prepare_ssl(&self, use_https: bool, target: &Target) -> Result<()> {
        let Some(path) = self.lock_state().file.clone() else {
            log::debug!("prepare_ssl called before prepare; nothing to patch.");
            return Ok(());
        };
        // iOS reserves the http/https schemes, so only Android is adjusted.
        if *target != Target::Android {
            return Ok(());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let mut json = parse_object(&content, &path)?;
        let scheme = if use_https { "https" } else { "http" };
        server_section(&mut json)?.insert(
            "androidScheme".to_string(),
            Value::String(scheme.to_string()),
        );
        write_json(&path, &json)
    }

    fn reset(&self) {
        let (path, original) = {
            let mut state = self.lock_state();
            match (state.file.clone(), state.original.take()) {
                (Some(path), Some(original)) => (path, original),
                _ => return,
            }
        };
        match fs::write(&path, original) {
            Ok(()) => log::debug!("Restored '{}'", path.display()),
            Err(e) => log::warn!("Failed to restore '{}': {}", path.display(), e),
        }
    }
}

fn parse_object(content: &str, path: &Path) -> Result<Value> {
    let json: Value = serde_json::from_str(content)
        .with_context(|| format!("'{}' is not valid JSON", path.display()))?;
    if !json.is_object() {
        return Err(anyhow!("'{}' must contain a JSON object", path.display()));
    }
    Ok(json)
}

fn server_section(json: &mut Value) -> Result<&mut Map<String, Value>> {
    let root = json
        .as_object_mut()
        .ok_or_else(|| anyhow!("config root is not an object"))?;
    root.entry("server")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| anyhow!("'server' must be an object"))
}

fn write_json(path: &Path, json: &Value) -> Result<()> {
    let mut text = serde_json::to_string_pretty(json)?;
    text.push('\n');
    fs::write(path, text).with_context(|| format!("Failed to write '{}'", path.display()))
}
