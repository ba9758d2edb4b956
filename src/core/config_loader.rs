// src/core/config_loader.rs

//! # Config Loader
//!
//! This module provides the `ConfigLoader` struct, which turns the layered TOML
//! configuration of a project into the `BuildConfig` consumed by the supervisor.
//!
//! Two layers are read, lowest priority first:
//!
//! 1. **Global:** `~/.config/caprun/config.toml`, typically holding IDE paths.
//! 2. **Project:** `caprun.toml` in the project root.
//!
//! Command-line overrides sit on top of both. Missing files are simply skipped; every
//! setting has a default except the app URL, which only `run` requires.
use crate::{
    constants::{
        CAPACITOR_CLI_BIN, DEFAULT_CAPACITOR_DIR, DEFAULT_PACKAGED_DIST_DIR,
        PROJECT_CONFIG_FILENAME,
    },
    core::paths::{self, AppPaths, PathError},
    models::{BuildConfig, CommandArgs, ConfigFile, IdeBinaries, Target},
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Error parsing TOML in '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Could not split arguments '{0}' (unbalanced quotes?)")]
    ArgsParse(String),
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Values given on the command line. They beat every file layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub app_url: Option<String>,
    pub https: Option<bool>,
}

/// Loads and merges the configuration layers for one project.
#[derive(Debug)]
pub struct ConfigLoader {
    project_root: PathBuf,
    global_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Creates a loader for the project rooted at `project_root`, using the user-wide
    /// config file when the system config directory is known.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let global_path = match paths::get_global_config_path() {
            Ok(path) => Some(path),
            Err(e) => {
                log::debug!("No global config layer: {}", e);
                None
            }
        };
        Self {
            project_root: project_root.into(),
            global_path,
        }
    }

    /// Replaces the global layer's location (`None` disables it).
    pub fn with_global_path(mut self, global_path: Option<PathBuf>) -> Self {
        self.global_path = global_path;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Reads both layers and resolves them for `target`.
    pub fn load(
        &self,
        target: &Target,
        overrides: &ConfigOverrides,
    ) -> Result<BuildConfig, ConfigError> {
        let global = match &self.global_path {
            Some(path) => read_layer(path)?,
            None => None,
        };
        let project = read_layer(&self.project_root.join(PROJECT_CONFIG_FILENAME))?;

        let merged = merge_layers(global.unwrap_or_default(), project.unwrap_or_default());
        self.resolve(merged, target, overrides)
    }

    /// Applies defaults and overrides to a merged layer and anchors every path.
    fn resolve(
        &self,
        layer: ConfigFile,
        target: &Target,
        overrides: &ConfigOverrides,
    ) -> Result<BuildConfig, ConfigError> {
        let root = &self.project_root;

        let capacitor_dir = paths::expand_path(
            layer.capacitor.dir.as_deref().unwrap_or(DEFAULT_CAPACITOR_DIR),
            root,
        )?;

        let cli_bin = match layer.capacitor.cli.as_deref() {
            Some(template) => paths::expand_path(template, &capacitor_dir)?,
            None => capacitor_dir.join(CAPACITOR_CLI_BIN),
        };

        let preparation_params = match layer.capacitor.preparation_params {
            Some(CommandArgs::List(args)) => args,
            Some(CommandArgs::Line(line)) => {
                shlex::split(&line).ok_or(ConfigError::ArgsParse(line))?
            }
            None => vec!["sync".to_string(), target.as_str().to_string()],
        };

        let packaged_dist_dir = match layer.build.packaged_dist_dir.as_deref() {
            Some(template) => paths::expand_path(template, root)?,
            None => root.join(DEFAULT_PACKAGED_DIST_DIR).join(target.as_str()),
        };

        let app_url = overrides.app_url.clone().or(layer.build.app_url);
        let https = overrides
            .https
            .or(layer.dev_server.https)
            .unwrap_or_else(|| app_url.as_deref().is_some_and(|url| url.starts_with("https://")));

        let ide = IdeBinaries {
            android_studio: expand_optional(layer.bin.android_studio, root)?,
            xcode: expand_optional(layer.bin.xcode, root)?,
        };

        log::debug!(
            "Resolved config: capacitor_dir='{}', cli='{}', params={:?}",
            capacitor_dir.display(),
            cli_bin.display(),
            preparation_params
        );

        Ok(BuildConfig {
            app_url,
            paths: AppPaths::new(root.clone(), capacitor_dir),
            cli_bin,
            preparation_params,
            packaged_dist_dir,
            ide,
            https,
        })
    }
}

/// Reads one layer. A missing file is `None`, not an error.
fn read_layer(path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::trace!("Config layer '{}' not present.", path.display());
            return Ok(None);
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };
    log::debug!("Loading config layer '{}'", path.display());
    toml::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::TomlParse {
            path: path.display().to_string(),
            source,
        })
}

/// Field-by-field merge: anything set in `over` wins.
fn merge_layers(base: ConfigFile, over: ConfigFile) -> ConfigFile {
    let mut merged = base;
    merged.build.app_url = over.build.app_url.or(merged.build.app_url);
    merged.build.packaged_dist_dir = over.build.packaged_dist_dir.or(merged.build.packaged_dist_dir);
    merged.capacitor.dir = over.capacitor.dir.or(merged.capacitor.dir);
    merged.capacitor.cli = over.capacitor.cli.or(merged.capacitor.cli);
    merged.capacitor.preparation_params = over
        .capacitor
        .preparation_params
        .or(merged.capacitor.preparation_params);
    merged.dev_server.https = over.dev_server.https.or(merged.dev_server.https);
    merged.bin = over.bin.or(merged.bin);
    merged
}

fn expand_optional(path: Option<PathBuf>, base: &Path) -> Result<Option<PathBuf>, PathError> {
    path.map(|p| paths::expand_path(&p.to_string_lossy(), base))
        .transpose()
}
