// src/core/paths.rs

use crate::constants::{
    ANDROID_BUILD_OUTPUTS_SUBDIR, ANDROID_MANIFEST_SUBPATH, ANDROID_PROJECT_SUBDIR,
    CAPACITOR_CONFIG_FILENAME, CONFIG_DIR_NAME, GLOBAL_CONFIG_FILENAME, IOS_PROJECT_SUBDIR,
    IOS_WORKSPACE,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Failed to expand path template '{template}': {message}")]
    Expansion { template: String, message: String },
}

/// Returns the path to the caprun configuration directory (`~/.config/caprun`).
/// The directory is not created; caprun only ever reads from it.
pub fn get_caprun_config_dir() -> Result<PathBuf, PathError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or(PathError::ConfigDirNotFound)
}

/// Returns the path to the user-wide `config.toml`.
pub fn get_global_config_path() -> Result<PathBuf, PathError> {
    get_caprun_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILENAME))
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in `template`, then anchors
/// relative results at `base`.
pub fn expand_path(template: &str, base: &Path) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        template: template.to_string(),
        message: e.to_string(),
    })?;
    let path = PathBuf::from(expanded.into_owned());
    let anchored = if path.is_absolute() {
        path
    } else {
        base.join(path)
    };
    Ok(dunce::simplified(&anchored).to_path_buf())
}

/// Where things live inside a project with a Capacitor shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub capacitor_dir: PathBuf,
}

impl AppPaths {
    pub fn new(project_root: impl Into<PathBuf>, capacitor_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            capacitor_dir: capacitor_dir.into(),
        }
    }

    /// Resolves a path relative to the Capacitor project.
    pub fn resolve_capacitor(&self, relative: &str) -> PathBuf {
        self.capacitor_dir.join(relative)
    }

    pub fn capacitor_config_file(&self) -> PathBuf {
        self.resolve_capacitor(CAPACITOR_CONFIG_FILENAME)
    }

    /// The Xcode project directory; `xcodebuild` runs here.
    pub fn ios_app_dir(&self) -> PathBuf {
        self.resolve_capacitor(IOS_PROJECT_SUBDIR)
    }

    pub fn ios_workspace(&self) -> PathBuf {
        self.ios_app_dir().join(IOS_WORKSPACE)
    }

    /// The Gradle project directory; the wrapper runs here.
    pub fn android_dir(&self) -> PathBuf {
        self.resolve_capacitor(ANDROID_PROJECT_SUBDIR)
    }

    pub fn android_build_outputs(&self) -> PathBuf {
        self.resolve_capacitor(ANDROID_BUILD_OUTPUTS_SUBDIR)
    }

    pub fn android_manifest(&self) -> PathBuf {
        self.resolve_capacitor(ANDROID_MANIFEST_SUBPATH)
    }
}
