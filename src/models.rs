// src/models.rs

use crate::{core::paths::AppPaths, system::process::ProcessExit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// --- Targets and supervisor context ---

/// The mobile platform a supervisor instance is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Ios,
    Android,
    /// Any other platform name. Accepted for preparation, rejected for native packaging.
    Other(String),
}

impl Target {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "ios" => Self::Ios,
            "android" => Self::Android,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host tells the supervisor at `init` time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorContext {
    pub target: Target,
    pub debug: bool,
}

/// The supervisor's lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Preparing,
    ToolRunning,
    Building,
    IdeOpen,
}

// --- Resolved configuration ---

/// Paths to IDE launchers. Unset entries fall back to platform defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct IdeBinaries {
    pub android_studio: Option<PathBuf>,
    pub xcode: Option<PathBuf>,
}

impl IdeBinaries {
    /// Fills every unset entry from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            android_studio: self.android_studio.or(fallback.android_studio),
            xcode: self.xcode.or(fallback.xcode),
        }
    }
}

/// The fully resolved build configuration handed to the supervisor and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// The URL the native shell should load. `None` bundles the web assets instead.
    pub app_url: Option<String>,
    pub paths: AppPaths,
    /// The platform CLI binary.
    pub cli_bin: PathBuf,
    /// Arguments passed to the platform CLI during preparation (e.g. `sync android`).
    pub preparation_params: Vec<String>,
    /// Where packaged native output ends up.
    pub packaged_dist_dir: PathBuf,
    pub ide: IdeBinaries,
    /// Whether the dev server is served over HTTPS.
    pub https: bool,
}

// --- Requests and outcomes ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub url: String,
    pub config: BuildConfig,
    pub ssl_enabled: bool,
}

impl RunRequest {
    /// Builds a request for `url`, taking the SSL flag from the config.
    pub fn new(config: BuildConfig, url: impl Into<String>) -> Self {
        let ssl_enabled = config.https;
        Self {
            url: url.into(),
            config,
            ssl_enabled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Stop after preparation; do not invoke any native tool.
    pub skip_package: bool,
    /// Open the IDE instead of building natively.
    pub open_ide_only: bool,
    /// Extra arguments appended to the native build command.
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The URL matched the last handled one; nothing was done.
    Unchanged,
    /// A newer request or `stop()` terminated the platform CLI before it finished.
    Superseded,
    /// Preparation succeeded and the IDE was opened.
    Launched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Superseded,
    Skipped,
    /// The IDE was opened; the host is expected to exit with success.
    IdeOpened,
    Packaged { output: PathBuf },
    /// The native tool failed. Remediation guidance has already been printed.
    NativeBuildFailed { exit: ProcessExit },
}

// --- Configuration files (TOML) ---

/// A single layer of configuration as written in `caprun.toml` or the global `config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigFile {
    pub build: BuildSection,
    pub capacitor: CapacitorSection,
    pub dev_server: DevServerSection,
    pub bin: IdeBinaries,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BuildSection {
    pub app_url: Option<String>,
    pub packaged_dist_dir: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CapacitorSection {
    pub dir: Option<String>,
    pub cli: Option<String>,
    pub preparation_params: Option<CommandArgs>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct DevServerSection {
    pub https: Option<bool>,
}

/// Arguments written either as a TOML array or as a single shell-style string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandArgs {
    List(Vec<String>),
    Line(String),
}
