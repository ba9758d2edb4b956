// src/core/ide.rs

use crate::{
    constants::{ANDROID_STUDIO_APP, ANDROID_STUDIO_BIN, MACOS_OPEN_BIN},
    core::{
        collaborators::{Console, IdeOpener},
        paths::AppPaths,
    },
    models::{IdeBinaries, Target},
    system::{executor::CommandRunner, process::CommandSpec},
};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens the generated native project in Android Studio or Xcode.
#[derive(Clone)]
pub struct IdeLauncher {
    runner: CommandRunner,
    paths: AppPaths,
    console: Arc<dyn Console>,
}

impl IdeLauncher {
    pub fn new(runner: CommandRunner, paths: AppPaths, console: Arc<dyn Console>) -> Self {
        Self {
            runner,
            paths,
            console,
        }
    }

    /// Builds the command that opens the IDE for `target`.
    pub fn launch_spec(&self, binaries: &IdeBinaries, target: &Target) -> Result<CommandSpec> {
        let root = self.paths.project_root.clone();
        match target {
            Target::Android => {
                let project = self.paths.android_dir().display().to_string();
                let spec = match &binaries.android_studio {
                    Some(studio) => CommandSpec::new(studio, root).arg(project),
                    None if cfg!(target_os = "macos") => CommandSpec::new(MACOS_OPEN_BIN, root)
                        .args(["-a", ANDROID_STUDIO_APP])
                        .arg(project),
                    None => CommandSpec::new(ANDROID_STUDIO_BIN, root).arg(project),
                };
                Ok(spec)
            }
            Target::Ios => {
                if !cfg!(target_os = "macos") {
                    bail!(t!("ide.error.xcode_macos_only"));
                }
                let workspace = self.paths.ios_workspace().display().to_string();
                let spec = match &binaries.xcode {
                    Some(xcode) => CommandSpec::new(MACOS_OPEN_BIN, root)
                        .arg("-a")
                        .arg(xcode.display().to_string())
                        .arg(workspace),
                    None => CommandSpec::new(MACOS_OPEN_BIN, root).arg(workspace),
                };
                Ok(spec)
            }
            Target::Other(name) => Err(anyhow!(t!("ide.error.unsupported_target"), target = name)),
        }
    }
}

#[async_trait]
impl IdeOpener for IdeLauncher {
    async fn open(
        &self,
        tool: &str,
        binaries: &IdeBinaries,
        target: &Target,
        foreground: bool,
    ) -> Result<()> {
        // Android Studio keeps running after it opens the project, so it is never awaited.
        let wait = foreground && *target != Target::Android;
        let spec = self.launch_spec(binaries, target)?.detached(!wait);

        self.console
            .info(&format!(t!("ide.info.opening"), target = target, tool = tool));

        let launched = self.runner.launch(&spec, |exit| {
            log::warn!("IDE launcher exited with {}", exit);
        })?;
        log::debug!("IDE launcher started (PID: {})", launched.handle.pid());

        if wait {
            let exit = launched.completion.wait().await;
            if !exit.success() {
                return Err(anyhow!(t!("ide.error.launcher_failed"), exit = exit));
            }
        } else {
            tokio::spawn(launched.completion.wait());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborators::TerminalConsole;
    use std::path::PathBuf;

    fn launcher() -> IdeLauncher {
        IdeLauncher::new(
            CommandRunner::default(),
            AppPaths::new("/work/app", "/work/app/src-capacitor"),
            Arc::new(TerminalConsole),
        )
    }

    #[test]
    fn test_configured_android_studio_is_used() {
        let binaries = IdeBinaries {
            android_studio: Some(PathBuf::from("/opt/android-studio/bin/studio.sh")),
            xcode: None,
        };
        let spec = launcher().launch_spec(&binaries, &Target::Android).unwrap();

        assert_eq!(spec.program, PathBuf::from("/opt/android-studio/bin/studio.sh"));
        assert_eq!(spec.args, vec!["/work/app/src-capacitor/android"]);
    }

    #[test]
    fn test_default_android_launcher_targets_android_project() {
        let spec = launcher()
            .launch_spec(&IdeBinaries::default(), &Target::Android)
            .unwrap();
        assert_eq!(
            spec.args.last().map(String::as_str),
            Some("/work/app/src-capacitor/android")
        );
    }

    #[test]
    fn test_xcode_requires_macos() {
        let result = launcher().launch_spec(&IdeBinaries::default(), &Target::Ios);
        if cfg!(target_os = "macos") {
            let spec = result.unwrap();
            assert!(spec.args.iter().any(|a| a.ends_with("App.xcworkspace")));
        } else {
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_other_targets_have_no_ide() {
        let result = launcher().launch_spec(&IdeBinaries::default(), &Target::from("electron"));
        assert!(result.is_err());
    }
}
