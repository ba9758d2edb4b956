// src/core/supervisor.rs

//! # Build Supervisor
//!
//! `BuildSupervisor` owns the single child process of a mobile build: the Capacitor
//! CLI during preparation, then `xcodebuild` or the Gradle wrapper when packaging.
//!
//! The lifecycle is `Idle → Preparing → ToolRunning → (Building | IdeOpen) → Idle`.
//! Starting anything while a process is active stops that process first, so the
//! active slot never holds more than one handle. Every tracked process carries a
//! generation number; an exit is only allowed to clear the slot (and reset the
//! prepared configuration) while the slot still belongs to that generation.
use crate::{
    constants::{GRADLE_WRAPPER, IOS_SCHEME, IOS_WORKSPACE, TOOL_NAME, XCRUN_BIN},
    core::collaborators::{ConfigPreparer, Console, IdeOpener, ManifestFixer},
    models::{
        BuildConfig, BuildOptions, BuildOutcome, Phase, RunOutcome, RunRequest,
        SupervisorContext, Target,
    },
    system::{
        executor::{CommandRunner, Completion, ExecutionError},
        fs_ops,
        process::{CommandSpec, ProcessExit, ProcessHandle},
        shutdown::ShutdownRegistry,
    },
};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Spawn(#[from] ExecutionError),
    #[error("Capacitor CLI has failed ({exit})")]
    PlatformToolFailed { exit: ProcessExit },
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
    #[error("Filesystem operation on '{path}' failed: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Native packaging is not supported for target '{0}'.")]
    UnsupportedTarget(String),
    #[error("The supervisor has not been initialized with a target.")]
    NotInitialized,
}

impl SupervisorError {
    /// The classification printed next to the message when the host gives up.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PlatformToolFailed { .. } => "FAIL",
            _ => "ERROR",
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// The external pieces the supervisor drives.
#[derive(Clone)]
pub struct Collaborators {
    pub preparer: Arc<dyn ConfigPreparer>,
    pub ide: Arc<dyn IdeOpener>,
    pub manifest: Arc<dyn ManifestFixer>,
    pub console: Arc<dyn Console>,
}

struct ActiveProcess {
    handle: ProcessHandle,
    generation: u64,
}

#[derive(Default)]
struct SupervisorState {
    active: Option<ActiveProcess>,
    last_url: Option<String>,
    context: Option<SupervisorContext>,
    phase: Phase,
    generation: u64,
    /// Bumped by every `run` and `build`; only the latest one may settle the phase.
    request: u64,
}

struct Inner {
    runner: CommandRunner,
    collaborators: Collaborators,
    state: Mutex<SupervisorState>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn holds(&self, generation: u64) -> bool {
        self.lock_state()
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }
}

/// How a tracked process ended, as far as the caller is concerned.
enum Tracked {
    Exited(ProcessExit),
    /// `stop()` or a newer request took the slot before the process exited.
    Superseded,
}

/// Supervises the one build process of a host. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BuildSupervisor {
    inner: Arc<Inner>,
}

impl fmt::Debug for BuildSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("BuildSupervisor")
            .field("phase", &state.phase)
            .field("active_pid", &state.active.as_ref().map(|a| a.handle.pid()))
            .field("last_url", &state.last_url)
            .finish_non_exhaustive()
    }
}

impl BuildSupervisor {
    pub fn new(runner: CommandRunner, collaborators: Collaborators) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                collaborators,
                state: Mutex::new(SupervisorState::default()),
            }),
        }
    }

    /// Makes `registry` stop this supervisor's process when the host shuts down.
    pub fn register_shutdown(&self, registry: &ShutdownRegistry) -> Uuid {
        let supervisor = self.clone();
        registry.register(move || {
            supervisor.stop();
        })
    }

    /// Binds the supervisor to a target. Android projects get their manifest fixed.
    pub fn init(&self, context: SupervisorContext) -> Result<(), SupervisorError> {
        let target = context.target.clone();
        self.inner.lock_state().context = Some(context);
        if target == Target::Android {
            self.inner.collaborators.manifest.fix(TOOL_NAME)?;
        }
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock_state().phase
    }

    pub fn active_pid(&self) -> Option<u32> {
        self.inner.lock_state().active.as_ref().map(|a| a.handle.pid())
    }

    pub fn last_url(&self) -> Option<String> {
        self.inner.lock_state().last_url.clone()
    }

    /// Prepares the project for `request.url`, runs the Capacitor CLI and opens the IDE.
    pub async fn run(&self, request: &RunRequest) -> Result<RunOutcome, SupervisorError> {
        let context = self.context()?;
        let console = &self.inner.collaborators.console;

        if self.last_url().as_deref() == Some(request.url.as_str()) {
            log::debug!("URL '{}' already handled; nothing to do.", request.url);
            return Ok(RunOutcome::Unchanged);
        }

        let ticket = self.claim(Some(&request.url));

        let mut config = request.config.clone();
        config.app_url = Some(request.url.clone());
        let result = self.run_preparation(&config, request.ssl_enabled, &context.target).await;
        let outcome = match result {
            Ok(Some(())) => {
                self.inner
                    .collaborators
                    .ide
                    .open(TOOL_NAME, &config.ide, &context.target, true)
                    .await
                    .map_err(SupervisorError::from)
                    .map(|()| RunOutcome::Launched)
            }
            Ok(None) => return Ok(RunOutcome::Superseded),
            Err(e) => Err(e),
        };

        let Some(mut state) = self.settle(ticket) else {
            return outcome;
        };
        if outcome.is_err() {
            // Let the same URL be retried after a failure.
            state.last_url = None;
        } else {
            drop(state);
            console.info(&format!(t!("supervisor.info.app_running"), url = request.url));
        }
        outcome
    }

    /// Prepares the project, runs the Capacitor CLI and packages the native app.
    pub async fn build(
        &self,
        request: &RunRequest,
        options: &BuildOptions,
    ) -> Result<BuildOutcome, SupervisorError> {
        let context = self.context()?;
        let packaging = !options.skip_package && !options.open_ide_only;
        if let (true, Target::Other(name)) = (packaging, &context.target) {
            return Err(SupervisorError::UnsupportedTarget(name.clone()));
        }

        let ticket = self.claim(None);

        let config = &request.config;
        match self.run_preparation(config, false, &context.target).await {
            Ok(Some(())) => {}
            Ok(None) => return Ok(BuildOutcome::Superseded),
            Err(e) => {
                self.settle(ticket);
                return Err(e);
            }
        }

        if options.skip_package {
            self.settle(ticket);
            self.inner.collaborators.console.info(t!("build.info.skipped"));
            return Ok(BuildOutcome::Skipped);
        }

        if options.open_ide_only {
            let opened = self
                .inner
                .collaborators
                .ide
                .open(TOOL_NAME, &config.ide, &context.target, false)
                .await;
            self.settle(ticket);
            opened?;
            return Ok(BuildOutcome::IdeOpened);
        }

        let result = match &context.target {
            Target::Ios => self.build_ios(config, &context, &options.extra_args).await,
            Target::Android => self.build_android(config, &context, &options.extra_args).await,
            Target::Other(name) => Err(SupervisorError::UnsupportedTarget(name.clone())),
        };
        self.settle(ticket);
        result
    }

    /// Kills the active process and resets the prepared configuration.
    ///
    /// Returns `false` without doing anything when no process is active. Never waits
    /// for the process to exit.
    pub fn stop(&self) -> bool {
        let active = {
            let mut state = self.inner.lock_state();
            let active = state.active.take();
            if active.is_some() {
                state.phase = Phase::Idle;
            }
            active
        };
        let Some(mut active) = active else {
            return false;
        };

        self.inner
            .collaborators
            .console
            .info(t!("supervisor.info.shutting_down"));
        log::debug!("Stopping PID {} (generation {})", active.handle.pid(), active.generation);
        active.handle.kill();
        self.inner.collaborators.preparer.reset();
        true
    }

    fn context(&self) -> Result<SupervisorContext, SupervisorError> {
        self.inner
            .lock_state()
            .context
            .clone()
            .ok_or(SupervisorError::NotInitialized)
    }

    fn set_phase(&self, phase: Phase) {
        self.inner.lock_state().phase = phase;
    }

    /// Stops whatever is active and hands the supervisor to a new request.
    fn claim(&self, url: Option<&str>) -> u64 {
        self.stop();
        let mut state = self.inner.lock_state();
        state.request += 1;
        if let Some(url) = url {
            state.last_url = Some(url.to_string());
        }
        state.phase = Phase::Preparing;
        state.request
    }

    /// Returns to `Idle` unless a process is still tracked. Yields the locked state
    /// only while `ticket` is the latest request; a stale request leaves it alone.
    fn settle(&self, ticket: u64) -> Option<MutexGuard<'_, SupervisorState>> {
        let mut state = self.inner.lock_state();
        if state.request != ticket {
            log::debug!("Request {} was superseded by {}", ticket, state.request);
            return None;
        }
        if state.active.is_none() {
            state.phase = Phase::Idle;
        }
        Some(state)
    }

    /// Preparing and ToolRunning, shared by `run` and `build`. `Ok(None)` means the
    /// CLI was superseded.
    async fn run_preparation(
        &self,
        config: &BuildConfig,
        use_https: bool,
        target: &Target,
    ) -> Result<Option<()>, SupervisorError> {
        let preparer = &self.inner.collaborators.preparer;
        preparer.prepare(config)?;

        let spec = CommandSpec::new(&config.cli_bin, &config.paths.capacitor_dir)
            .args(config.preparation_params.iter().cloned());
        self.inner
            .collaborators
            .console
            .info(&format!(t!("supervisor.info.running_cli"), command = spec.command_line()));

        let completion = match self.track(&spec, Phase::ToolRunning, |_| {}) {
            Ok(tracked) => tracked,
            Err(e) => {
                preparer.reset();
                return Err(e);
            }
        };

        match self.finish(completion, true).await {
            Tracked::Superseded => Ok(None),
            Tracked::Exited(exit) if !exit.success() => {
                Err(SupervisorError::PlatformToolFailed { exit })
            }
            Tracked::Exited(_) => {
                self.set_phase(Phase::IdeOpen);
                preparer.prepare_ssl(use_https, target)?;
                Ok(Some(()))
            }
        }
    }

    async fn build_ios(
        &self,
        config: &BuildConfig,
        context: &SupervisorContext,
        extra_args: &[String],
    ) -> Result<BuildOutcome, SupervisorError> {
        let console = Arc::clone(&self.inner.collaborators.console);
        let dist = config.packaged_dist_dir.clone();
        let configuration = if context.debug { "debug" } else { "release" };

        let spec = CommandSpec::new(XCRUN_BIN, config.paths.ios_app_dir())
            .args(["xcodebuild", "-workspace", IOS_WORKSPACE, "-scheme", IOS_SCHEME])
            .args(["-configuration", configuration, "-derivedDataPath"])
            .arg(dist.display().to_string())
            .args(extra_args.iter().cloned());

        console.info(t!("build.info.ios"));
        let failed_dist = dist.clone();
        let completion = self.track(&spec, Phase::Building, move |_| {
            console.warn(&remediation(t!("build.warn.xcodebuild_failed")));
            if let Err(e) = fs_ops::remove_dir_if_exists(&failed_dist) {
                log::warn!("Could not remove '{}': {}", failed_dist.display(), e);
            }
        })?;

        Ok(match self.finish(completion, false).await {
            Tracked::Superseded => BuildOutcome::Superseded,
            Tracked::Exited(exit) if !exit.success() => BuildOutcome::NativeBuildFailed { exit },
            Tracked::Exited(_) => self.packaged(dist),
        })
    }

    async fn build_android(
        &self,
        config: &BuildConfig,
        context: &SupervisorContext,
        extra_args: &[String],
    ) -> Result<BuildOutcome, SupervisorError> {
        let console = Arc::clone(&self.inner.collaborators.console);
        let outputs = config.paths.android_build_outputs();
        fs_ops::remove_dir_if_exists(&outputs).map_err(|e| SupervisorError::io(&outputs, e))?;

        let android_dir = config.paths.android_dir();
        let task = if context.debug {
            "assembleDebug"
        } else {
            "assembleRelease"
        };
        let spec = CommandSpec::new(android_dir.join(GRADLE_WRAPPER), &android_dir)
            .arg(task)
            .args(extra_args.iter().cloned());

        console.info(t!("build.info.android"));
        let completion = self.track(&spec, Phase::Building, move |_| {
            console.warn(&remediation(t!("build.warn.gradle_failed")));
        })?;

        match self.finish(completion, false).await {
            Tracked::Superseded => Ok(BuildOutcome::Superseded),
            Tracked::Exited(exit) if !exit.success() => Ok(BuildOutcome::NativeBuildFailed { exit }),
            Tracked::Exited(_) => {
                let dist = config.packaged_dist_dir.clone();
                let copied = fs_ops::copy_dir_all(&outputs, &dist)
                    .map_err(|e| SupervisorError::io(&e.path, e.source))?;
                log::debug!("Copied {} file(s) into '{}'", copied, dist.display());
                Ok(self.packaged(dist))
            }
        }
    }

    fn packaged(&self, output: PathBuf) -> BuildOutcome {
        self.inner.collaborators.console.info(&format!(
            t!("build.success.packaged"),
            path = output.display()
        ));
        BuildOutcome::Packaged { output }
    }

    /// Spawns `spec` into the active slot. `on_failure` only runs if the process still
    /// owns the slot when it fails, so a stopped process never reports remediation.
    fn track<F>(
        &self,
        spec: &CommandSpec,
        phase: Phase,
        on_failure: F,
    ) -> Result<(u64, Completion), SupervisorError>
    where
        F: FnOnce(ProcessExit) + Send + 'static,
    {
        let generation = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.generation
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let launched = self.inner.runner.launch(spec, move |exit| {
            if weak.upgrade().is_some_and(|inner| inner.holds(generation)) {
                on_failure(exit);
            } else {
                log::debug!("Ignoring exit {} of superseded generation {}", exit, generation);
            }
        });
        let launched = launched?;

        let mut state = self.inner.lock_state();
        if let Some(mut stale) = state.active.take() {
            log::warn!("PID {} was still tracked; killing it.", stale.handle.pid());
            stale.handle.kill();
        }
        log::debug!(
            "Tracking PID {} as generation {} ({:?})",
            launched.handle.pid(),
            generation,
            phase
        );
        state.active = Some(ActiveProcess {
            handle: launched.handle,
            generation,
        });
        state.phase = phase;
        Ok((generation, launched.completion))
    }

    /// Waits for a tracked process and clears the slot if it still owns it. The
    /// configuration is reset along with the slot when `reset_config` is set.
    async fn finish(
        &self,
        (generation, completion): (u64, Completion),
        reset_config: bool,
    ) -> Tracked {
        let exit = completion.wait().await;
        if !self.release(generation) {
            return Tracked::Superseded;
        }
        if reset_config {
            self.inner.collaborators.preparer.reset();
        }
        Tracked::Exited(exit)
    }

    fn release(&self, generation: u64) -> bool {
        let mut state = self.inner.lock_state();
        match &state.active {
            Some(active) if active.generation == generation => {
                state.active = None;
                state.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }
}

fn remediation(headline: &str) -> String {
    format!("{}\n{}", headline, t!("build.warn.ide_alternative"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paths::AppPaths;
    use crate::models::IdeBinaries;
    use crate::system::process::{ExitNotice, ProcessSpawner, SpawnedProcess};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use tempfile::{TempDir, tempdir};
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Spawn { pid: u32, program: String, args: Vec<String> },
        Kill(u32),
    }

    type SpawnAction = Box<dyn Fn(&CommandSpec) + Send + Sync>;

    /// Records every spawn and kill. Programs without a configured exit code hang
    /// until `finish` or a kill.
    #[derive(Default)]
    struct FakeState {
        next_pid: AtomicU32,
        events: Mutex<Vec<Event>>,
        exit_codes: Mutex<HashMap<String, i32>>,
        missing: Mutex<HashSet<String>>,
        actions: Mutex<HashMap<String, SpawnAction>>,
        pending: Mutex<HashMap<u32, oneshot::Sender<ProcessExit>>>,
    }

    #[derive(Default, Clone)]
    struct FakeSpawner {
        state: Arc<FakeState>,
    }

    impl FakeSpawner {
        fn exit_with(&self, program: &str, code: i32) {
            self.state.exit_codes.lock().unwrap().insert(program.to_string(), code);
        }

        fn missing(&self, program: &str) {
            self.state.missing.lock().unwrap().insert(program.to_string());
        }

        fn on_spawn(&self, program: &str, action: impl Fn(&CommandSpec) + Send + Sync + 'static) {
            self.state
                .actions
                .lock()
                .unwrap()
                .insert(program.to_string(), Box::new(action));
        }

        fn finish(&self, pid: u32, code: i32) {
            let sender = self.state.pending.lock().unwrap().remove(&pid);
            sender.expect("pid is pending").send(ProcessExit::Code(code)).unwrap();
        }

        fn events(&self) -> Vec<Event> {
            self.state.events.lock().unwrap().clone()
        }

        fn spawned_programs(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    Event::Spawn { program, .. } => Some(program),
                    Event::Kill(_) => None,
                })
                .collect()
        }
    }

    impl ProcessSpawner for FakeSpawner {
        fn spawn(&self, spec: &CommandSpec) -> io::Result<SpawnedProcess> {
            let program = spec.program_name();
            if self.state.missing.lock().unwrap().contains(&program) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
            }

            let pid = 100 + self.state.next_pid.fetch_add(1, Ordering::SeqCst);
            self.state.events.lock().unwrap().push(Event::Spawn {
                pid,
                program: program.clone(),
                args: spec.args.clone(),
            });
            if let Some(action) = self.state.actions.lock().unwrap().get(&program) {
                action(spec);
            }

            let (exit_tx, exit_rx) = oneshot::channel();
            match self.state.exit_codes.lock().unwrap().get(&program) {
                Some(code) => {
                    let _ = exit_tx.send(ProcessExit::Code(*code));
                }
                None => {
                    self.state.pending.lock().unwrap().insert(pid, exit_tx);
                }
            }

            let state = Arc::clone(&self.state);
            let handle = ProcessHandle::new(pid, move || {
                state.events.lock().unwrap().push(Event::Kill(pid));
                if let Some(sender) = state.pending.lock().unwrap().remove(&pid) {
                    let _ = sender.send(ProcessExit::Terminated);
                }
            });
            Ok(SpawnedProcess {
                handle,
                exit: ExitNotice::new(exit_rx),
            })
        }
    }

    #[derive(Default)]
    struct FakePreparer {
        prepared: Mutex<Vec<Option<String>>>,
        ssl: Mutex<Vec<(bool, Target)>>,
        resets: AtomicUsize,
    }

    impl ConfigPreparer for FakePreparer {
        fn prepare(&self, config: &BuildConfig) -> anyhow::Result<()> {
            self.prepared.lock().unwrap().push(config.app_url.clone());
            Ok(())
        }

        fn prepare_ssl(&self, use_https: bool, target: &Target) -> anyhow::Result<()> {
            self.ssl.lock().unwrap().push((use_https, target.clone()));
            Ok(())
        }

        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Records every open. An installed gate holds the next open until released, and
    /// `failures` opens fail before the rest succeed.
    #[derive(Default)]
    struct FakeIde {
        opened: Mutex<Vec<(String, Target, bool)>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        failures: AtomicUsize,
    }

    impl FakeIde {
        fn hold_next_open(&self) -> oneshot::Sender<()> {
            let (release, gate) = oneshot::channel();
            *self.gate.lock().unwrap() = Some(gate);
            release
        }

        fn opened_count(&self) -> usize {
            self.opened.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IdeOpener for FakeIde {
        async fn open(
            &self,
            tool: &str,
            _binaries: &IdeBinaries,
            target: &Target,
            foreground: bool,
        ) -> anyhow::Result<()> {
            self.opened
                .lock()
                .unwrap()
                .push((tool.to_string(), target.clone(), foreground));
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                anyhow::bail!("ide failed");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeManifest {
        fixes: Mutex<Vec<String>>,
    }

    impl ManifestFixer for FakeManifest {
        fn fix(&self, tool: &str) -> anyhow::Result<()> {
            self.fixes.lock().unwrap().push(tool.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingConsole {
        infos: Mutex<Vec<String>>,
        warns: Mutex<Vec<String>>,
    }

    impl Console for RecordingConsole {
        fn info(&self, message: &str) {
            self.infos.lock().unwrap().push(message.to_string());
        }

        fn warn(&self, message: &str) {
            self.warns.lock().unwrap().push(message.to_string());
        }
    }

    struct Harness {
        dir: TempDir,
        spawner: FakeSpawner,
        preparer: Arc<FakePreparer>,
        ide: Arc<FakeIde>,
        manifest: Arc<FakeManifest>,
        console: Arc<RecordingConsole>,
        supervisor: BuildSupervisor,
    }

    impl Harness {
        fn new(target: Target, debug: bool) -> Self {
            let harness = Self::uninitialized();
            harness
                .supervisor
                .init(SupervisorContext { target, debug })
                .unwrap();
            harness
        }

        fn uninitialized() -> Self {
            let spawner = FakeSpawner::default();
            let preparer = Arc::new(FakePreparer::default());
            let ide = Arc::new(FakeIde::default());
            let manifest = Arc::new(FakeManifest::default());
            let console = Arc::new(RecordingConsole::default());
            let supervisor = BuildSupervisor::new(
                CommandRunner::new(Arc::new(spawner.clone())),
                Collaborators {
                    preparer: preparer.clone(),
                    ide: ide.clone(),
                    manifest: manifest.clone(),
                    console: console.clone(),
                },
            );
            Self {
                dir: tempdir().unwrap(),
                spawner,
                preparer,
                ide,
                manifest,
                console,
                supervisor,
            }
        }

        fn config(&self) -> BuildConfig {
            let root = self.dir.path();
            let capacitor_dir = root.join("src-capacitor");
            BuildConfig {
                app_url: None,
                paths: AppPaths::new(root, &capacitor_dir),
                cli_bin: capacitor_dir.join("node_modules/.bin/cap"),
                preparation_params: vec!["sync".to_string(), "android".to_string()],
                packaged_dist_dir: root.join("dist/capacitor/android"),
                ide: IdeBinaries::default(),
                https: false,
            }
        }

        fn request(&self, url: &str) -> RunRequest {
            RunRequest::new(self.config(), url)
        }

        fn resets(&self) -> usize {
            self.preparer.resets.load(Ordering::SeqCst)
        }

        fn warns(&self) -> Vec<String> {
            self.console.warns.lock().unwrap().clone()
        }
    }

    async fn wait_for_pid(supervisor: &BuildSupervisor, pid: u32) {
        for _ in 0..10_000 {
            if supervisor.active_pid() == Some(pid) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("PID {} never became active", pid);
    }

    async fn wait_for_ide_opens(ide: &FakeIde, count: usize) {
        for _ in 0..10_000 {
            if ide.opened_count() == count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("IDE was never opened {} time(s)", count);
    }

    fn spawn_run(
        supervisor: &BuildSupervisor,
        request: RunRequest,
    ) -> tokio::task::JoinHandle<Result<RunOutcome, SupervisorError>> {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run(&request).await })
    }

    #[tokio::test]
    async fn test_same_url_is_debounced() {
        let h = Harness::new(Target::Android, true);
        h.spawner.exit_with("cap", 0);

        let first = h.supervisor.run(&h.request("http://a")).await.unwrap();
        let second = h.supervisor.run(&h.request("http://a")).await.unwrap();

        assert_eq!(first, RunOutcome::Launched);
        assert_eq!(second, RunOutcome::Unchanged);
        assert_eq!(h.spawner.spawned_programs(), vec!["cap"]);
        assert_eq!(h.preparer.prepared.lock().unwrap().len(), 1);
        assert_eq!(h.ide.opened.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_successful_run_prepares_ssl_then_opens_ide_in_foreground() {
        let h = Harness::new(Target::Android, true);
        h.spawner.exit_with("cap", 0);
        let mut request = h.request("https://a");
        request.ssl_enabled = true;

        h.supervisor.run(&request).await.unwrap();

        assert_eq!(*h.preparer.prepared.lock().unwrap(), vec![Some("https://a".to_string())]);
        assert_eq!(*h.preparer.ssl.lock().unwrap(), vec![(true, Target::Android)]);
        assert_eq!(
            *h.ide.opened.lock().unwrap(),
            vec![("capacitor".to_string(), Target::Android, true)]
        );
        assert_eq!(
            h.spawner.events()[0],
            Event::Spawn {
                pid: 100,
                program: "cap".to_string(),
                args: vec!["sync".to_string(), "android".to_string()],
            }
        );
        assert_eq!(h.supervisor.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_new_url_preempts_active_process() {
        let h = Harness::new(Target::Android, true);

        let first = spawn_run(&h.supervisor, h.request("http://a"));
        wait_for_pid(&h.supervisor, 100).await;
        assert_eq!(h.supervisor.phase(), Phase::ToolRunning);

        let second = spawn_run(&h.supervisor, h.request("http://b"));
        wait_for_pid(&h.supervisor, 101).await;
        h.spawner.finish(101, 0);

        assert_eq!(second.await.unwrap().unwrap(), RunOutcome::Launched);
        assert_eq!(first.await.unwrap().unwrap(), RunOutcome::Superseded);

        let events = h.spawner.events();
        assert!(matches!(events[0], Event::Spawn { pid: 100, .. }));
        assert_eq!(events[1], Event::Kill(100));
        assert!(matches!(events[2], Event::Spawn { pid: 101, .. }));
        assert_eq!(events.len(), 3);

        // One reset for the stopped process, one for the finished one.
        assert_eq!(h.resets(), 2);
        assert_eq!(h.ide.opened.lock().unwrap().len(), 1);
        assert_eq!(h.supervisor.active_pid(), None);
        assert_eq!(h.supervisor.last_url().as_deref(), Some("http://b"));
    }

    #[tokio::test]
    async fn test_stale_run_failure_keeps_newer_url_debounced() {
        let h = Harness::new(Target::Android, true);
        let release_ide = h.ide.hold_next_open();
        h.ide.failures.store(1, Ordering::SeqCst);

        let first = spawn_run(&h.supervisor, h.request("http://a"));
        wait_for_pid(&h.supervisor, 100).await;
        h.spawner.finish(100, 0);
        wait_for_ide_opens(&h.ide, 1).await;

        let second = spawn_run(&h.supervisor, h.request("http://b"));
        wait_for_pid(&h.supervisor, 101).await;

        release_ide.send(()).unwrap();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, SupervisorError::Collaborator(_)));

        assert_eq!(h.supervisor.last_url().as_deref(), Some("http://b"));
        assert_eq!(h.supervisor.active_pid(), Some(101));
        assert_eq!(h.supervisor.phase(), Phase::ToolRunning);

        let repeat = h.supervisor.run(&h.request("http://b")).await.unwrap();
        assert_eq!(repeat, RunOutcome::Unchanged);
        assert!(!h.spawner.events().contains(&Event::Kill(101)));
        assert_eq!(h.supervisor.active_pid(), Some(101));

        h.spawner.finish(101, 0);
        assert_eq!(second.await.unwrap().unwrap(), RunOutcome::Launched);
        assert_eq!(h.supervisor.phase(), Phase::Idle);
        assert_eq!(h.spawner.spawned_programs(), vec!["cap", "cap"]);
    }

    #[tokio::test]
    async fn test_cleanup_resets_exactly_once_per_exit() {
        let h = Harness::new(Target::Android, true);

        let run = spawn_run(&h.supervisor, h.request("http://a"));
        wait_for_pid(&h.supervisor, 100).await;
        assert_eq!(h.resets(), 0);

        h.spawner.finish(100, 0);
        run.await.unwrap().unwrap();

        assert_eq!(h.resets(), 1);
        assert_eq!(h.supervisor.active_pid(), None);
        assert!(!h.supervisor.stop());
        assert_eq!(h.resets(), 1);
    }

    #[tokio::test]
    async fn test_failing_cli_is_fatal() {
        let h = Harness::new(Target::Android, true);
        h.spawner.exit_with("cap", 1);

        let err = h.supervisor.run(&h.request("http://a")).await.unwrap_err();

        assert!(matches!(
            err,
            SupervisorError::PlatformToolFailed { exit: ProcessExit::Code(1) }
        ));
        assert_eq!(err.tag(), "FAIL");
        assert!(err.to_string().starts_with("Capacitor CLI has failed"));
        assert_eq!(h.resets(), 1);
        assert!(h.preparer.ssl.lock().unwrap().is_empty());
        assert!(h.ide.opened.lock().unwrap().is_empty());
        assert_eq!(h.supervisor.phase(), Phase::Idle);

        // The failed URL can be retried.
        h.spawner.exit_with("cap", 0);
        let retry = h.supervisor.run(&h.request("http://a")).await.unwrap();
        assert_eq!(retry, RunOutcome::Launched);
    }

    #[tokio::test]
    async fn test_stop_on_idle_is_a_noop() {
        let h = Harness::new(Target::Android, true);

        assert!(!h.supervisor.stop());

        assert!(h.spawner.events().is_empty());
        assert_eq!(h.resets(), 0);
        assert_eq!(h.supervisor.phase(), Phase::Idle);
        assert!(h.console.infos.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_kills_and_resets_without_waiting() {
        let h = Harness::new(Target::Android, true);

        let run = spawn_run(&h.supervisor, h.request("http://a"));
        wait_for_pid(&h.supervisor, 100).await;

        assert!(h.supervisor.stop());
        assert_eq!(h.supervisor.active_pid(), None);
        assert_eq!(h.supervisor.phase(), Phase::Idle);
        assert_eq!(h.resets(), 1);
        assert!(!h.supervisor.stop(), "second stop is a no-op");

        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Superseded);
        assert_eq!(h.spawner.events()[1], Event::Kill(100));
        assert_eq!(h.resets(), 1);
        assert!(h.ide.opened.lock().unwrap().is_empty());
        assert!(
            h.console
                .infos
                .lock()
                .unwrap()
                .contains(&t!("supervisor.info.shutting_down").to_string())
        );
    }

    #[tokio::test]
    async fn test_shutdown_registry_stops_active_process() {
        let h = Harness::new(Target::Android, true);
        let registry = ShutdownRegistry::new();
        h.supervisor.register_shutdown(&registry);
        assert_eq!(registry.len(), 1);

        let run = spawn_run(&h.supervisor, h.request("http://a"));
        wait_for_pid(&h.supervisor, 100).await;

        registry.fire();

        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Superseded);
        assert!(h.spawner.events().contains(&Event::Kill(100)));
        assert_eq!(h.resets(), 1);
    }

    #[tokio::test]
    async fn test_skip_package_stops_after_ssl_preparation() {
        let h = Harness::new(Target::Android, false);
        h.spawner.exit_with("cap", 0);
        let options = BuildOptions {
            skip_package: true,
            ..Default::default()
        };

        let outcome = h.supervisor.build(&h.request("http://a"), &options).await.unwrap();

        assert_eq!(outcome, BuildOutcome::Skipped);
        assert_eq!(h.spawner.spawned_programs(), vec!["cap"]);
        assert_eq!(*h.preparer.ssl.lock().unwrap(), vec![(false, Target::Android)]);
        assert!(h.ide.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_ide_only_opens_in_background() {
        let h = Harness::new(Target::Ios, false);
        h.spawner.exit_with("cap", 0);
        let options = BuildOptions {
            open_ide_only: true,
            ..Default::default()
        };

        let outcome = h.supervisor.build(&h.request("http://a"), &options).await.unwrap();

        assert_eq!(outcome, BuildOutcome::IdeOpened);
        assert_eq!(
            *h.ide.opened.lock().unwrap(),
            vec![("capacitor".to_string(), Target::Ios, false)]
        );
        assert_eq!(h.spawner.spawned_programs(), vec!["cap"]);
    }

    #[tokio::test]
    async fn test_build_preempts_active_run() {
        let h = Harness::new(Target::Android, false);

        let run = spawn_run(&h.supervisor, h.request("http://a"));
        wait_for_pid(&h.supervisor, 100).await;

        let supervisor = h.supervisor.clone();
        let request = h.request("http://a");
        let options = BuildOptions {
            skip_package: true,
            ..Default::default()
        };
        let build = tokio::spawn(async move { supervisor.build(&request, &options).await });
        wait_for_pid(&h.supervisor, 101).await;
        assert_eq!(h.spawner.events()[1], Event::Kill(100));

        h.spawner.finish(101, 0);

        assert_eq!(build.await.unwrap().unwrap(), BuildOutcome::Skipped);
        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Superseded);
        assert_eq!(h.spawner.events().len(), 3);
        assert_eq!(h.resets(), 2);
        assert!(h.ide.opened.lock().unwrap().is_empty());
        assert_eq!(h.supervisor.active_pid(), None);
        assert_eq!(h.supervisor.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_build_cli_failure_is_fatal() {
        let h = Harness::new(Target::Android, false);
        h.spawner.exit_with("cap", 2);

        let err = h
            .supervisor
            .build(&h.request("http://a"), &BuildOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SupervisorError::PlatformToolFailed { exit: ProcessExit::Code(2) }
        ));
        assert_eq!(err.tag(), "FAIL");
        assert_eq!(h.spawner.spawned_programs(), vec!["cap"]);
        assert_eq!(h.resets(), 1);
        assert!(h.preparer.ssl.lock().unwrap().is_empty());
        assert!(h.warns().is_empty());
        assert_eq!(h.supervisor.active_pid(), None);
        assert_eq!(h.supervisor.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_android_failure_warns_once_and_leaves_dist_alone() {
        let h = Harness::new(Target::Android, false);
        h.spawner.exit_with("cap", 0);
        h.spawner.exit_with(GRADLE_WRAPPER, 1);
        let config = h.config();
        fs::create_dir_all(&config.packaged_dist_dir).unwrap();
        fs::write(config.packaged_dist_dir.join("previous.apk"), "old").unwrap();
        let stale = config.paths.android_build_outputs().join("apk/stale.apk");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "stale").unwrap();

        let outcome = h
            .supervisor
            .build(&h.request("http://a"), &BuildOptions::default())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BuildOutcome::NativeBuildFailed {
                exit: ProcessExit::Code(1)
            }
        );
        let warns = h.warns();
        assert_eq!(warns.len(), 1);
        assert!(warns[0].contains("--ide"));
        assert!(!stale.exists(), "stale outputs are removed before gradle runs");
        let dist_entries: Vec<_> = fs::read_dir(&config.packaged_dist_dir).unwrap().collect();
        assert_eq!(dist_entries.len(), 1);
        assert!(config.packaged_dist_dir.join("previous.apk").exists());

        let gradle = h.spawner.events()[1].clone();
        assert_eq!(
            gradle,
            Event::Spawn {
                pid: 101,
                program: GRADLE_WRAPPER.to_string(),
                args: vec!["assembleRelease".to_string()],
            }
        );
        assert_eq!(h.supervisor.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_android_success_copies_outputs() {
        let h = Harness::new(Target::Android, true);
        h.spawner.exit_with("cap", 0);
        h.spawner.exit_with(GRADLE_WRAPPER, 0);
        h.spawner.on_spawn(GRADLE_WRAPPER, |spec| {
            let apk = spec.cwd.join("app/build/outputs/apk/debug/app-debug.apk");
            fs::create_dir_all(apk.parent().unwrap()).unwrap();
            fs::write(apk, "apk").unwrap();
        });
        let options = BuildOptions {
            extra_args: vec!["--offline".to_string()],
            ..Default::default()
        };

        let outcome = h.supervisor.build(&h.request("http://a"), &options).await.unwrap();

        let dist = h.config().packaged_dist_dir;
        assert_eq!(outcome, BuildOutcome::Packaged { output: dist.clone() });
        assert!(dist.join("apk/debug/app-debug.apk").exists());
        assert!(h.warns().is_empty());
        match &h.spawner.events()[1] {
            Event::Spawn { args, .. } => assert_eq!(args, &vec!["assembleDebug", "--offline"]),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ios_failure_removes_partial_output() {
        let h = Harness::new(Target::Ios, true);
        h.spawner.exit_with("cap", 0);
        h.spawner.exit_with(XCRUN_BIN, 65);
        let dist = h.config().packaged_dist_dir;
        fs::create_dir_all(dist.join("Build")).unwrap();

        let outcome = h
            .supervisor
            .build(&h.request("http://a"), &BuildOptions::default())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BuildOutcome::NativeBuildFailed {
                exit: ProcessExit::Code(65)
            }
        );
        assert!(!dist.exists());
        assert_eq!(h.warns().len(), 1);
        match &h.spawner.events()[1] {
            Event::Spawn { program, args, .. } => {
                assert_eq!(program, XCRUN_BIN);
                assert_eq!(args[0], "xcodebuild");
                assert!(args.windows(2).any(|w| w == ["-configuration", "debug"]));
                assert_eq!(args.last().map(PathBuf::from), Some(dist.clone()));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stopped_native_build_reports_no_remediation() {
        let h = Harness::new(Target::Ios, false);
        h.spawner.exit_with("cap", 0);
        let dist = h.config().packaged_dist_dir;
        fs::create_dir_all(&dist).unwrap();

        let supervisor = h.supervisor.clone();
        let request = h.request("http://a");
        let build = tokio::spawn(async move {
            supervisor.build(&request, &BuildOptions::default()).await
        });
        wait_for_pid(&h.supervisor, 101).await;
        assert_eq!(h.supervisor.phase(), Phase::Building);

        assert!(h.supervisor.stop());

        assert_eq!(build.await.unwrap().unwrap(), BuildOutcome::Superseded);
        assert!(h.warns().is_empty());
        assert!(dist.exists());
    }

    #[tokio::test]
    async fn test_other_target_cannot_be_packaged() {
        let h = Harness::new(Target::from("electron"), false);

        let err = h
            .supervisor
            .build(&h.request("http://a"), &BuildOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::UnsupportedTarget(ref name) if name == "electron"));
        assert_eq!(err.tag(), "ERROR");
        assert!(h.spawner.events().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_returns_to_idle() {
        let h = Harness::new(Target::Android, true);
        h.spawner.missing("cap");
        h.spawner.missing("cmd");

        let err = h.supervisor.run(&h.request("http://a")).await.unwrap_err();

        assert!(matches!(err, SupervisorError::Spawn(ExecutionError::Spawn { .. })));
        assert_eq!(h.supervisor.phase(), Phase::Idle);
        assert_eq!(h.supervisor.active_pid(), None);
        assert_eq!(h.resets(), 1);
        assert_eq!(h.supervisor.last_url(), None);
    }

    #[tokio::test]
    async fn test_run_requires_init() {
        let h = Harness::uninitialized();
        let err = h.supervisor.run(&h.request("http://a")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotInitialized));
    }

    #[test]
    fn test_init_fixes_manifest_only_for_android() {
        let android = Harness::new(Target::Android, false);
        assert_eq!(*android.manifest.fixes.lock().unwrap(), vec!["capacitor"]);

        let ios = Harness::new(Target::Ios, false);
        assert!(ios.manifest.fixes.lock().unwrap().is_empty());
    }
}
