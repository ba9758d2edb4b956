// src/constants.rs

use std::time::Duration;

/// The name of the per-project configuration file.
pub const PROJECT_CONFIG_FILENAME: &str = "caprun.toml";

/// The name of the user-wide configuration file (in ~/.config/caprun/).
pub const GLOBAL_CONFIG_FILENAME: &str = "config.toml";

/// The directory name used under the system config directory.
pub const CONFIG_DIR_NAME: &str = "caprun";

/// The tool name handed to collaborators (IDE opener, manifest fixer).
pub const TOOL_NAME: &str = "capacitor";

/// Default location of the Capacitor project, relative to the project root.
pub const DEFAULT_CAPACITOR_DIR: &str = "src-capacitor";

/// Default root for packaged output, relative to the project root. The target name is appended.
pub const DEFAULT_PACKAGED_DIST_DIR: &str = "dist/capacitor";

pub const CAPACITOR_CONFIG_FILENAME: &str = "capacitor.config.json";

/// The Capacitor CLI shim installed by npm, relative to the Capacitor project.
pub const CAPACITOR_CLI_BIN: &str = if cfg!(target_os = "windows") {
    "node_modules/.bin/cap.cmd"
} else {
    "node_modules/.bin/cap"
};

// --- iOS ---
pub const IOS_PROJECT_SUBDIR: &str = "ios/App";
pub const IOS_WORKSPACE: &str = "App.xcworkspace";
pub const IOS_SCHEME: &str = "App";
pub const XCRUN_BIN: &str = "xcrun";

// --- Android ---
pub const ANDROID_PROJECT_SUBDIR: &str = "android";
pub const ANDROID_BUILD_OUTPUTS_SUBDIR: &str = "android/app/build/outputs";
pub const ANDROID_MANIFEST_SUBPATH: &str = "android/app/src/main/AndroidManifest.xml";
/// The Gradle wrapper script, relative to the Android project.
pub const GRADLE_WRAPPER: &str = if cfg!(target_os = "windows") {
    "gradlew.bat"
} else {
    "gradlew"
};

// --- IDEs ---
pub const ANDROID_STUDIO_APP: &str = "Android Studio";
pub const ANDROID_STUDIO_BIN: &str = "studio";
pub const MACOS_OPEN_BIN: &str = "open";

/// How long a child gets to honour SIGTERM before it is killed outright.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound for running all shutdown hooks before the process exits anyway.
pub const SHUTDOWN_HOOK_TIMEOUT: Duration = Duration::from_secs(10);
