// src/cli/args.rs
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)] // The dispatcher already consumed the command name.
pub struct RunArgs {
    /// The mobile platform to run on: `ios` or `android`.
    pub target: String,

    /// The URL the app should load, usually the dev server. Overrides `build.app_url`.
    #[arg(long)]
    pub url: Option<String>,

    /// The dev server is served over HTTPS. Inferred from the URL when omitted.
    #[arg(long)]
    pub https: bool,

    /// The project root. Defaults to the current directory.
    #[arg(long)]
    pub project: Option<PathBuf>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true)]
pub struct BuildArgs {
    /// The mobile platform to package: `ios` or `android`.
    pub target: String,

    /// Build the debug variant instead of release.
    #[arg(long, short)]
    pub debug: bool,

    /// Only prepare the native project; do not package it.
    #[arg(long = "skip-pkg")]
    pub skip_package: bool,

    /// Open the native project in its IDE instead of building it.
    #[arg(long)]
    pub ide: bool,

    /// The URL the packaged app should load. Without one, the web assets are bundled.
    #[arg(long)]
    pub url: Option<String>,

    /// Extra arguments for xcodebuild or Gradle, as one shell-style string.
    #[arg(long, allow_hyphen_values = true)]
    pub native_args: Option<String>,

    /// The project root. Defaults to the current directory.
    #[arg(long)]
    pub project: Option<PathBuf>,
}
