// src/core/manifest.rs

use crate::core::{collaborators::ManifestFixer, paths::AppPaths};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io;

lazy_static! {
    static ref APPLICATION_TAG_RE: Regex = Regex::new(r"<application\b").unwrap();
}

const CLEARTEXT_ATTRIBUTE: &str = "android:usesCleartextTraffic";

/// Lets the Android shell load an `http://` dev server by enabling cleartext
/// traffic in `AndroidManifest.xml`.
#[derive(Debug, Clone)]
pub struct CleartextManifestFixer {
    paths: AppPaths,
}

impl CleartextManifestFixer {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }
}

impl ManifestFixer for CleartextManifestFixer {
    fn fix(&self, tool: &str) -> Result<()> {
        let path = self.paths.android_manifest();
        let manifest = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!(
                    "No AndroidManifest.xml at '{}' (has the android platform been added to {}?)",
                    path.display(),
                    tool
                );
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read '{}'", path.display()));
            }
        };

        if let Some(patched) = enable_cleartext(&manifest) {
            fs::write(&path, patched)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            log::info!("Enabled cleartext traffic in '{}'", path.display());
        }
        Ok(())
    }
}

/// Returns the patched manifest, or `None` when the attribute is already present
/// or there is no `<application>` element.
fn enable_cleartext(manifest: &str) -> Option<String> {
    if manifest.contains(CLEARTEXT_ATTRIBUTE) || !APPLICATION_TAG_RE.is_match(manifest) {
        return None;
    }
    let replacement = format!("<application\n        {}=\"true\"", CLEARTEXT_ATTRIBUTE);
    Some(
        APPLICATION_TAG_RE
            .replacen(manifest, 1, replacement.as_str())
            .into_owned(),
    )
}
