//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services. The
//! core never reads process-wide environment variables itself; the binary does that and hands
//! the result over.

use crate::constants::{NARRATIVE_TEMPLATE_DIR, TEMPLATE_MANIFEST_FILENAME};
use crate::{NarrativeError, NarrativeResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    template_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`NarrativeError::TemplateDirNotFound`] if `template_dir` has no manifest.
    pub fn new(template_dir: PathBuf) -> NarrativeResult<Self> {
        if !looks_like_template_dir(&template_dir) {
            return Err(NarrativeError::TemplateDirNotFound(format!(
                "{} does not contain {TEMPLATE_MANIFEST_FILENAME}",
                template_dir.display()
            )));
        }

        Ok(Self { template_dir })
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.template_dir.join(TEMPLATE_MANIFEST_FILENAME)
    }
}

fn looks_like_template_dir(path: &Path) -> bool {
    path.is_dir() && path.join(TEMPLATE_MANIFEST_FILENAME).is_file()
}

/// Resolve the narrative template directory without reading environment variables.
///
/// If `override_dir` is provided, it must be a directory containing `manifest.yaml`.
/// Otherwise this searches for `narrative-templates/` relative to the current working
/// directory and then walks up from `CARGO_MANIFEST_DIR`.
pub fn resolve_template_dir(override_dir: Option<PathBuf>) -> NarrativeResult<PathBuf> {
    if let Some(template_dir) = override_dir {
        if looks_like_template_dir(&template_dir) {
            return Ok(template_dir);
        }
        return Err(NarrativeError::TemplateDirNotFound(format!(
            "override {} is not a template directory (must contain {TEMPLATE_MANIFEST_FILENAME})",
            template_dir.display()
        )));
    }

    let cwd_relative = PathBuf::from(NARRATIVE_TEMPLATE_DIR);
    if looks_like_template_dir(&cwd_relative) {
        return Ok(cwd_relative);
    }

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for ancestor in manifest_dir.ancestors() {
        let candidate = ancestor.join(NARRATIVE_TEMPLATE_DIR);
        if looks_like_template_dir(&candidate) {
            return Ok(candidate);
        }
    }

    Err(NarrativeError::TemplateDirNotFound(format!(
        "no {NARRATIVE_TEMPLATE_DIR}/ directory with {TEMPLATE_MANIFEST_FILENAME}"
    )))
}
