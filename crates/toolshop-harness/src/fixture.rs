//! Fixture file resolution.
//!
//! Upload tests need a real file on disk. [`FixtureFiles`] resolves names
//! relative to a fixture root and fails with [`HarnessError::Fixture`]
//! when a file is missing, so a broken checkout shows up before the
//! browser is asked to attach anything.

use crate::result::{HarnessError, HarnessResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory holding fixture files, relative to the crate root
pub const FIXTURE_DIR: &str = "tests/fixtures";

/// Attachment used by the contact form tests
pub const CONTACT_ATTACHMENT: &str = "data/test-data.txt";

/// Resolver for files under a fixture root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureFiles {
    root: PathBuf,
}

impl FixtureFiles {
    /// Resolver rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolver for `tests/fixtures` of the crate being built
    #[must_use]
    pub fn from_manifest_dir() -> Self {
        Self::new(Path::new(env!("CARGO_MANIFEST_DIR")).join(FIXTURE_DIR))
    }

    /// Fixture root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an existing fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Fixture`] if the file does not exist or the
    /// name escapes the fixture root.
    pub fn path(&self, name: impl AsRef<Path>) -> HarnessResult<PathBuf> {
        let name = name.as_ref();
        if name.is_absolute() || name.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(HarnessError::Fixture {
                message: format!("{} is outside the fixture root", name.display()),
            });
        }
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(HarnessError::Fixture {
                message: format!("missing fixture file {}", path.display()),
            });
        }
        debug!(path = %path.display(), "resolved fixture");
        Ok(path)
    }

    /// Contents of a fixture file
    pub fn read_to_string(&self, name: impl AsRef<Path>) -> HarnessResult<String> {
        let path = self.path(name)?;
        Ok(std::fs::read_to_string(path)?)
    }
}

impl Default for FixtureFiles {
    fn default() -> Self {
        Self::from_manifest_dir()
    }
}
