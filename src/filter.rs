//! Path classification.
//!
//! Decides, for every visited path, whether it is an eligible source file,
//! lives inside a generated test-output tree, or is excluded by name.

use crate::config::Config;
use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Why a path was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Name is on the explicit denylist
    Denylisted,
    /// Name contains "Test" or "test"
    TestName,
    /// Matched a user-supplied glob pattern
    Pattern,
}

/// Classification of a path, evaluated fresh on every visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Source file that should be sent to the model
    Eligible,
    /// Inside one of the generated test-output directories
    TestOutput,
    /// Excluded by a name rule
    Excluded(ExclusionReason),
    /// Not one of the configured source extensions
    UnsupportedExtension,
}

impl PathClass {
    /// Returns true if the file should be processed.
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Exclusion and eligibility rules built from a [`Config`].
#[derive(Debug, Clone)]
pub struct PathFilter {
    extensions: Vec<String>,
    excluded_files: HashSet<String>,
    test_output_dirs: Vec<String>,
    patterns: GlobSet,
}

impl PathFilter {
    /// Builds the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if an exclude pattern is not a valid glob.
    pub fn new(config: &Config) -> Result<Self> {
        let test_output_dirs = [&config.source_tests_dir, &config.refined_tests_dir]
            .into_iter()
            .filter_map(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        Ok(Self {
            extensions: config.extensions.clone(),
            excluded_files: config.excluded_files.iter().cloned().collect(),
            test_output_dirs,
            patterns: Self::build_globset(&config.exclude_patterns)?,
        })
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::config(format!("Invalid glob pattern '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {e}")))
    }

    /// Classifies a file path. Directory rules only look below `root`.
    #[must_use]
    pub fn classify(&self, path: &Path, root: &Path) -> PathClass {
        if let Some(class) = self.exclusion(path, root) {
            return class;
        }

        if self.has_source_extension(path) {
            PathClass::Eligible
        } else {
            PathClass::UnsupportedExtension
        }
    }

    /// Returns true if the file or directory must not be processed or descended into.
    #[must_use]
    pub fn is_excluded(&self, path: &Path, root: &Path) -> bool {
        self.exclusion(path, root).is_some()
    }

    /// Returns the exclusion class of `path`, or `None` if no rule matches.
    pub(crate) fn exclusion(&self, path: &Path, root: &Path) -> Option<PathClass> {
        let relative = relative_to(path, root);
        if relative.as_os_str().is_empty() {
            return None;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.excluded_files.contains(&*name) {
            return Some(PathClass::Excluded(ExclusionReason::Denylisted));
        }

        let relative_str = relative.to_string_lossy();
        if self
            .test_output_dirs
            .iter()
            .any(|dir| relative_str.contains(dir.as_str()))
        {
            return Some(PathClass::TestOutput);
        }

        // Also matches incidental substrings such as `latest_utils.py`.
        if name.contains("Test") || name.contains("test") {
            return Some(PathClass::Excluded(ExclusionReason::TestName));
        }

        if self.patterns.is_match(&relative) {
            return Some(PathClass::Excluded(ExclusionReason::Pattern));
        }

        None
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }
}

/// Path of `path` relative to `root`, or `path` itself when unrelated.
pub(crate) fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .ok()
        .or_else(|| pathdiff::diff_paths(path, root).filter(|p| !p.starts_with("..")))
        .unwrap_or_else(|| path.to_path_buf())
}
