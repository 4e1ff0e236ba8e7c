use crate::error::{Error, Result};
use crate::filter::{ExclusionReason, PathClass, PathFilter};
use ignore::{DirEntry, WalkBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Recursive, deterministic traversal of one input root.
///
/// Skip roots, test-output trees and pattern-excluded directories are pruned
/// before descent. A directory excluded by name is still descended into, but
/// the files directly inside it are dropped. Files with an unsupported
/// extension are dropped; excluded files are still yielded so the processor
/// can report them as skipped.
pub(crate) struct Walker<'a> {
    root: PathBuf,
    skip_roots: Vec<PathBuf>,
    filter: &'a PathFilter,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(root: impl Into<PathBuf>, filter: &'a PathFilter) -> Self {
        Self {
            root: root.into(),
            skip_roots: Vec::new(),
            filter,
        }
    }

    /// Never descends into `dir`.
    pub(crate) fn skip(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skip_roots.push(dir.into());
        self
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Returns candidate files in file-name order.
    ///
    /// # Errors
    ///
    /// Returns an error if the root itself cannot be read. Errors below the
    /// root are logged and the affected entries skipped.
    pub(crate) fn files(&self) -> Result<Vec<PathBuf>> {
        std::fs::read_dir(&self.root).map_err(|e| Error::io(&self.root, e))?;

        debug!("Walking {}", self.root.display());

        let root = self.root.clone();
        let skip_roots = self.skip_roots.clone();
        let filter = self.filter.clone();

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| keep_entry(entry, &root, &skip_roots, &filter))
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            if self.in_excluded_directory(path) {
                trace!("Ignoring {} in excluded directory", path.display());
                continue;
            }

            match self.filter.classify(path, &self.root) {
                PathClass::UnsupportedExtension => {
                    trace!("Ignoring {}", path.display());
                }
                _ => files.push(entry.into_path()),
            }
        }

        debug!("Found {} candidate files under {}", files.len(), self.root.display());
        Ok(files)
    }

    fn in_excluded_directory(&self, path: &Path) -> bool {
        path.parent()
            .is_some_and(|dir| self.filter.exclusion(dir, &self.root).is_some())
    }
}

fn keep_entry(entry: &DirEntry, root: &Path, skip_roots: &[PathBuf], filter: &PathFilter) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_some_and(|ft| ft.is_dir()) {
        return true;
    }

    let path = entry.path();
    if skip_roots.iter().any(|skip| path == skip.as_path()) {
        info!("Skipping directory: {}", path.display());
        return false;
    }

    let prune = match filter.exclusion(path, root) {
        None => return true,
        Some(class) => matches!(
            class,
            PathClass::TestOutput | PathClass::Excluded(ExclusionReason::Pattern)
        ),
    };

    info!("Skipping directory: {}", path.display());
    !prune
}
