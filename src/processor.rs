//! Per-file refinement: read, ask the model, clean, write, record.

use crate::client::CompletionClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::{PathClass, PathFilter, relative_to};
use crate::prompt::{CHANGES_END, CHANGES_START, NEXT_STEPS_END, NEXT_STEPS_START, PromptKind};
use crate::report::{ModificationLog, ModificationRecord};
use crate::response::{clean_code_content, extract_section};
use crate::retry::RetryingCaller;
use crate::source::{SourceFile, count_lines, dotted_extension, write_file_atomic};
use crate::stats::RunStats;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What a processed file turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Generated unit tests; named with the test suffix and not counted
    Test,
    /// Refactored source; counted in run statistics and logged to CSV
    Refined,
}

/// Result of processing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Excluded by a name or directory rule
    Skipped,
    /// Output written
    Succeeded,
    /// Read, model or write failure; nothing counted
    Failed,
}

/// Where and how the files of one pass are processed.
#[derive(Debug, Clone)]
pub struct Target {
    /// Prompt sent with every file
    pub prompt: PromptKind,
    /// Root under which outputs mirror the project layout
    pub output_dir: PathBuf,
    /// Kind of artifact written
    pub artifact: ArtifactKind,
}

/// Processes single files against the model.
pub struct FileProcessor<'a, C> {
    config: &'a Config,
    filter: &'a PathFilter,
    caller: &'a RetryingCaller<C>,
    modification_log: ModificationLog,
}

impl<'a, C: CompletionClient> FileProcessor<'a, C> {
    /// Creates a processor.
    pub fn new(config: &'a Config, filter: &'a PathFilter, caller: &'a RetryingCaller<C>) -> Self {
        Self {
            config,
            filter,
            caller,
            modification_log: ModificationLog::new(&config.modification_log),
        }
    }

    /// Processes `path`, found while walking `walk_root`.
    ///
    /// Never returns an error: every failure is logged and reported as
    /// [`ProcessOutcome::Failed`].
    pub fn process_file(
        &self,
        path: &Path,
        walk_root: &Path,
        target: &Target,
        stats: &mut RunStats,
    ) -> ProcessOutcome {
        match self.filter.classify(path, walk_root) {
            PathClass::Eligible => {}
            class => {
                info!("Skipping excluded file: {} ({:?})", path.display(), class);
                return ProcessOutcome::Skipped;
            }
        }

        match self.try_process(path, target, stats) {
            Ok(output) => {
                info!("Generated {}: {}", target.prompt, output.display());
                ProcessOutcome::Succeeded
            }
            Err(e @ Error::Api { .. }) => {
                error!("Model request failed for {}: {}", path.display(), e);
                ProcessOutcome::Failed
            }
            Err(e) => {
                error!("Error processing {}: {}", path.display(), e);
                ProcessOutcome::Failed
            }
        }
    }

    fn try_process(&self, path: &Path, target: &Target, stats: &mut RunStats) -> Result<PathBuf> {
        info!("Processing file: {}", path.display());

        let source = SourceFile::read(path)?;
        debug!("Original LOC for {}: {}", source.file_name(), source.line_count());

        let response = self
            .caller
            .call(target.prompt.template(), &source.content)?;

        let code = clean_code_content(&response);
        if code.trim().is_empty() {
            warn!("Model returned no code for {}", path.display());
        }
        let changes = extract_section(&response, CHANGES_START, CHANGES_END);
        let next_steps = extract_section(&response, NEXT_STEPS_START, NEXT_STEPS_END);

        let output = self.output_path(path, target);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        write_file_atomic(&output, &code)?;

        if target.artifact == ArtifactKind::Refined {
            let loc = count_lines(&code) as u64;
            stats.record_file(&source.extension(), loc);
            debug!("Refined LOC for {}: {}", source.file_name(), loc);

            let record = ModificationRecord::new(source.file_name(), changes, next_steps);
            if let Err(e) = self.modification_log.append(&record) {
                error!("Failed to log modification of {}: {}", path.display(), e);
            }
        }

        Ok(output)
    }

    /// Mirrors `path` under the target's output directory.
    ///
    /// The layout is taken relative to the project root, so
    /// `GreenCode/a.py` tested into `GreenCode/GreenCode-TestSuites` becomes
    /// `GreenCode/GreenCode-TestSuites/GreenCode/aTest.py`.
    fn output_path(&self, path: &Path, target: &Target) -> PathBuf {
        let relative = relative_to(path, &self.config.project_root);
        let mirrored = target.output_dir.join(relative);

        match target.artifact {
            ArtifactKind::Refined => mirrored,
            ArtifactKind::Test => with_name_suffix(&mirrored, &self.config.test_suffix),
        }
    }
}

/// Inserts `suffix` between the file stem and its extension.
fn with_name_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{stem}{suffix}{}", dotted_extension(path));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockClient;
    use crate::client::{ApiError, ApiErrorKind};
    use crate::retry::RetryPolicy;
    use assert_fs::prelude::*;

    const RESPONSE: &str = "<think>hmm</think>\n\
        Here is the refactored code:\n\
        ```python\nprint(1)\nprint(2)\n```\n\
        CHANGES_START\n- Simplified output\nCHANGES_END\n\
        NEXT_STEPS_START\n- Add logging\nNEXT_STEPS_END\n";

    fn create_config(root: &Path) -> Config {
        Config::builder()
            .project_root(root)
            .api_key("key")
            .retry(RetryPolicy::immediate(5))
            .build()
            .unwrap()
    }

    fn target(config: &Config, artifact: ArtifactKind) -> Target {
        match artifact {
            ArtifactKind::Refined => Target {
                prompt: PromptKind::Refactor,
                output_dir: config.refined_dir.clone(),
                artifact,
            },
            ArtifactKind::Test => Target {
                prompt: PromptKind::GenerateTests,
                output_dir: config.source_tests_dir.clone(),
                artifact,
            },
        }
    }

    #[test]
    fn test_with_name_suffix() {
        assert_eq!(with_name_suffix(Path::new("out/a.py"), "Test"), Path::new("out/aTest.py"));
        assert_eq!(with_name_suffix(Path::new("Makefile"), "Test"), Path::new("MakefileTest"));
    }

    #[test]
    fn test_refined_file_is_written_counted_and_logged() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("pkg/a.py").write_str("print( 1 )\nprint( 2 )\n").unwrap();
        let config = create_config(temp.path());
        let filter = PathFilter::new(&config).unwrap();
        let client = MockClient::new(|_| Ok(RESPONSE.to_string()));
        let caller = RetryingCaller::new(&client, config.retry.clone(), config.api.temperature);
        let processor = FileProcessor::new(&config, &filter, &caller);
        let mut stats = RunStats::new();

        let outcome = processor.process_file(
            &temp.path().join("pkg/a.py"),
            temp.path(),
            &target(&config, ArtifactKind::Refined),
            &mut stats,
        );

        assert_eq!(outcome, ProcessOutcome::Succeeded);
        temp.child("GreenCode/pkg/a.py").assert("print(1)\nprint(2)");
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.total_loc, 2);
        assert_eq!(stats.loc_by_extension[".py"], 2);

        let log = fs::read_to_string(&config.modification_log).unwrap();
        assert!(log.starts_with("File Name,Modification Timestamp,Changes,Next Steps"));
        assert!(log.contains("a.py"));
        assert!(log.contains("Simplified output"));
        assert!(log.contains("Add logging"));
    }

    #[test]
    fn test_test_artifact_is_not_counted() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.py").write_str("x = 1\n").unwrap();
        let config = create_config(temp.path());
        let filter = PathFilter::new(&config).unwrap();
        let client = MockClient::new(|_| Ok("```\nassert True\n```".to_string()));
        let caller = RetryingCaller::new(&client, config.retry.clone(), config.api.temperature);
        let processor = FileProcessor::new(&config, &filter, &caller);
        let mut stats = RunStats::new();

        let outcome = processor.process_file(
            &temp.path().join("a.py"),
            temp.path(),
            &target(&config, ArtifactKind::Test),
            &mut stats,
        );

        assert_eq!(outcome, ProcessOutcome::Succeeded);
        temp.child("SRC-TestSuites/aTest.py").assert("assert True");
        assert_eq!(stats.total_files, 0);
        assert!(!config.modification_log.exists());
        assert!(client.requests.borrow()[0].message.contains("unit test"));
    }

    #[test]
    fn test_excluded_file_is_skipped_without_call() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("aTest.py").write_str("x = 1\n").unwrap();
        let config = create_config(temp.path());
        let filter = PathFilter::new(&config).unwrap();
        let client = MockClient::new(|_| Ok(RESPONSE.to_string()));
        let caller = RetryingCaller::new(&client, config.retry.clone(), config.api.temperature);
        let processor = FileProcessor::new(&config, &filter, &caller);
        let mut stats = RunStats::new();

        let outcome = processor.process_file(
            &temp.path().join("aTest.py"),
            temp.path(),
            &target(&config, ArtifactKind::Refined),
            &mut stats,
        );

        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn test_exhausted_retries_write_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.py").write_str("x = 1\n").unwrap();
        let config = create_config(temp.path());
        let filter = PathFilter::new(&config).unwrap();
        let client = MockClient::new(|_| Err(ApiError::new(ApiErrorKind::RateLimited, "429")));
        let caller = RetryingCaller::new(&client, config.retry.clone(), config.api.temperature);
        let processor = FileProcessor::new(&config, &filter, &caller);
        let mut stats = RunStats::new();

        let outcome = processor.process_file(
            &temp.path().join("a.py"),
            temp.path(),
            &target(&config, ArtifactKind::Refined),
            &mut stats,
        );

        assert_eq!(outcome, ProcessOutcome::Failed);
        assert_eq!(client.call_count(), 5);
        assert!(!temp.child("GreenCode/a.py").path().exists());
        assert!(!config.modification_log.exists());
        assert_eq!(stats.total_files, 0);
    }

    #[test]
    fn test_unreadable_file_fails() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.py").write_binary(&[0xff, 0xfe, 0x80]).unwrap();
        let config = create_config(temp.path());
        let filter = PathFilter::new(&config).unwrap();
        let client = MockClient::new(|_| Ok(RESPONSE.to_string()));
        let caller = RetryingCaller::new(&client, config.retry.clone(), config.api.temperature);
        let processor = FileProcessor::new(&config, &filter, &caller);
        let mut stats = RunStats::new();

        let outcome = processor.process_file(
            &temp.path().join("a.py"),
            temp.path(),
            &target(&config, ArtifactKind::Refined),
            &mut stats,
        );

        assert_eq!(outcome, ProcessOutcome::Failed);
        assert_eq!(client.call_count(), 0);
    }
}
