use crate::{
    client::CompletionClient,
    config::Config,
    error::{Error, Result},
    filter::PathFilter,
    processor::{ArtifactKind, FileProcessor, ProcessOutcome, Target},
    prompt::PromptKind,
    report::{FinalReport, ReportTables},
    retry::RetryingCaller,
    stats::RunStats,
    walker::Walker,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

/// Counters for one traversal.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PassStats {
    /// Pass label
    pub name: &'static str,

    /// Files handed to the processor
    pub processed: usize,

    /// Files with output written
    pub succeeded: usize,

    /// Files excluded by name
    pub skipped: usize,

    /// Files that failed to read, generate or write
    pub failed: usize,

    /// Set when the traversal itself failed
    pub error: Option<String>,
}

impl PassStats {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: ProcessOutcome) {
        self.processed += 1;
        match outcome {
            ProcessOutcome::Skipped => self.skipped += 1,
            ProcessOutcome::Succeeded => self.succeeded += 1,
            ProcessOutcome::Failed => self.failed += 1,
        }
    }
}

/// Outcome of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// One entry per pass, in execution order
    pub passes: Vec<PassStats>,

    /// Statistics of refined files
    pub stats: RunStats,

    /// Total execution time
    pub duration: Duration,

    /// Report tables, if the report was written
    #[serde(skip)]
    pub report: Option<ReportTables>,

    /// Location of the final report
    pub report_path: PathBuf,
}

impl RunSummary {
    /// Total files with output written across all passes.
    #[must_use]
    pub fn total_succeeded(&self) -> usize {
        self.passes.iter().map(|p| p.succeeded).sum()
    }

    /// Total failed files across all passes.
    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.passes.iter().map(|p| p.failed).sum()
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              Refinement Run Summary                   ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        for pass in &self.passes {
            println!("║ {:<54}║", pass.name);
            println!(
                "║   - Succeeded:        {:>8}                        ║",
                pass.succeeded
            );
            println!(
                "║   - Skipped:          {:>8}                        ║",
                pass.skipped
            );
            println!(
                "║   - Failed:           {:>8}                        ║",
                pass.failed
            );
            if let Some(err) = &pass.error {
                println!("║   ! {err}");
            }
        }
        println!("║                                                       ║");
        println!(
            "║ Files Refined:        {:>8}                        ║",
            self.stats.total_files
        );
        println!(
            "║ LOC Converted:        {:>8}                        ║",
            self.stats.total_loc
        );
        for (ext, loc) in &self.stats.loc_by_extension {
            println!("║   - {:<17}{:>8} LOC                    ║", ext, loc);
        }
        println!("║                                                       ║");
        println!("║ Report:                                               ║");
        println!("║   {}", self.report_path.display());
        println!(
            "║ Total Time:           {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// One traversal: an input root and what to make of its files.
struct Pass {
    name: &'static str,
    input_root: PathBuf,
    skip: Vec<PathBuf>,
    target: Target,
}

/// Runs the three refinement passes and writes the final report.
pub struct Pipeline<C> {
    config: Config,
    caller: RetryingCaller<C>,
    filter: PathFilter,
}

impl<C: CompletionClient> Pipeline<C> {
    /// Creates a new pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: Config, client: C) -> Result<Self> {
        config.validate()?;

        let filter = PathFilter::new(&config)?;
        let caller = RetryingCaller::new(client, config.retry.clone(), config.api.temperature);

        Ok(Self {
            config,
            caller,
            filter,
        })
    }

    /// Executes the run.
    ///
    /// # Process
    ///
    /// 1. **Prepare**: recreates the refined directory, ensures the test directories
    /// 2. **Source tests**: generates tests for every project file
    /// 3. **Refine**: refactors every project file into the refined directory
    /// 4. **Refined tests**: generates tests for the refined files
    /// 5. **Report**: merges this run into `final_overview.csv`
    ///
    /// Per-file and per-pass failures are logged and never abort the run.
    /// The report is written however the passes ended.
    ///
    /// # Errors
    ///
    /// Returns an error only if the output directories cannot be prepared.
    #[instrument(skip(self), fields(project_root = %self.config.project_root.display()))]
    pub fn run(self) -> Result<RunSummary> {
        let start_time = Instant::now();
        info!("Starting refinement run");

        self.prepare_directories()?;

        let mut stats = RunStats::new();
        let processor = FileProcessor::new(&self.config, &self.filter, &self.caller);

        let passes = self.passes();
        let total = passes.len();
        let mut pass_stats = Vec::with_capacity(total);
        for (index, pass) in passes.iter().enumerate() {
            info!("Pass {}/{}: {}", index + 1, total, pass.name);
            let result = self.run_pass(pass, &processor, &mut stats);
            info!(
                "✓ {}: {} succeeded, {} skipped, {} failed",
                pass.name, result.succeeded, result.skipped, result.failed
            );
            pass_stats.push(result);
        }

        let report = FinalReport::new(&self.config.final_report);
        let tables = match report.generate(&stats, stats.elapsed()) {
            Ok(tables) => Some(tables),
            Err(e) => {
                error!("Error generating final report: {}", e);
                None
            }
        };

        let duration = start_time.elapsed();
        info!("✓ Refinement run completed in {:.2}s", duration.as_secs_f64());

        Ok(RunSummary {
            passes: pass_stats,
            stats,
            duration,
            report: tables,
            report_path: report.path().to_path_buf(),
        })
    }

    fn prepare_directories(&self) -> Result<()> {
        let refined = &self.config.refined_dir;
        if refined.exists() {
            fs::remove_dir_all(refined).map_err(|e| Error::io(refined, e))?;
        }

        for dir in [
            refined,
            &self.config.source_tests_dir,
            &self.config.refined_tests_dir,
        ] {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }

        info!("Output directories ready under {}", self.config.project_root.display());
        Ok(())
    }

    fn passes(&self) -> Vec<Pass> {
        let config = &self.config;
        vec![
            Pass {
                name: "Generating tests for original sources",
                input_root: config.project_root.clone(),
                skip: vec![config.refined_dir.clone(), config.source_tests_dir.clone()],
                target: Target {
                    prompt: PromptKind::GenerateTests,
                    output_dir: config.source_tests_dir.clone(),
                    artifact: ArtifactKind::Test,
                },
            },
            Pass {
                name: "Refining sources",
                input_root: config.project_root.clone(),
                skip: vec![config.refined_dir.clone(), config.source_tests_dir.clone()],
                target: Target {
                    prompt: PromptKind::Refactor,
                    output_dir: config.refined_dir.clone(),
                    artifact: ArtifactKind::Refined,
                },
            },
            Pass {
                name: "Generating tests for refined sources",
                input_root: config.refined_dir.clone(),
                skip: vec![config.refined_tests_dir.clone()],
                target: Target {
                    prompt: PromptKind::GenerateTests,
                    output_dir: config.refined_tests_dir.clone(),
                    artifact: ArtifactKind::Test,
                },
            },
        ]
    }

    fn run_pass(
        &self,
        pass: &Pass,
        processor: &FileProcessor<'_, C>,
        stats: &mut RunStats,
    ) -> PassStats {
        let mut result = PassStats::new(pass.name);

        let walker = pass
            .skip
            .iter()
            .fold(Walker::new(&pass.input_root, &self.filter), |w, dir| w.skip(dir));

        let files = match walker.files() {
            Ok(files) => files,
            Err(e) => {
                error!("Error walking {}: {}", walker.root().display(), e);
                result.error = Some(e.to_string());
                return result;
            }
        };

        for file in files {
            let outcome = processor.process_file(&file, walker.root(), &pass.target, stats);
            result.record(outcome);
        }

        result
    }
}
