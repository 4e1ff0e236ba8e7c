use anyhow::Context;
use clap::Parser;
use code_refiner::{Config, GroqClient, Pipeline, RetryOn, RetryPolicy};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "code-refiner",
    version,
    author,
    about = "Refactor a source tree with an LLM and generate unit tests",
    long_about = "Refactor a source tree with an LLM and generate unit tests.\n\n\
    The project root is the directory containing the environment file. Three passes run \
    in order: tests for the original sources (SRC-TestSuites), refactored sources \
    (GreenCode), and tests for the refactored sources (GreenCode/GreenCode-TestSuites). \
    Every refactored file is logged to modification_overview.csv and run totals are \
    merged into final_overview.csv.\n\n\
    USAGE EXAMPLES:\n  \
      # Refine the project next to ./.env\n  \
      code-refiner\n\n  \
      # Use another project and model\n  \
      code-refiner --env-file ../service/.env --model llama-3.3-70b-versatile\n\n  \
      # Skip vendored code\n  \
      code-refiner --exclude 'vendor/**' --exclude '**/*.min.js'"
)]
struct Cli {
    /// Environment file holding GROQ_API_KEY; its directory is the project root
    #[arg(long, default_value = ".env", value_name = "FILE")]
    env_file: PathBuf,

    /// Model name (overrides GROQ_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible API (overrides GROQ_BASE_URL)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Attempts per file before giving up
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Glob of paths to exclude, relative to the walked root (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Retry only rate limits and transient errors; fail fast on the rest
    #[arg(long)]
    transient_only: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut builder = Config::from_env_file(&cli.env_file)
        .with_context(|| format!("Failed to load {}", cli.env_file.display()))?
        .exclude_patterns(cli.exclude)
        .retry(RetryPolicy {
            max_attempts: cli.max_attempts,
            retry_on: if cli.transient_only {
                RetryOn::Transient
            } else {
                RetryOn::AnyError
            },
            ..RetryPolicy::default()
        });

    if let Some(model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(temperature) = cli.temperature {
        builder = builder.temperature(temperature);
    }

    let config = builder.build().context("Failed to build configuration")?;

    setup_tracing(cli.verbose, &config.log_file)?;

    let client = GroqClient::new(&config.api).context("Failed to create API client")?;
    tracing::info!("Using model {}", client.model());

    let summary = Pipeline::new(config, client)
        .context("Failed to create pipeline")?
        .run()
        .context("Refinement run failed")?;

    summary.print_summary();

    Ok(())
}

fn setup_tracing(verbosity: u8, log_file: &Path) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("code_refiner=info"),
        1 => EnvFilter::new("code_refiner=debug"),
        _ => EnvFilter::new("code_refiner=trace"),
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();

    Ok(())
}
