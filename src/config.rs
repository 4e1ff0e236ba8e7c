use crate::error::{Error, Result};
use crate::filter::PathFilter;
use crate::retry::RetryPolicy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MODEL: &str = "deepseek-r1-distill-qwen-32b";
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_TIMEOUT_SECS: u64 = 180;

const DEFAULT_REFINED_DIR: &str = "GreenCode";
const DEFAULT_SOURCE_TESTS_DIR: &str = "SRC-TestSuites";
const DEFAULT_REFINED_TESTS_DIR: &str = "GreenCode-TestSuites";
const DEFAULT_TEST_SUFFIX: &str = "Test";
const DEFAULT_LOG_FILE: &str = "refinement.log";
const DEFAULT_MODIFICATION_LOG: &str = "modification_overview.csv";
const DEFAULT_FINAL_REPORT: &str = "final_overview.csv";

/// Environment variable holding the API credential.
pub const API_KEY_VAR: &str = "GROQ_API_KEY";
/// Environment variable overriding the model name.
pub const MODEL_VAR: &str = "GROQ_MODEL";
/// Environment variable overriding the API base URL.
pub const BASE_URL_VAR: &str = "GROQ_BASE_URL";

/// Source extensions processed by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".py", ".java", ".js", ".ts"];

/// File names never sent to the model.
pub const DEFAULT_EXCLUDED_FILES: &[&str] = &[
    "GreenCodeRefiner.py",
    "RefinerFunction.py",
    "server_emissions.py",
    "track_emissions.py",
    "report_template.html",
    "details_template.html",
    "emissions_report.html",
    "details_report.html",
    "last_run_details_template.html",
    "last_run_report_template.html",
    "server_report.html",
    "AzureMarketplace.py",
    "details_server_template.html",
    "recommendations_template.html",
    "code_refiner.py",
    "recommendations_report.html",
    "groq_code_processor.py",
    "mul_server_emissions.py",
];

/// Settings for the model API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Bearer token sent with every request
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Timeout for a single HTTP request
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Configuration for a refinement run.
///
/// Use [`Config::builder()`] or [`Config::from_env_file()`] to construct one.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Project root; source passes walk this directory
    pub project_root: PathBuf,

    /// Output root for refined code (cleared at the start of every run)
    pub refined_dir: PathBuf,

    /// Output root for tests generated from the original sources
    pub source_tests_dir: PathBuf,

    /// Output root for tests generated from the refined sources
    pub refined_tests_dir: PathBuf,

    /// Eligible extensions, with leading dot
    pub extensions: Vec<String>,

    /// File names that are never processed
    pub excluded_files: Vec<String>,

    /// Extra glob patterns excluding paths relative to the walked root
    pub exclude_patterns: Vec<String>,

    /// Inserted before the extension of generated test files
    pub test_suffix: String,

    /// Model API settings
    pub api: ApiConfig,

    /// Retry behaviour around each API call
    pub retry: RetryPolicy,

    /// Human-readable run log
    pub log_file: PathBuf,

    /// Append-only per-file modification CSV
    pub modification_log: PathBuf,

    /// Cross-run aggregate report CSV
    pub final_report: PathBuf,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use code_refiner::Config;
    ///
    /// let config = Config::builder()
    ///     .project_root("./project")
    ///     .api_key("gsk_...")
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Loads a dotenv file and returns a builder seeded from it.
    ///
    /// The project root is the directory containing the file. Values in the
    /// file take precedence over the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be parsed.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<ConfigBuilder> {
        let path = path.as_ref();
        let path = std::path::absolute(path).map_err(|e| Error::io(path, e))?;

        if !path.is_file() {
            return Err(Error::config(format!(
                "Environment file does not exist: {}",
                path.display()
            )));
        }

        let mut values = HashMap::new();
        let entries = dotenvy::from_path_iter(&path)
            .map_err(|e| Error::config(format!("Failed to read {}: {e}", path.display())))?;
        for entry in entries {
            let (key, value) = entry
                .map_err(|e| Error::config(format!("Failed to parse {}: {e}", path.display())))?;
            values.insert(key, value);
        }

        let lookup = |key: &str| {
            values
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
                .filter(|v| !v.trim().is_empty())
        };

        let project_root = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::config("Environment file has no parent directory"))?;

        let mut builder = Self::builder().project_root(project_root);
        if let Some(key) = lookup(API_KEY_VAR) {
            builder = builder.api_key(key);
        }
        if let Some(model) = lookup(MODEL_VAR) {
            builder = builder.model(model);
        }
        if let Some(url) = lookup(BASE_URL_VAR) {
            builder = builder.base_url(url);
        }

        Ok(builder)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Project root doesn't exist or is not a directory
    /// - The API key is missing
    /// - Extensions, retry policy or temperature are invalid
    /// - An exclude pattern is not a valid glob
    pub fn validate(&self) -> Result<()> {
        if !self.project_root.exists() {
            return Err(Error::config(format!(
                "Project root does not exist: {}",
                self.project_root.display()
            )));
        }

        if !self.project_root.is_dir() {
            return Err(Error::config(format!(
                "Project root is not a directory: {}",
                self.project_root.display()
            )));
        }

        if self.api.api_key.trim().is_empty() {
            return Err(Error::config(format!(
                "API key is missing. Set {API_KEY_VAR} in the environment file"
            )));
        }

        if self.extensions.is_empty() {
            return Err(Error::config("At least one source extension is required"));
        }

        if let Some(ext) = self.extensions.iter().find(|ext| !ext.starts_with('.')) {
            return Err(Error::config(format!(
                "Extension '{ext}' must start with a dot"
            )));
        }

        if self.test_suffix.is_empty() {
            return Err(Error::config("test_suffix must not be empty"));
        }

        if !(0.0..=2.0).contains(&self.api.temperature) {
            return Err(Error::config(format!(
                "temperature ({}) must be between 0.0 and 2.0",
                self.api.temperature
            )));
        }

        self.retry.validate()?;
        PathFilter::new(self)?;

        Ok(())
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    project_root: Option<PathBuf>,
    refined_dir: Option<PathBuf>,
    source_tests_dir: Option<PathBuf>,
    refined_tests_dir: Option<PathBuf>,
    extensions: Option<Vec<String>>,
    excluded_files: Option<Vec<String>>,
    exclude_patterns: Vec<String>,
    test_suffix: Option<String>,
    api: ApiConfig,
    retry: Option<RetryPolicy>,
    log_file: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Sets the project root.
    #[must_use]
    pub fn project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Sets the refined-code output directory.
    #[must_use]
    pub fn refined_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.refined_dir = Some(path.into());
        self
    }

    /// Sets the output directory for tests of the original sources.
    #[must_use]
    pub fn source_tests_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_tests_dir = Some(path.into());
        self
    }

    /// Sets the output directory for tests of the refined sources.
    #[must_use]
    pub fn refined_tests_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.refined_tests_dir = Some(path.into());
        self
    }

    /// Sets the eligible extensions (with leading dot).
    #[must_use]
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Replaces the file name denylist.
    #[must_use]
    pub fn excluded_files(mut self, names: Vec<String>) -> Self {
        self.excluded_files = Some(names);
        self
    }

    /// Adds glob patterns excluding paths from processing.
    #[must_use]
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Sets the suffix inserted into generated test file names.
    #[must_use]
    pub fn test_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.test_suffix = Some(suffix.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api.api_key = key.into();
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.api.model = model.into();
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.api.temperature = temperature;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.api.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sets the run log path.
    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Builds the configuration.
    ///
    /// Output locations default to fixed names under the project root.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let project_root = self.project_root.unwrap_or_else(|| PathBuf::from("."));
        let refined_dir = self
            .refined_dir
            .unwrap_or_else(|| project_root.join(DEFAULT_REFINED_DIR));
        let refined_tests_dir = self
            .refined_tests_dir
            .unwrap_or_else(|| refined_dir.join(DEFAULT_REFINED_TESTS_DIR));

        let config = Config {
            source_tests_dir: self
                .source_tests_dir
                .unwrap_or_else(|| project_root.join(DEFAULT_SOURCE_TESTS_DIR)),
            extensions: self
                .extensions
                .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect()),
            excluded_files: self.excluded_files.unwrap_or_else(|| {
                DEFAULT_EXCLUDED_FILES
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
            exclude_patterns: self.exclude_patterns,
            test_suffix: self
                .test_suffix
                .unwrap_or_else(|| DEFAULT_TEST_SUFFIX.to_string()),
            api: self.api,
            retry: self.retry.unwrap_or_default(),
            log_file: self
                .log_file
                .unwrap_or_else(|| project_root.join(DEFAULT_LOG_FILE)),
            modification_log: project_root.join(DEFAULT_MODIFICATION_LOG),
            final_report: project_root.join(DEFAULT_FINAL_REPORT),
            refined_dir,
            refined_tests_dir,
            project_root,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_default_config() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder()
            .project_root(temp.path())
            .api_key("key")
            .build()
            .unwrap();

        assert_eq!(config.api.model, DEFAULT_MODEL);
        assert!((config.api.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.refined_dir, temp.path().join("GreenCode"));
        assert_eq!(
            config.refined_tests_dir,
            temp.path().join("GreenCode").join("GreenCode-TestSuites")
        );
        assert_eq!(config.source_tests_dir, temp.path().join("SRC-TestSuites"));
        assert_eq!(config.final_report, temp.path().join("final_overview.csv"));
        assert_eq!(config.extensions, vec![".py", ".java", ".js", ".ts"]);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_invalid_project_root() {
        let result = Config::builder()
            .project_root("/nonexistent/path/that/should/not/exist")
            .api_key("key")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = Config::builder()
            .project_root(temp.path())
            .build()
            .unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[test]
    fn test_extension_without_dot() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = Config::builder()
            .project_root(temp.path())
            .api_key("key")
            .extensions(vec!["py".to_string()])
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = Config::builder()
            .project_root(temp.path())
            .api_key("key")
            .exclude_patterns(vec!["a[".to_string()])
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_from_env_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let env = temp.child(".env");
        env.write_str("GROQ_API_KEY=from-file\nGROQ_MODEL=llama-3.3-70b-versatile\n")
            .unwrap();

        let config = Config::from_env_file(env.path()).unwrap().build().unwrap();

        assert_eq!(config.api.api_key, "from-file");
        assert_eq!(config.api.model, "llama-3.3-70b-versatile");
        assert_eq!(config.project_root, temp.path());
    }

    #[test]
    fn test_from_missing_env_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = Config::from_env_file(temp.path().join(".env"));
        assert!(result.unwrap_err().is_config());
    }
}
