//! CSV bookkeeping: the per-file modification log and the cross-run report.
//!
//! # Report layout
//!
//! ```text
//! === Last Run ===
//! Metric,Value
//! Total Files Modified (Last run),3
//! Total LOC Converted (Last run),120
//! Total Time (minutes) (Last run),1.25
//! .py Files (last run),120 LOC
//!
//! === Historical Overview ===
//! Metric,Value
//! Total Files Modified,9
//! Total LOC Converted,360 LOC
//! Total Time (minutes),3.5
//! .py Files,360 LOC
//! ```

use crate::error::{Error, Result};
use crate::stats::{RunStats, minutes_rounded, round2};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const MODIFICATION_HEADERS: [&str; 4] = [
    "File Name",
    "Modification Timestamp",
    "Changes",
    "Next Steps",
];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SECTION_PREFIX: &str = "===";
const LAST_RUN_SECTION: &str = "=== Last Run ===";
const HISTORICAL_SECTION: &str = "=== Historical Overview ===";
const LOC_UNIT: &str = " LOC";

const FILES_MODIFIED: &str = "Total Files Modified";
const LOC_CONVERTED: &str = "Total LOC Converted";
const TIME_MINUTES: &str = "Total Time (minutes)";
const EXTENSION_SUFFIX: &str = " Files";

/// Neutralizes spreadsheet formula injection.
///
/// Text beginning with `=`, `-`, `+` or `@` is prefixed with `'`.
#[must_use]
pub fn sanitize(text: &str) -> String {
    if text.starts_with(['=', '-', '+', '@']) {
        format!("'{text}")
    } else {
        text.to_string()
    }
}

/// One row of the modification log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationRecord {
    /// Base name of the refined file
    pub file_name: String,
    /// Local time the record was created
    pub timestamp: String,
    /// Change description extracted from the response
    pub changes: String,
    /// Follow-up recommendation extracted from the response
    pub next_steps: String,
}

impl ModificationRecord {
    /// Creates a record stamped with the current local time.
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        changes: impl Into<String>,
        next_steps: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            changes: changes.into(),
            next_steps: next_steps.into(),
        }
    }

    fn to_row(&self) -> [String; 4] {
        [
            sanitize(&self.file_name),
            self.timestamp.clone(),
            sanitize(&self.changes),
            sanitize(&self.next_steps),
        ]
    }
}

/// Append-only CSV of refined files.
#[derive(Debug, Clone)]
pub struct ModificationLog {
    path: PathBuf,
}

impl ModificationLog {
    /// Creates a log writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, writing the header first if the file is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub fn append(&self, record: &ModificationRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;

        let is_empty = file
            .metadata()
            .map_err(|e| Error::io(&self.path, e))?
            .len()
            == 0;

        let mut writer = csv::Writer::from_writer(file);
        if is_empty {
            writer
                .write_record(MODIFICATION_HEADERS)
                .map_err(|e| Error::csv(&self.path, &e))?;
        }
        writer
            .write_record(record.to_row())
            .map_err(|e| Error::csv(&self.path, &e))?;
        writer.flush().map_err(|e| Error::io(&self.path, e))?;

        debug!("Logged modification of {}", record.file_name);
        Ok(())
    }
}

/// Typed key of a report row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricKey {
    /// `Total Files Modified`
    FilesModified,
    /// `Total LOC Converted`
    LocConverted,
    /// `Total Time (minutes)`
    TimeMinutes,
    /// `{ext} Files`, e.g. `.py Files`
    ExtensionLoc(String),
    /// Any other row, kept verbatim
    Other(String),
}

impl MetricKey {
    /// Parses a row label.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            FILES_MODIFIED => Self::FilesModified,
            LOC_CONVERTED => Self::LocConverted,
            TIME_MINUTES => Self::TimeMinutes,
            _ => match label.strip_suffix(EXTENSION_SUFFIX) {
                Some(ext) if ext.starts_with('.') && !ext.contains(' ') => {
                    Self::ExtensionLoc(ext.to_string())
                }
                _ => Self::Other(label.to_string()),
            },
        }
    }

    /// Row label as written to the report.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::FilesModified => FILES_MODIFIED.to_string(),
            Self::LocConverted => LOC_CONVERTED.to_string(),
            Self::TimeMinutes => TIME_MINUTES.to_string(),
            Self::ExtensionLoc(ext) => format!("{ext}{EXTENSION_SUFFIX}"),
            Self::Other(label) => label.clone(),
        }
    }
}

/// Typed value of a report row.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Plain count
    Count(u64),
    /// Lines of code
    Loc(u64),
    /// Minutes with two decimals
    Minutes(f64),
    /// Anything else
    Text(String),
}

impl MetricValue {
    /// Parses a raw cell for the given key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Report`] when a numeric metric holds a non-numeric value.
    pub fn parse(key: &MetricKey, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |reason: String| Error::report(key.label(), reason);

        match key {
            MetricKey::FilesModified => parse_integer(raw)
                .map(Self::Count)
                .ok_or_else(|| invalid(format!("'{raw}' is not a count"))),
            MetricKey::LocConverted | MetricKey::ExtensionLoc(_) => parse_loc(raw)
                .map(Self::Loc)
                .ok_or_else(|| invalid(format!("'{raw}' is not a line count"))),
            MetricKey::TimeMinutes => raw
                .parse::<f64>()
                .map(Self::Minutes)
                .map_err(|e| invalid(format!("'{raw}': {e}"))),
            MetricKey::Other(label) => {
                if raw.contains("LOC") {
                    parse_loc(raw)
                        .map(Self::Loc)
                        .ok_or_else(|| invalid(format!("'{raw}' is not a line count")))
                } else if label.contains("Time") {
                    raw.parse::<f64>()
                        .map(Self::Minutes)
                        .map_err(|e| invalid(format!("'{raw}': {e}")))
                } else if let Some(count) = parse_integer(raw) {
                    Ok(Self::Count(count))
                } else {
                    Ok(Self::Text(raw.to_string()))
                }
            }
        }
    }

    /// Numeric value as an integer, if this is a count or line total.
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Count(n) | Self::Loc(n) => Some(*n),
            Self::Minutes(_) | Self::Text(_) => None,
        }
    }

    /// Numeric value as minutes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Minutes(m) => Some(*m),
            Self::Count(n) | Self::Loc(n) => Some(*n as f64),
            Self::Text(_) => None,
        }
    }

    /// Renders the value as a report cell.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Count(n) => n.to_string(),
            Self::Loc(n) => format!("{n}{LOC_UNIT}"),
            Self::Minutes(m) => format_minutes(*m),
            Self::Text(text) => text.clone(),
        }
    }
}

fn parse_integer(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn parse_loc(raw: &str) -> Option<u64> {
    parse_integer(raw.strip_suffix(LOC_UNIT).unwrap_or(raw).trim())
}

fn format_minutes(minutes: f64) -> String {
    if minutes.fract() == 0.0 {
        format!("{minutes:.1}")
    } else {
        minutes.to_string()
    }
}

/// Totals parsed from a previous report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalTotals {
    values: HashMap<MetricKey, MetricValue>,
}

impl HistoricalTotals {
    /// Reads totals from a report file. A missing file yields empty totals.
    ///
    /// The first row and section markers are skipped, only two-column rows
    /// are considered, and malformed rows are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read as CSV.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No previous report at {}", path.display());
            return Ok(Self::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::csv(path, &e))?;

        let mut totals = Self::default();
        for record in reader.records().skip(1) {
            let record = record.map_err(|e| Error::csv(path, &e))?;
            if record.len() != 2 {
                continue;
            }

            let label = record[0].trim();
            let raw = record[1].trim();
            if label.starts_with(SECTION_PREFIX) || raw.starts_with(SECTION_PREFIX) {
                continue;
            }

            let key = MetricKey::parse(label);
            match MetricValue::parse(&key, raw) {
                Ok(value) => {
                    totals.values.insert(key, value);
                }
                Err(e) => warn!("Skipping row in {}: {}", path.display(), e),
            }
        }

        Ok(totals)
    }

    /// Returns the value recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &MetricKey) -> Option<&MetricValue> {
        self.values.get(key)
    }

    fn count(&self, key: &MetricKey) -> u64 {
        self.get(key).and_then(MetricValue::as_u64).unwrap_or(0)
    }

    fn minutes(&self, key: &MetricKey) -> f64 {
        self.get(key).and_then(MetricValue::as_f64).unwrap_or(0.0)
    }

    fn extension_loc(&self) -> impl Iterator<Item = (&str, u64)> {
        self.values.iter().filter_map(|(key, value)| match key {
            MetricKey::ExtensionLoc(ext) => value.as_u64().map(|loc| (ext.as_str(), loc)),
            _ => None,
        })
    }
}

/// One rendered report row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// Row label
    pub metric: String,
    /// Rendered value
    pub value: String,
}

impl ReportRow {
    fn new(metric: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value: value.into(),
        }
    }

    fn header() -> Self {
        Self::new("Metric", "Value")
    }
}

/// Both tables of the final report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTables {
    /// This run only, header row first
    pub last_run: Vec<ReportRow>,
    /// Merged totals, header row first
    pub historical: Vec<ReportRow>,
}

impl ReportTables {
    /// Builds both tables from this run's statistics and previous totals.
    #[must_use]
    pub fn build(stats: &RunStats, elapsed: Duration, history: &HistoricalTotals) -> Self {
        let minutes = minutes_rounded(elapsed);

        let mut last_run = vec![
            ReportRow::header(),
            ReportRow::new(
                format!("{FILES_MODIFIED} (Last run)"),
                stats.total_files.to_string(),
            ),
            ReportRow::new(
                format!("{LOC_CONVERTED} (Last run)"),
                stats.total_loc.to_string(),
            ),
            ReportRow::new(format!("{TIME_MINUTES} (Last run)"), format_minutes(minutes)),
        ];
        last_run.extend(stats.loc_by_extension.iter().map(|(ext, loc)| {
            ReportRow::new(
                format!("{ext}{EXTENSION_SUFFIX} (last run)"),
                MetricValue::Loc(*loc).render(),
            )
        }));

        let files =
            MetricValue::Count(stats.total_files + history.count(&MetricKey::FilesModified));
        let loc = MetricValue::Loc(stats.total_loc + history.count(&MetricKey::LocConverted));
        let time =
            MetricValue::Minutes(round2(minutes + history.minutes(&MetricKey::TimeMinutes)));

        let mut by_extension: BTreeMap<String, u64> = history
            .extension_loc()
            .map(|(ext, loc)| (ext.to_string(), loc))
            .collect();
        for (ext, loc) in &stats.loc_by_extension {
            *by_extension.entry(ext.clone()).or_insert(0) += loc;
        }

        let mut historical = vec![
            ReportRow::header(),
            ReportRow::new(MetricKey::FilesModified.label(), files.render()),
            ReportRow::new(MetricKey::LocConverted.label(), loc.render()),
            ReportRow::new(MetricKey::TimeMinutes.label(), time.render()),
        ];
        historical.extend(by_extension.into_iter().map(|(ext, loc)| {
            ReportRow::new(
                MetricKey::ExtensionLoc(ext).label(),
                MetricValue::Loc(loc).render(),
            )
        }));

        Self {
            last_run,
            historical,
        }
    }
}

/// Cross-run aggregate report, rewritten at the end of every run.
#[derive(Debug, Clone)]
pub struct FinalReport {
    path: PathBuf,
}

impl FinalReport {
    /// Creates a report stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the report path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merges this run into the stored totals and rewrites the report.
    ///
    /// The existing file is left untouched if it cannot be read.
    ///
    /// # Errors
    ///
    /// Returns an error if the previous report cannot be read or the new one
    /// cannot be written.
    pub fn generate(&self, stats: &RunStats, elapsed: Duration) -> Result<ReportTables> {
        let history = HistoricalTotals::load(&self.path)?;
        let tables = ReportTables::build(stats, elapsed, &history);
        self.write(&tables)?;

        info!("Final report generated at: {}", self.path.display());
        Ok(tables)
    }

    fn write(&self, tables: &ReportTables) -> Result<()> {
        let mut file = File::create(&self.path).map_err(|e| Error::io(&self.path, e))?;

        self.write_section(&mut file, LAST_RUN_SECTION, &tables.last_run)?;
        file.write_all(b"\n").map_err(|e| Error::io(&self.path, e))?;
        self.write_section(&mut file, HISTORICAL_SECTION, &tables.historical)?;

        file.sync_all().map_err(|e| Error::io(&self.path, e))
    }

    fn write_section(&self, file: &mut File, title: &str, rows: &[ReportRow]) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        writer
            .write_record([title])
            .map_err(|e| Error::csv(&self.path, &e))?;
        for row in rows {
            writer
                .write_record([row.metric.as_str(), row.value.as_str()])
                .map_err(|e| Error::csv(&self.path, &e))?;
        }

        writer.flush().map_err(|e| Error::io(&self.path, e))
    }
}
