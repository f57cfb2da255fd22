//! Append-only visit log store.
//!
//! Visits are persisted as tab-separated lines in a single text file with a
//! fixed header row. The file is created on first open and only ever grows;
//! records are immutable once written.

mod sanitize;

pub use sanitize::{sanitize, FIELD_FALLBACK, MAX_IP_LEN, MAX_TIMEZONE_LEN, MAX_USER_AGENT_LEN};

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header row, always the first line of the log file.
pub const LOG_HEADER: &str = "timestamp\tip\ttimezone\tuserAgent";

/// Default file name of the visit log inside the data directory.
pub const LOG_FILE_NAME: &str = "visits.log";

const FIELDS_PER_RECORD: usize = 4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("visit log I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("visit log writer lock poisoned")]
    Poisoned,
}

/// One logged visit.
///
/// All string fields are expected to be sanitized before the record is built;
/// the store serializes them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub timestamp: String,
    pub ip: String,
    pub timezone: String,
    pub user_agent: String,
}

impl VisitRecord {
    /// Build a record stamped with the current time.
    pub fn new(ip: String, timezone: String, user_agent: String) -> Self {
        Self {
            timestamp: current_timestamp(),
            ip,
            timezone,
            user_agent,
        }
    }

    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\n",
            self.timestamp, self.ip, self.timezone, self.user_agent
        )
    }

    /// Parse one stored line. Lines must carry exactly four tab-separated
    /// fields; anything else (e.g. a torn write) is rejected.
    fn from_line(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let timestamp = fields.next()?;
        let ip = fields.next()?;
        let timezone = fields.next()?;
        let user_agent = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            timestamp: timestamp.to_string(),
            ip: ip.to_string(),
            timezone: timezone.to_string(),
            user_agent: user_agent.to_string(),
        })
    }
}

/// Append-only, tab-separated visit log.
///
/// Holds the append handle behind a mutex so appends from concurrent requests
/// within this process never interleave their bytes. Reads go back to the
/// file on every call and are not synchronized against appends.
pub struct VisitLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl VisitLog {
    /// Open or create the log at `path`.
    ///
    /// The parent directory is created recursively if missing; a fresh or
    /// empty file gets the header row before any record is accepted.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            file.write_all(format!("{LOG_HEADER}\n").as_bytes())?;
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single tab-separated line.
    pub fn append(&self, record: &VisitRecord) -> Result<(), StoreError> {
        let line = record.to_line();
        let mut file = self.file.lock().map_err(|_| StoreError::Poisoned)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read the last `max_records` records in file (append) order.
    ///
    /// A missing file is an empty result, not an error. Lines that do not
    /// split into exactly four fields are skipped with a warning so a torn
    /// trailing write cannot surface as a misaligned record.
    pub fn read_tail(&self, max_records: usize) -> Result<Vec<VisitRecord>, StoreError> {
        let Some(contents) = self.read_contents()? else {
            return Ok(Vec::new());
        };

        let data_lines: Vec<&str> = contents.lines().skip(1).collect();
        let start = data_lines.len().saturating_sub(max_records);

        let mut records = Vec::with_capacity(data_lines.len() - start);
        for line in &data_lines[start..] {
            match VisitRecord::from_line(line) {
                Some(record) => records.push(record),
                None => {
                    tracing::warn!("Skipping malformed visit log line: {line:?}");
                }
            }
        }

        Ok(records)
    }

    /// Number of stored records: every non-empty line after the header.
    ///
    /// A missing file counts as zero, not as an error.
    pub fn count(&self) -> Result<u64, StoreError> {
        let Some(contents) = self.read_contents()? else {
            return Ok(0);
        };

        let count = contents
            .lines()
            .skip(1)
            .filter(|line| !line.is_empty())
            .count();
        Ok(count as u64)
    }

    /// Read the whole file, mapping only `NotFound` to `None`; every other
    /// I/O failure propagates.
    fn read_contents(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(n: usize) -> VisitRecord {
        VisitRecord::new(
            format!("203.0.113.{n}"),
            "America/New_York".to_string(),
            "Mozilla/5.0 TestAgent".to_string(),
        )
    }

    fn open_log(dir: &TempDir) -> VisitLog {
        VisitLog::open(dir.path().join(LOG_FILE_NAME)).expect("open visit log")
    }

    #[test]
    fn creates_file_with_header() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let log = open_log(&dir);

        let contents = fs::read_to_string(log.path())?;
        assert_eq!(contents, format!("{LOG_HEADER}\n"));
        Ok(())
    }

    #[test]
    fn creates_missing_parent_directories() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let nested = dir.path().join("a").join("b").join(LOG_FILE_NAME);
        let log = VisitLog::open(&nested)?;

        assert_eq!(log.count()?, 0);
        Ok(())
    }

    #[test]
    fn append_then_read_tail_round_trips() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let log = open_log(&dir);

        let records: Vec<VisitRecord> = (0..5).map(record).collect();
        for rec in &records {
            log.append(rec)?;
        }

        assert_eq!(log.read_tail(100)?, records);
        assert_eq!(log.count()?, 5);
        Ok(())
    }

    #[test]
    fn tail_returns_only_the_last_records_in_order() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let log = open_log(&dir);

        for n in 0..150 {
            log.append(&record(n))?;
        }

        let tail = log.read_tail(100)?;
        assert_eq!(tail.len(), 100);
        assert_eq!(tail.first().unwrap().ip, "203.0.113.50");
        assert_eq!(tail.last().unwrap().ip, "203.0.113.149");
        Ok(())
    }

    #[test]
    fn fresh_store_is_empty() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let log = open_log(&dir);

        assert_eq!(log.count()?, 0);
        assert!(log.read_tail(100)?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_file_reads_as_empty() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let log = open_log(&dir);
        fs::remove_file(log.path())?;

        assert_eq!(log.count()?, 0);
        assert!(log.read_tail(100)?.is_empty());
        Ok(())
    }

    #[test]
    fn reads_are_idempotent() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let log = open_log(&dir);
        log.append(&record(1))?;

        assert_eq!(log.read_tail(100)?, log.read_tail(100)?);
        assert_eq!(log.count()?, log.count()?);
        Ok(())
    }

    #[test]
    fn reopen_keeps_existing_records_and_single_header() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let path = dir.path().join(LOG_FILE_NAME);

        let first = VisitLog::open(&path)?;
        first.append(&record(1))?;
        drop(first);

        let second = VisitLog::open(&path)?;
        second.append(&record(2))?;

        let contents = fs::read_to_string(&path)?;
        assert!(contents.starts_with(LOG_HEADER));
        assert_eq!(contents.matches(LOG_HEADER).count(), 1);
        assert_eq!(second.count()?, 2);
        Ok(())
    }

    #[test]
    fn malformed_line_is_skipped_on_read_but_counted() -> Result<(), StoreError> {
        let dir = TempDir::new()?;
        let log = open_log(&dir);
        log.append(&record(1))?;

        // Simulate a torn write: a trailing line with too few fields.
        {
            let mut file = OpenOptions::new().append(true).open(log.path())?;
            file.write_all(b"2024-01-01T00:00:00.000Z\t198.51.100.9\n")?;
        }

        let tail = log.read_tail(100)?;
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].ip, "203.0.113.1");
        assert_eq!(log.count()?, 2);
        Ok(())
    }

    #[test]
    fn timestamps_are_rfc3339_utc_with_millis() {
        let rec = record(1);
        assert!(rec.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&rec.timestamp).is_ok());
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let rec = record(1);
        let value = serde_json::to_value(&rec).expect("serialize record");
        let obj = value.as_object().expect("object");

        assert!(obj.contains_key("timestamp"));
        assert!(obj.contains_key("ip"));
        assert!(obj.contains_key("timezone"));
        assert!(obj.contains_key("userAgent"));
        assert_eq!(obj.len(), 4);
    }
}
