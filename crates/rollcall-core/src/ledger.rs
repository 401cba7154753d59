//! Append-only attendance ledger stored as CSV.
//!
//! Each event is one `Date,Time,Student_ID,Student_Name,Action` row, written
//! with a single `write` in append mode and synced before `append` returns.
//! Rows are never rewritten. The summary file is a derived view and can be
//! regenerated from the ledger at any time.

use crate::types::{Action, AttendanceEvent, DATE_FORMAT, TIME_FORMAT};
use chrono::{NaiveDate, NaiveTime};
use nix::fcntl::{Flock, FlockArg};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Header line of the ledger file. Consumers depend on this exact text.
pub const LEDGER_HEADER: &str = "Date,Time,Student_ID,Student_Name,Action";

/// Header line of the derived summary file.
pub const SUMMARY_HEADER: &str = "Student_ID,Student_Name,ENTRY,EXIT,EXIT (FORCED)";

/// Number of trailing events shown by default in a report.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

const LEDGER_FIELDS: usize = 5;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("ledger {0} is locked by another writer")]
    Locked(PathBuf),
}

/// Why a ledger row was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid date {0:?}")]
    Date(String),
    #[error("invalid time {0:?}")]
    Time(String),
    #[error("empty identity id")]
    EmptyId,
    #[error("invalid action {0:?}")]
    Action(String),
}

/// A ledger row skipped during summarization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    /// 1-based line number in the ledger file.
    pub line: usize,
    pub error: RecordError,
}

/// Destination for attendance events.
pub trait Ledger {
    /// Durably record one event. Must not return before the row is on disk.
    fn append(&mut self, event: &AttendanceEvent) -> Result<(), LedgerError>;
}

/// Per-identity action counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub entry: usize,
    pub exit: usize,
    pub exit_forced: usize,
}

impl ActionCounts {
    fn record(&mut self, action: Action) {
        match action {
            Action::Entry => self.entry += 1,
            Action::Exit => self.exit += 1,
            Action::ExitForced => self.exit_forced += 1,
        }
    }

    pub fn get(&self, action: Action) -> usize {
        match action {
            Action::Entry => self.entry,
            Action::Exit => self.exit,
            Action::ExitForced => self.exit_forced,
        }
    }
}

/// Report computed from the full ledger.
#[derive(Debug, Clone)]
pub struct Summary {
    /// Number of valid rows.
    pub total: usize,
    /// Most recent valid events, oldest first.
    pub recent: Vec<AttendanceEvent>,
    /// Counts keyed by `(identity_id, display_name)`.
    pub counts: BTreeMap<(String, String), ActionCounts>,
    pub date: NaiveDate,
    /// Events dated `date`, in ledger order.
    pub today: Vec<AttendanceEvent>,
    pub skipped: Vec<MalformedRecord>,
}

impl Summary {
    /// Render the summary table written to the summary file.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(SUMMARY_HEADER.len() + 1 + self.counts.len() * 32);
        out.push_str(SUMMARY_HEADER);
        out.push('\n');
        for ((id, name), c) in &self.counts {
            out.push_str(&format!(
                "{id},{name},{},{},{}\n",
                c.entry, c.exit, c.exit_forced
            ));
        }
        out
    }
}

/// Parse one ledger row.
pub fn parse_row(line: &str) -> Result<AttendanceEvent, RecordError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != LEDGER_FIELDS {
        return Err(RecordError::FieldCount(fields.len()));
    }
    let (date, time, id, name, action) = (fields[0], fields[1], fields[2], fields[3], fields[4]);

    let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| RecordError::Date(date.to_string()))?;
    let time = NaiveTime::parse_from_str(time, TIME_FORMAT)
        .map_err(|_| RecordError::Time(time.to_string()))?;
    if id.trim().is_empty() {
        return Err(RecordError::EmptyId);
    }
    let action: Action = action
        .parse()
        .map_err(|_| RecordError::Action(action.to_string()))?;

    Ok(AttendanceEvent::new(date.and_time(time), id, name, action))
}

/// CSV ledger file plus the path of its derived summary.
pub struct CsvLedger {
    path: PathBuf,
    summary_path: PathBuf,
    writer_lock: Option<Flock<File>>,
}

impl CsvLedger {
    /// Create a handle. No file is touched until the first append or summarize.
    pub fn new(path: impl Into<PathBuf>, summary_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            summary_path: summary_path.into(),
            writer_lock: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// Path of the advisory lock file guarding writers of this ledger.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take an exclusive advisory lock so only one process appends to this
    /// ledger. Fails immediately if another writer holds it.
    pub fn lock_writer(&mut self) -> Result<(), LedgerError> {
        if self.writer_lock.is_some() {
            return Ok(());
        }
        ensure_parent(&self.path)?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            if errno == nix::errno::Errno::EWOULDBLOCK {
                LedgerError::Locked(self.path.clone())
            } else {
                LedgerError::Persistence(std::io::Error::from(errno))
            }
        })?;
        tracing::debug!(path = %lock_path.display(), "ledger writer lock acquired");
        self.writer_lock = Some(lock);
        Ok(())
    }

    /// Read the whole ledger and build a report for `today`.
    ///
    /// Returns `Ok(None)` when the ledger does not exist yet. Malformed rows
    /// are skipped with a warning. Rewrites the summary file on success.
    pub fn summarize(
        &self,
        recent: usize,
        today: NaiveDate,
    ) -> Result<Option<Summary>, LedgerError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no attendance records");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        let mut skipped = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let line_no = idx + 1;
            if line_no == 1 && line.trim_end() == LEDGER_HEADER {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            match parse_row(line.trim_end_matches('\r')) {
                Ok(event) => events.push(event),
                Err(error) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_no,
                        %error,
                        "skipping malformed ledger row"
                    );
                    skipped.push(MalformedRecord {
                        line: line_no,
                        error,
                    });
                }
            }
        }

        let mut counts: BTreeMap<(String, String), ActionCounts> = BTreeMap::new();
        for e in &events {
            counts
                .entry((e.identity_id.clone(), e.display_name.clone()))
                .or_default()
                .record(e.action);
        }
        let today_events = events.iter().filter(|e| e.date() == today).cloned().collect();
        let recent_events = events[events.len().saturating_sub(recent)..].to_vec();

        let summary = Summary {
            total: events.len(),
            recent: recent_events,
            counts,
            date: today,
            today: today_events,
            skipped,
        };

        write_atomic(&self.summary_path, summary.to_csv().as_bytes())?;
        tracing::debug!(
            path = %self.summary_path.display(),
            total = summary.total,
            skipped = summary.skipped.len(),
            "summary regenerated"
        );

        Ok(Some(summary))
    }
}

impl Ledger for CsvLedger {
    fn append(&mut self, event: &AttendanceEvent) -> Result<(), LedgerError> {
        ensure_parent(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        let len = file.metadata()?.len();
        let mut buf = String::new();
        if len == 0 {
            buf.push_str(LEDGER_HEADER);
            buf.push('\n');
        } else if !ends_with_newline(&mut file, len)? {
            // Torn row from an interrupted write: keep it on its own line.
            tracing::warn!(path = %self.path.display(), "ledger ends mid-row; starting a new line");
            buf.push('\n');
        }
        buf.push_str(&event.to_row());
        buf.push('\n');

        file.write_all(buf.as_bytes())?;
        file.sync_data()?;

        tracing::info!(
            id = %event.identity_id,
            name = %event.display_name,
            action = %event.action,
            time = %event.timestamp.format(TIME_FORMAT),
            "attendance logged"
        );
        Ok(())
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Replace `path` with `bytes` via a sibling `<file name>.tmp` and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    ensure_parent(path)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}
