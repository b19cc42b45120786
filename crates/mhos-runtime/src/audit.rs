//! Audit sink implementations.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, Utc};
use mhos_core::{AuditLevel, AuditRecord, AuditSink};
use tracing::{error, info, warn};

use crate::tail::daily_log_path;

/// Emits every record as a structured tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, record: AuditRecord) {
        let actor = record.actor.as_deref().unwrap_or("-");
        match record.level {
            AuditLevel::Info => info!(
                category = %record.category,
                event = %record.event,
                actor,
                details = %record.details,
                "audit"
            ),
            AuditLevel::Warn => warn!(
                category = %record.category,
                event = %record.event,
                actor,
                details = %record.details,
                "audit"
            ),
            AuditLevel::Error => error!(
                category = %record.category,
                event = %record.event,
                actor,
                details = %record.details,
                "audit"
            ),
        }
    }
}

/// Appends one JSON line per record to `dir/YYYY-MM-DD.ndjson` (UTC).
///
/// These are the files the activity feed tails. The current day's file stays
/// open between records and is swapped when the UTC date changes.
#[derive(Debug)]
pub struct JsonlAuditSink {
    dir: PathBuf,
    current: Mutex<Option<DailyFile>>,
}

#[derive(Debug)]
struct DailyFile {
    day: NaiveDate,
    file: File,
}

impl JsonlAuditSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_line(&self, day: NaiveDate, line: &str) -> std::io::Result<()> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_none_or(|open| open.day != day) {
            std::fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(daily_log_path(&self.dir, day))?;
            *current = Some(DailyFile { day, file });
        }
        let Some(open) = current.as_mut() else {
            return Ok(());
        };

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        let written = open.file.write_all(&buf);
        if written.is_err() {
            // Reopen on the next record
            *current = None;
        }
        written
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: AuditRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(event = %record.event, error = %e, "Failed to serialize audit record");
                return;
            }
        };
        let day = Utc::now().date_naive();
        if let Err(e) = self.write_line(day, &line) {
            let path = daily_log_path(&self.dir, day);
            warn!(path = %path.display(), error = %e, "Failed to append audit record");
        }
    }
}

/// Fans each record out to several sinks.
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn append(&self, record: AuditRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.append(record.clone());
            }
            last.append(record);
        }
    }
}
