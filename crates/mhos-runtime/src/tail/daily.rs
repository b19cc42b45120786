//! Tailing a directory of per-day log files (`YYYY-MM-DD.ndjson`).

use std::io;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{LogCursor, StartAt, TailStats};

/// Path of the log file for `date` under `dir`.
pub fn daily_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.ndjson", date.format("%Y-%m-%d")))
}

/// Follows today's file and moves to the next day's file at UTC midnight.
///
/// On a day change the remainder of the previous file is drained before the
/// new file is read from its beginning.
#[derive(Debug)]
pub struct DailyLogSource {
    dir: PathBuf,
    day: NaiveDate,
    cursor: LogCursor,
    carried: TailStats,
}

impl DailyLogSource {
    pub async fn open(dir: impl Into<PathBuf>, start: StartAt) -> io::Result<Self> {
        Self::open_on(dir.into(), Utc::now().date_naive(), start).await
    }

    pub(crate) async fn open_on(dir: PathBuf, day: NaiveDate, start: StartAt) -> io::Result<Self> {
        let cursor = LogCursor::open(daily_log_path(&dir, day), start).await?;
        Ok(Self {
            dir,
            day,
            cursor,
            carried: TailStats::default(),
        })
    }

    pub fn current_path(&self) -> &Path {
        self.cursor.path()
    }

    /// Counters accumulated across every file this source has followed.
    pub fn stats(&self) -> TailStats {
        let current = self.cursor.stats();
        TailStats {
            resets: self.carried.resets + current.resets,
            malformed: self.carried.malformed + current.malformed,
        }
    }

    pub async fn poll_records<T: DeserializeOwned>(&mut self) -> io::Result<Vec<T>> {
        self.poll_records_on(Utc::now().date_naive()).await
    }

    pub(crate) async fn poll_records_on<T: DeserializeOwned>(
        &mut self,
        today: NaiveDate,
    ) -> io::Result<Vec<T>> {
        if today == self.day {
            return self.cursor.poll_records().await;
        }

        let mut records = self.cursor.poll_records().await?;
        let stats = self.cursor.stats();
        self.carried.resets += stats.resets;
        self.carried.malformed += stats.malformed;

        debug!(dir = %self.dir.display(), from = %self.day, to = %today, "Switching to next daily log");
        self.day = today;
        self.cursor = LogCursor::new(daily_log_path(&self.dir, today));
        records.extend(self.cursor.poll_records::<T>().await?);
        Ok(records)
    }
}
