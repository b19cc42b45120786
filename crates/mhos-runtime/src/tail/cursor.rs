//! Byte-offset cursor over a growing file.
//!
//! Each poll reads only the bytes appended since the previous poll, returns
//! the complete lines among them and holds back a trailing partial line until
//! its newline arrives. A file that shrank below the cursor (truncation) or,
//! on Unix, was replaced by a different inode (rotation) is read again from
//! offset 0.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Where a new cursor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    /// Deliver the whole file.
    Beginning,
    /// Deliver only what is appended after the cursor is created.
    End,
}

/// Counters for conditions the tailer recovers from silently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailStats {
    /// Times the cursor was reset because the file shrank or was replaced.
    pub resets: u64,
    /// Lines dropped because they did not parse as the expected record.
    pub malformed: u64,
}

#[derive(Debug, Clone)]
pub struct LogCursor {
    path: PathBuf,
    offset: u64,
    carryover: Vec<u8>,
    inode: Option<u64>,
    stats: TailStats,
}

impl LogCursor {
    /// Cursor at offset 0. The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            carryover: Vec::new(),
            inode: None,
            stats: TailStats::default(),
        }
    }

    /// Cursor positioned per `start`. A missing file starts at offset 0.
    pub async fn open(path: impl Into<PathBuf>, start: StartAt) -> io::Result<Self> {
        let mut cursor = Self::new(path);
        if start == StartAt::End {
            match tokio::fs::metadata(&cursor.path).await {
                Ok(meta) => {
                    cursor.offset = meta.len();
                    cursor.inode = inode_of(&meta);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(cursor)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes of an incomplete trailing line waiting for its newline.
    pub fn pending_bytes(&self) -> usize {
        self.carryover.len()
    }

    pub const fn stats(&self) -> TailStats {
        self.stats
    }

    /// Read newly appended complete lines.
    ///
    /// A missing file yields no lines and leaves the cursor unchanged. Lines
    /// are decoded lossily, `\r\n` endings are normalized and blank lines are
    /// skipped.
    pub async fn poll(&mut self) -> io::Result<Vec<String>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let meta = file.metadata().await?;
        let len = meta.len();

        let inode = inode_of(&meta);
        if self.inode.is_some() && inode.is_some() && self.inode != inode {
            self.reset("replaced");
        }
        self.inode = inode;

        if len < self.offset {
            self.reset("truncated");
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut appended = Vec::new();
        (&mut file)
            .take(len - self.offset)
            .read_to_end(&mut appended)
            .await?;
        self.offset += appended.len() as u64;

        let mut data = std::mem::take(&mut self.carryover);
        data.extend_from_slice(&appended);

        let Some(last_newline) = data.iter().rposition(|b| *b == b'\n') else {
            self.carryover = data;
            return Ok(Vec::new());
        };
        self.carryover = data.split_off(last_newline + 1);

        Ok(data
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect())
    }

    /// Poll and parse each line as JSON, dropping malformed lines.
    pub async fn poll_records<T: DeserializeOwned>(&mut self) -> io::Result<Vec<T>> {
        let lines = self.poll().await?;
        let mut records = Vec::with_capacity(lines.len());
        for line in lines {
            match serde_json::from_str::<T>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.stats.malformed += 1;
                    debug!(path = %self.path.display(), error = %e, "Dropping malformed log line");
                }
            }
        }
        Ok(records)
    }

    /// Hand out the held-back partial line, e.g. once the writer is known to
    /// be finished.
    pub fn take_partial(&mut self) -> Option<String> {
        let partial = std::mem::take(&mut self.carryover);
        let line = partial.strip_suffix(b"\r").unwrap_or(&partial);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }

    fn reset(&mut self, reason: &str) {
        debug!(path = %self.path.display(), offset = self.offset, %reason, "Log source reset, tailing from start");
        self.offset = 0;
        self.carryover.clear();
        self.stats.resets += 1;
    }
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode_of(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}
