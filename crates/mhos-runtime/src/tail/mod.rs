//! Incremental tailing of append-only NDJSON logs.
//!
//! A [`LogCursor`] belongs to exactly one streaming session. It is never
//! persisted, and two sessions tailing the same file keep independent cursors.

mod cursor;
mod daily;

pub use cursor::{LogCursor, StartAt, TailStats};
pub use daily::{DailyLogSource, daily_log_path};
