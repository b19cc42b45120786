//! Captured child output.
//!
//! Children never write into a pipe owned by the supervisor: a pipe would die
//! with the supervisor and take the child down with SIGPIPE on its next write.
//! Captured stdout and stderr go to per-process files instead, and the
//! supervisor tails those files into a [`ProcessLogSink`] while it is around.
//! Lines are decoded lossily, so non-UTF8 output does not stop the capture.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::tail::{LogCursor, StartAt};

/// Destination for captured child output lines.
///
/// Implementations should be thread-safe and non-blocking.
pub trait ProcessLogSink: Send + Sync {
    /// `stream` is either `"stdout"` or `"stderr"`; `line` has no trailing newline.
    fn append(&self, name: &str, stream: &'static str, line: String);
}

/// Sink that turns each line into a `debug!` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl ProcessLogSink for TracingLogSink {
    fn append(&self, name: &str, stream: &'static str, line: String) {
        debug!(process = %name, %stream, "{}", line);
    }
}

/// Capture file for one stream of the process `name` under `dir`.
pub fn capture_path(dir: &Path, name: &str, stream: &str) -> PathBuf {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{safe}.{stream}.log"))
}

/// Cursors over a child's capture files, positioned past anything earlier
/// runs left behind.
pub(crate) struct CapturedOutput {
    streams: Vec<(&'static str, LogCursor)>,
}

impl CapturedOutput {
    pub(crate) async fn open(files: Vec<(&'static str, PathBuf)>) -> io::Result<Self> {
        let mut streams = Vec::with_capacity(files.len());
        for (stream, path) in files {
            streams.push((stream, LogCursor::open(path, StartAt::End).await?));
        }
        Ok(Self { streams })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Forward complete lines written since the last drain.
    pub(crate) async fn drain(&mut self, name: &str, sink: &Arc<dyn ProcessLogSink>) {
        for (stream, cursor) in &mut self.streams {
            match cursor.poll().await {
                Ok(lines) => {
                    for line in lines {
                        sink.append(name, stream, line);
                    }
                }
                Err(e) => {
                    debug!(process = %name, %stream, error = %e, "Failed to read captured output");
                }
            }
        }
    }

    /// Final drain once the child has exited, including an unterminated
    /// last line.
    pub(crate) async fn finish(mut self, name: &str, sink: &Arc<dyn ProcessLogSink>) {
        self.drain(name, sink).await;
        for (stream, cursor) in &mut self.streams {
            if let Some(line) = cursor.take_partial() {
                sink.append(name, stream, line);
            }
        }
    }
}
