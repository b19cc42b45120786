//! Filesystem change feed for a directory of JSON documents.
//!
//! Notifications are filtered to `*.json` and republished to a session as
//! `change` events named after the file stem. There is no debouncing: an
//! editor that writes a file in several steps produces several events.

use std::path::Path;
use std::time::Duration;

use mhos_core::{ChangeEvent, ChangeKind, StreamEvent};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::stream::StreamSession;

const WATCHED_EXTENSION: &str = "json";

/// Used only when the platform watcher cannot be created.
const POLL_FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// How a directory ended up being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Native,
    Polling,
    /// The directory does not exist. The session got one `info` event and
    /// nothing else will be sent for it.
    Missing,
}

/// Map one notification to change events for the watched documents in it.
pub fn changes_from(event: &Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            ChangeKind::Created
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            ChangeKind::Removed
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter(|path| path.extension().is_some_and(|ext| ext == WATCHED_EXTENSION))
        .filter_map(|path| path.file_stem()?.to_str())
        .map(|name| ChangeEvent {
            name: name.to_owned(),
            change_type: kind,
        })
        .collect()
}

/// Stream changes under `dir` into `session` until it closes.
///
/// The watcher is owned by the session and dropped on close.
pub async fn watch(session: &StreamSession, dir: &Path) -> notify::Result<WatchMode> {
    let exists = tokio::fs::metadata(dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    if !exists {
        info!(dir = %dir.display(), "Watched directory does not exist");
        session
            .send(&StreamEvent::info(format!(
                "directory not found: {}",
                dir.display()
            )))
            .await;
        return Ok(WatchMode::Missing);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (watcher, mode) = start_watcher(dir, &tx)?;
    session.attach(watcher);

    let target = session.clone();
    session.spawn_task(async move {
        while let Some(change) = rx.recv().await {
            if !target.send(&StreamEvent::Change(change)).await {
                break;
            }
        }
    });

    debug!(dir = %dir.display(), ?mode, session = %session.id(), "Watching directory");
    Ok(mode)
}

fn start_watcher(
    dir: &Path,
    tx: &mpsc::UnboundedSender<ChangeEvent>,
) -> notify::Result<(Box<dyn Watcher + Send>, WatchMode)> {
    let native = notify::recommended_watcher(forward_to(tx.clone())).and_then(|mut watcher| {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    });
    match native {
        Ok(watcher) => return Ok((Box::new(watcher), WatchMode::Native)),
        Err(e) => warn!(dir = %dir.display(), error = %e, "Native watcher unavailable, polling"),
    }

    let mut watcher = PollWatcher::new(
        forward_to(tx.clone()),
        Config::default().with_poll_interval(POLL_FALLBACK_INTERVAL),
    )?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok((Box::new(watcher), WatchMode::Polling))
}

fn forward_to(
    tx: mpsc::UnboundedSender<ChangeEvent>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |result| match result {
        Ok(event) => {
            for change in changes_from(&event) {
                let _ = tx.send(change);
            }
        }
        Err(e) => debug!(error = %e, "Watcher error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::path::PathBuf;

    use crate::stream::Frame;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn json_files_map_to_stem_names() {
        let changes = changes_from(&event(
            EventKind::Create(CreateKind::File),
            &["/t/greeting.json", "/t/notes.txt", "/t/.json.swp"],
        ));
        assert_eq!(
            changes,
            [ChangeEvent {
                name: "greeting".into(),
                change_type: ChangeKind::Created
            }]
        );
    }

    #[test]
    fn kinds_are_classified() {
        let modified = changes_from(&event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/t/a.json"],
        ));
        assert_eq!(modified[0].change_type, ChangeKind::Modified);

        let removed = changes_from(&event(EventKind::Remove(RemoveKind::File), &["/t/a.json"]));
        assert_eq!(removed[0].change_type, ChangeKind::Removed);

        let renamed_away = changes_from(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/t/a.json"],
        ));
        assert_eq!(renamed_away[0].change_type, ChangeKind::Removed);
    }

    #[test]
    fn metadata_and_access_are_ignored() {
        assert!(
            changes_from(&event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                &["/t/a.json"],
            ))
            .is_empty()
        );
        assert!(changes_from(&event(EventKind::Any, &["/t/a.json"])).is_empty());
    }

    #[tokio::test]
    async fn missing_directory_sends_one_info_event() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let session = StreamSession::new(tx);

        let mode = watch(&session, &dir.path().join("nope")).await.unwrap();
        assert_eq!(mode, WatchMode::Missing);
        assert!(matches!(
            rx.try_recv(),
            Ok(Frame::Event { event_type: "info", .. })
        ));
        assert!(rx.try_recv().is_err());
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn new_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let session = StreamSession::new(tx);

        let mode = watch(&session, dir.path()).await.unwrap();
        assert_ne!(mode, WatchMode::Missing);

        std::fs::write(dir.path().join("greeting.json"), b"{}").unwrap();

        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(frame) = rx.recv().await {
                if let Frame::Event { event_type: "change", data } = frame
                    && data.contains("\"name\":\"greeting\"")
                {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(found);
        session.close();
    }
}
