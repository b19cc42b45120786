//! Session table and fan-out.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use mhos_core::{StreamEvent, TelemetrySettings};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Frame, StreamSession};

/// Opens, tracks and closes streaming sessions.
#[derive(Debug)]
pub struct StreamBroadcaster {
    sessions: RwLock<HashMap<Uuid, StreamSession>>,
    keepalive: Duration,
    buffer: usize,
}

impl StreamBroadcaster {
    pub fn new(settings: &TelemetrySettings) -> Self {
        Self::with_config(settings.keepalive_interval(), settings.session_buffer)
    }

    pub fn with_config(keepalive: Duration, buffer: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            keepalive,
            buffer: buffer.max(1),
        }
    }

    /// Open a session and return it with the receiving half for the transport.
    ///
    /// Must be called inside a Tokio runtime: the keepalive and disconnect
    /// watcher are spawned here.
    pub fn open(&self) -> (StreamSession, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let session = StreamSession::new(tx);
        session.start_keepalive(self.keepalive);

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.is_open());
        sessions.insert(session.id(), session.clone());
        info!(session = %session.id(), open = sessions.len(), "Stream session opened");
        drop(sessions);

        (session, rx)
    }

    /// Send to one session. A closed session is a silent no-op.
    pub async fn send(&self, session: &StreamSession, event: &StreamEvent) -> bool {
        session.send(event).await
    }

    pub fn close(&self, session: &StreamSession) {
        session.close();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session.id());
    }

    pub fn get(&self, id: Uuid) -> Option<StreamSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .filter(|s| s.is_open())
            .cloned()
    }

    /// Fan `event` out to every open session, pruning closed ones. Returns
    /// how many sessions accepted it.
    pub async fn broadcast(&self, event: &StreamEvent) -> usize {
        let targets: Vec<StreamSession> = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            sessions.retain(|_, s| s.is_open());
            sessions.values().cloned().collect()
        };

        let mut delivered = 0;
        for session in targets {
            if session.send(event).await {
                delivered += 1;
            }
        }
        debug!(event_type = event.event_type(), delivered, "Broadcast event");
        delivered
    }

    /// Open sessions.
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.is_open())
            .count()
    }

    /// Close every session, e.g. on shutdown.
    pub fn close_all(&self) {
        let sessions: Vec<StreamSession> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, s)| s)
            .collect();
        for session in sessions {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster() -> StreamBroadcaster {
        StreamBroadcaster::with_config(Duration::from_secs(30), 8)
    }

    #[tokio::test]
    async fn broadcast_skips_closed_sessions() {
        let broadcaster = broadcaster();
        let (a, mut rx_a) = broadcaster.open();
        let (b, _rx_b) = broadcaster.open();
        assert_eq!(broadcaster.session_count(), 2);

        broadcaster.close(&b);
        let delivered = broadcaster.broadcast(&StreamEvent::info("hello")).await;

        assert_eq!(delivered, 1);
        assert_eq!(broadcaster.session_count(), 1);
        assert!(a.is_open());
        assert!(matches!(
            rx_a.recv().await,
            Some(Frame::Event { event_type: "info", .. })
        ));
    }

    #[tokio::test]
    async fn closed_session_gets_nothing() {
        let broadcaster = broadcaster();
        let (session, mut rx) = broadcaster.open();

        broadcaster.close(&session);
        assert!(!broadcaster.send(&session, &StreamEvent::info("late")).await);
        assert!(broadcaster.get(session.id()).is_none());

        // Sink is gone once the owned tasks are aborted.
        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_flows_on_idle_session() {
        let broadcaster = StreamBroadcaster::with_config(Duration::from_secs(30), 8);
        let (_session, mut rx) = broadcaster.open();

        let frame = rx.recv().await.unwrap();
        assert!(frame.is_keepalive());
    }

    #[tokio::test]
    async fn close_all_closes_everything() {
        let broadcaster = broadcaster();
        let (a, _rx_a) = broadcaster.open();
        let (b, _rx_b) = broadcaster.open();

        broadcaster.close_all();
        assert!(!a.is_open());
        assert!(!b.is_open());
        assert_eq!(broadcaster.session_count(), 0);
    }
}
