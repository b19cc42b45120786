//! Producers that push live telemetry into a streaming session.
//!
//! Each session gets its own poll loop, cursor and correlator. The loops are
//! owned by the session and stop when it closes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use mhos_core::{AuditLevel, AuditRecord, AuditSink, StreamEvent, TelemetrySettings};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::activity::{ActivityCorrelator, ActivityRecord, CorrelatorConfig, ScheduledEnd};
use crate::process::ProcessEventBroadcaster;
use crate::stream::StreamSession;
use crate::tail::{DailyLogSource, StartAt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    /// Forward every audit record as an `audit` event as well.
    pub raw: bool,
    pub start: StartAt,
    pub poll_interval: Duration,
    pub correlator: CorrelatorConfig,
}

impl FeedOptions {
    pub const fn from_settings(settings: &TelemetrySettings) -> Self {
        Self {
            raw: false,
            start: StartAt::End,
            poll_interval: settings.poll_interval(),
            correlator: CorrelatorConfig::from_settings(settings),
        }
    }

    #[must_use]
    pub const fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    #[must_use]
    pub const fn start(mut self, start: StartAt) -> Self {
        self.start = start;
        self
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self::from_settings(&TelemetrySettings::with_defaults())
    }
}

#[derive(Debug, Default)]
struct FeedCounters {
    delivered: AtomicU64,
    malformed: AtomicU64,
    resets: AtomicU64,
}

/// Appends the per-session summary when the feed task goes away, whether it
/// returned or was aborted by the session closing.
struct FeedSummary {
    session: StreamSession,
    counters: Arc<FeedCounters>,
    audit: Arc<dyn AuditSink>,
}

impl Drop for FeedSummary {
    fn drop(&mut self) {
        let delivered = self.counters.delivered.load(Ordering::Relaxed);
        let malformed = self.counters.malformed.load(Ordering::Relaxed);
        let level = if malformed > 0 {
            AuditLevel::Warn
        } else {
            AuditLevel::Info
        };
        self.audit.append(
            AuditRecord::new(level, "system", "activity_stream_closed")
                .with_details(json!({
                    "session": self.session.id().to_string(),
                    "delivered": delivered,
                    "malformed": malformed,
                    "resets": self.counters.resets.load(Ordering::Relaxed),
                }))
                .with_actor("activity-feed"),
        );
    }
}

/// Tail the audit directory into `session` as start/end activity events.
pub fn spawn_activity_feed(
    session: &StreamSession,
    audit_dir: PathBuf,
    options: FeedOptions,
    audit: Arc<dyn AuditSink>,
) -> bool {
    let task_session = session.clone();
    session.spawn_task(async move {
        run_activity_feed(task_session, audit_dir, options, audit).await;
    })
}

async fn run_activity_feed(
    session: StreamSession,
    audit_dir: PathBuf,
    options: FeedOptions,
    audit: Arc<dyn AuditSink>,
) {
    let counters = Arc::new(FeedCounters::default());
    let _summary = FeedSummary {
        session: session.clone(),
        counters: counters.clone(),
        audit,
    };

    let mut source = match DailyLogSource::open(&audit_dir, options.start).await {
        Ok(source) => source,
        Err(e) => {
            warn!(dir = %audit_dir.display(), error = %e, "Cannot open activity log");
            session
                .send(&StreamEvent::info(format!("activity log unavailable: {e}")))
                .await;
            return;
        }
    };
    debug!(session = %session.id(), path = %source.current_path().display(), "Activity feed started");

    let correlator = Arc::new(Mutex::new(ActivityCorrelator::new(options.correlator)));
    let mut ticker = tokio::time::interval(options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = session.closed() => break,
        }

        let records: Vec<AuditRecord> = match source.poll_records().await {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %source.current_path().display(), error = %e, "Activity log poll failed");
                continue;
            }
        };
        let stats = source.stats();
        counters.malformed.store(stats.malformed, Ordering::Relaxed);
        counters.resets.store(stats.resets, Ordering::Relaxed);

        for record in records {
            if options.raw && session.send(&StreamEvent::Audit(record.clone())).await {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            let Some(activity) = ActivityRecord::from_audit(&record) else {
                continue;
            };

            let ingested = correlator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .ingest(activity, Utc::now());
            for event in ingested.events {
                if session.send(&StreamEvent::Activity(event)).await {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
            if let Some(end) = ingested.scheduled {
                schedule_end(&session, &correlator, &counters, end);
            }
        }

        if !session.is_open() {
            break;
        }
    }
}

fn schedule_end(
    session: &StreamSession,
    correlator: &Arc<Mutex<ActivityCorrelator>>,
    counters: &Arc<FeedCounters>,
    end: ScheduledEnd,
) {
    let target = session.clone();
    let correlator = correlator.clone();
    let counters = counters.clone();
    session.schedule(end.after, async move {
        let event = correlator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .complete(&end.key, end.generation);
        if let Some(event) = event
            && target.send(&StreamEvent::Activity(event)).await
        {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
    });
}

/// Relay supervisor lifecycle events into `session`.
pub fn spawn_process_feed(session: &StreamSession, events: &ProcessEventBroadcaster) -> bool {
    let mut receiver = events.subscribe();
    let target = session.clone();
    session.spawn_task(async move {
        loop {
            let event = tokio::select! {
                event = receiver.recv() => event,
                () = target.closed() => break,
            };
            match event {
                Ok(event) => {
                    if !target.send(&StreamEvent::Process(event)).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(session = %target.id(), skipped, "Process feed lagged");
                    target
                        .send(&StreamEvent::info(format!("{skipped} process events skipped")))
                        .await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
