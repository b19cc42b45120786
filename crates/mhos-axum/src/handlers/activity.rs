//! Activity stream - agent start/end events derived from the audit log.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures_util::stream::Stream;
use mhos_runtime::{FeedOptions, spawn_activity_feed};
use serde::Deserialize;
use tracing::debug;

use crate::sse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    /// Also forward every audit record as an `audit` event.
    #[serde(default)]
    pub raw: bool,
}

pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let (session, rx) = state.streams.open();
    let options = FeedOptions::from_settings(&state.settings).raw(query.raw);
    spawn_activity_feed(
        &session,
        state.layout.audit_dir(),
        options,
        state.audit.clone(),
    );
    debug!(session = %session.id(), raw = query.raw, "Activity stream opened");
    sse::frames(rx)
}
