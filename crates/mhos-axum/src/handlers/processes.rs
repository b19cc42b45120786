//! Supervisor lifecycle feed (started / stop requested / exited).

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_util::stream::Stream;
use mhos_runtime::spawn_process_feed;

use crate::sse;
use crate::state::AppState;

pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let (session, rx) = state.streams.open();
    spawn_process_feed(&session, state.supervisor.events());
    sse::frames(rx)
}
