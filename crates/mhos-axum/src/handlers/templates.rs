//! Template change feed.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_util::stream::Stream;
use mhos_core::StreamEvent;
use mhos_runtime::watch;
use tracing::warn;

use crate::sse;
use crate::state::AppState;

pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let (session, rx) = state.streams.open();
    let dir = state.layout.templates_dir();
    if let Err(e) = watch(&session, &dir).await {
        warn!(dir = %dir.display(), error = %e, "Cannot watch templates");
        session
            .send(&StreamEvent::info(format!("watch failed: {e}")))
            .await;
        state.streams.close(&session);
    }
    sse::frames(rx)
}
