//! Adapter from a stream session's frame channel to an axum SSE response.
//!
//! Keepalives are produced by the session itself, so the response does not
//! add axum's own keep-alive. When the client goes away the receiver is
//! dropped and the session's disconnect watcher closes it.

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures_util::stream::Stream;
use mhos_runtime::Frame;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

/// Turn the receiving half of a session into an SSE response body.
pub fn frames(
    rx: mpsc::Receiver<Frame>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    Sse::new(ReceiverStream::new(rx).map(|frame| Ok(to_event(frame))))
}

fn to_event(frame: Frame) -> Event {
    match frame {
        Frame::Event { event_type, data } => Event::default().event(event_type).data(data),
        Frame::Keepalive => Event::default().comment("keepalive"),
    }
}
