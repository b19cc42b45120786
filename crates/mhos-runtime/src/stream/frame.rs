use mhos_core::StreamEvent;

/// One unit written to a streaming transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event {
        event_type: &'static str,
        data: String,
    },
    /// Comment frame that keeps idle connections and proxies alive.
    Keepalive,
}

impl Frame {
    pub fn from_event(event: &StreamEvent) -> serde_json::Result<Self> {
        Ok(Self::Event {
            event_type: event.event_type(),
            data: event.payload()?,
        })
    }

    /// Text/event-stream encoding.
    pub fn encode(&self) -> String {
        match self {
            Self::Event { event_type, data } => format!("event: {event_type}\ndata: {data}\n\n"),
            Self::Keepalive => ": keepalive\n\n".to_string(),
        }
    }

    pub const fn is_keepalive(&self) -> bool {
        matches!(self, Self::Keepalive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mhos_core::{ChangeEvent, ChangeKind};

    #[test]
    fn event_frame_encoding() {
        let frame = Frame::from_event(&StreamEvent::Change(ChangeEvent {
            name: "greeting".into(),
            change_type: ChangeKind::Created,
        }))
        .unwrap();

        assert_eq!(
            frame.encode(),
            "event: change\ndata: {\"name\":\"greeting\",\"changeType\":\"created\"}\n\n"
        );
    }

    #[test]
    fn keepalive_is_a_comment() {
        assert_eq!(Frame::Keepalive.encode(), ": keepalive\n\n");
        assert!(Frame::Keepalive.is_keepalive());
    }
}
