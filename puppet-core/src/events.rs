// ABOUTME: Events a puppet emits to the host framework and the channel that carries them.
// ABOUTME: Message events carry only the id; consumers re-fetch payloads through point lookups.

use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuppetEvent {
    Login { contact_id: String },
    Logout { contact_id: String, data: String },
    Message { message_id: String },
    Error { data: String },
    Dong { data: String },
}

impl PuppetEvent {
    /// Event name as the host framework knows it
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Logout { .. } => "logout",
            Self::Message { .. } => "message",
            Self::Error { .. } => "error",
            Self::Dong { .. } => "dong",
        }
    }
}

/// Boxed stream type for puppet events
pub type EventStream = Pin<Box<dyn Stream<Item = PuppetEvent> + Send>>;

/// Fan-out sender for puppet events. Cloning shares the channel.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PuppetEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Emit to all current subscribers; with none, the event is dropped
    pub fn emit(&self, event: PuppetEvent) {
        tracing::trace!(event = event.name(), "Emitting puppet event");
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PuppetEvent> {
        self.tx.subscribe()
    }

    /// Subscribe as a stream. Lagged gaps are logged and skipped.
    pub fn stream(&self) -> EventStream {
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Puppet event stream lagged");
                None
            }
        });
        Box::pin(stream)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
