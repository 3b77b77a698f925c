use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{sort_by_created_at, Message};
use crate::error::{ChatError, StoreError, LOAD_MESSAGES_FAILED};
use crate::store::{DocumentStore, Query, Snapshot};

/// Which query the stream is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Server-ordered live query.
    Ordered,
    /// Unordered live query, sorted locally.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Subscribing,
    Streaming,
    DegradedFallback,
    Error(String),
}

/// What the driver must do after a store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Resubscribe,
    Stop,
}

/// Per-room subscription state machine, free of I/O.
#[derive(Debug, Clone)]
pub struct MessageStream {
    room: String,
    mode: StreamMode,
    state: StreamState,
    messages: Vec<Message>,
}

impl MessageStream {
    pub fn new(room: &str) -> Self {
        Self {
            room: room.to_string(),
            mode: StreamMode::Ordered,
            state: StreamState::Subscribing,
            messages: Vec::new(),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Live query for the current mode.
    pub fn query(&self) -> Query {
        let query = Query::room(&self.room);
        match self.mode {
            StreamMode::Ordered => query.ordered_by_created_at(),
            StreamMode::Fallback => query,
        }
    }

    /// Replace the local list with a pushed snapshot.
    pub fn on_snapshot(&mut self, snapshot: Snapshot) -> &[Message] {
        self.messages = snapshot.messages;
        match self.mode {
            StreamMode::Ordered => self.state = StreamState::Streaming,
            StreamMode::Fallback => {
                sort_by_created_at(&mut self.messages);
                self.state = StreamState::DegradedFallback;
            }
        }
        &self.messages
    }

    pub fn on_error(&mut self, err: StoreError) -> Recovery {
        match (self.mode, ChatError::subscription(err)) {
            (StreamMode::Ordered, ChatError::QueryOrderingUnsupported(detail)) => {
                tracing::info!(room = %self.room, %detail, "ordered query unsupported, falling back to local sort");
                self.mode = StreamMode::Fallback;
                self.state = StreamState::Subscribing;
                Recovery::Resubscribe
            }
            (_, err) => {
                tracing::warn!(room = %self.room, error = ?err, "message subscription failed");
                self.state = StreamState::Error(LOAD_MESSAGES_FAILED.to_string());
                Recovery::Stop
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    Messages {
        messages: Vec<Message>,
        state: StreamState,
    },
    Failed(String),
}

/// Drive `stream` against `store`, reporting every transition on `updates`.
pub async fn run_stream(
    store: Arc<dyn DocumentStore>,
    collection: String,
    mut stream: MessageStream,
    updates: mpsc::UnboundedSender<StreamUpdate>,
) {
    loop {
        tracing::info!(room = %stream.room(), mode = ?stream.mode(), "subscribing to room");
        let mut subscription = match store.subscribe(&collection, stream.query()).await {
            Ok(subscription) => subscription,
            Err(err) => match stream.on_error(err) {
                Recovery::Resubscribe => continue,
                Recovery::Stop => {
                    let _ = updates.send(StreamUpdate::Failed(LOAD_MESSAGES_FAILED.to_string()));
                    return;
                }
            },
        };

        let recovery = loop {
            match subscription.next().await {
                Some(Ok(snapshot)) => {
                    let messages = stream.on_snapshot(snapshot).to_vec();
                    tracing::debug!(room = %stream.room(), count = messages.len(), "room snapshot");
                    let update = StreamUpdate::Messages {
                        messages,
                        state: stream.state().clone(),
                    };
                    if updates.send(update).is_err() {
                        return;
                    }
                }
                Some(Err(err)) => break stream.on_error(err),
                None => return,
            }
        };

        subscription.unsubscribe();
        if recovery == Recovery::Stop {
            let _ = updates.send(StreamUpdate::Failed(LOAD_MESSAGES_FAILED.to_string()));
            return;
        }
    }
}

/// Owned live subscription for one room view; dropping it unsubscribes.
pub struct StreamHandle {
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn open(
        store: Arc<dyn DocumentStore>,
        collection: String,
        room: &str,
        updates: mpsc::UnboundedSender<StreamUpdate>,
    ) -> Self {
        let stream = MessageStream::new(room);
        Self {
            task: tokio::spawn(run_stream(store, collection, stream, updates)),
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
