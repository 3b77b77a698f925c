use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::rooms::{Message, NewMessage};

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

mod firestore;
mod memory;

/// Buffered snapshot events per live subscription.
const SUBSCRIPTION_BUFFER: usize = 16;

/// Requested server-side ordering of a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    CreatedAtAscending,
}

/// Filter and ordering of a live query over the message collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub room: Option<String>,
    pub order: Option<Order>,
}

impl Query {
    /// Every record in the collection, unordered.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn room(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            order: None,
        }
    }

    pub fn ordered_by_created_at(mut self) -> Self {
        self.order = Some(Order::CreatedAtAscending);
        self
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.room.as_deref().map_or(true, |room| message.room == room)
    }
}

/// A full, consistent view of a query's matching records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub messages: Vec<Message>,
}

pub type SnapshotEvent = Result<Snapshot, StoreError>;

/// Live query handle. Dropping it releases the underlying listener.
pub struct Subscription {
    events: mpsc::Receiver<SnapshotEvent>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Spawn `producer` as the listener task feeding this subscription.
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<SnapshotEvent>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, events) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(producer(tx));
        Self { events, task }
    }

    /// Next pushed snapshot or error; `None` once the listener has stopped.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Client-side view of the real-time document database.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// One-shot read of every record in `collection`.
    async fn scan_all(&self, collection: &str) -> Result<Vec<Message>, StoreError>;

    /// Open a live query; the first event is the initial snapshot.
    async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription, StoreError>;

    /// Write a new record and return the id the store assigned to it.
    async fn append(&self, collection: &str, record: NewMessage) -> Result<String, StoreError>;

    /// Bearer credential for subsequent requests, when the backend uses one.
    fn set_credential(&self, _id_token: Option<String>) {}
}
