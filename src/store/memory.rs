use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};

use super::{DocumentStore, Query, Snapshot, Subscription};
use crate::error::StoreError;
use crate::rooms::{sort_by_created_at, Message, NewMessage, Timestamp};

#[derive(Debug, Default)]
struct Collections {
    records: HashMap<String, Vec<Message>>,
    last_write: Option<DateTime<Utc>>,
}

/// In-process document store used in offline mode and by tests.
///
/// Every write bumps a revision counter; live subscriptions re-run their query
/// on each bump and push the full result as a new snapshot.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
    revision: Arc<watch::Sender<u64>>,
    ordered_queries: bool,
    write_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            collections: Arc::new(RwLock::new(Collections::default())),
            revision: Arc::new(revision),
            ordered_queries: true,
            write_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// A store that rejects ordered queries as if the index were missing.
    #[cfg(test)]
    pub fn without_indexes() -> Self {
        Self {
            ordered_queries: false,
            ..Self::new()
        }
    }

    /// Insert a record as-is, bypassing server timestamp resolution.
    pub async fn insert(&self, collection: &str, message: Message) {
        self.collections
            .write()
            .await
            .records
            .entry(collection.to_string())
            .or_default()
            .push(message);
        self.bump();
    }

    /// Make every following write fail with `detail`, or succeed again with `None`.
    #[cfg(test)]
    pub async fn fail_writes(&self, detail: Option<&str>) {
        *self.write_failure.write().await = detail.map(str::to_string);
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    async fn run_query(&self, collection: &str, query: &Query) -> Vec<Message> {
        let collections = self.collections.read().await;
        let mut messages: Vec<Message> = collections
            .records
            .get(collection)
            .map(|records| records.iter().filter(|m| query.matches(m)).cloned().collect())
            .unwrap_or_default();
        if query.order.is_some() {
            sort_by_created_at(&mut messages);
        }
        messages
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn scan_all(&self, collection: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self.run_query(collection, &Query::all()).await)
    }

    async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription, StoreError> {
        let ordered_queries = self.ordered_queries;
        let store = self.clone();
        let collection = collection.to_string();
        let mut revision = self.revision.subscribe();

        Ok(Subscription::spawn(move |tx| async move {
            if query.order.is_some() && !ordered_queries {
                let _ = tx
                    .send(Err(StoreError::OrderingUnsupported(
                        "The query requires an index on (room, createdAt)".to_string(),
                    )))
                    .await;
                return;
            }

            loop {
                let _ = revision.borrow_and_update();
                let messages = store.run_query(&collection, &query).await;
                if tx.send(Ok(Snapshot { messages })).await.is_err() {
                    return;
                }
                if revision.changed().await.is_err() {
                    return;
                }
            }
        }))
    }

    async fn append(&self, collection: &str, record: NewMessage) -> Result<String, StoreError> {
        if let Some(detail) = self.write_failure.read().await.clone() {
            return Err(StoreError::Failed(detail));
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        {
            let mut collections = self.collections.write().await;
            // Server clock never runs backwards across writes.
            let now = Utc::now();
            let created_at = collections.last_write.map_or(now, |last| last.max(now));
            collections.last_write = Some(created_at);
            collections
                .records
                .entry(collection.to_string())
                .or_default()
                .push(Message {
                    id: id.clone(),
                    text: record.text,
                    author: record.author,
                    room: record.room,
                    created_at: Timestamp::Resolved(created_at),
                });
        }
        self.bump();
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn new_message(room: &str, text: &str) -> NewMessage {
        NewMessage {
            text: text.to_string(),
            author: "alice".to_string(),
            room: room.to_string(),
        }
    }

    async fn next_snapshot(subscription: &mut Subscription) -> Snapshot {
        tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .expect("snapshot should arrive in time")
            .expect("subscription should still be live")
            .expect("snapshot should not be an error")
    }

    #[tokio::test]
    async fn append_resolves_non_decreasing_timestamps() {
        let store = MemoryStore::new();
        for text in ["one", "two", "three"] {
            store
                .append("messages", new_message("general", text))
                .await
                .expect("append should work");
        }

        let records = store.scan_all("messages").await.expect("scan should work");
        let stamps: Vec<_> = records.iter().map(|m| m.created_at).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert!(stamps.iter().all(|s| s.resolved().is_some()));
    }

    #[tokio::test]
    async fn subscription_pushes_initial_and_changed_snapshots() {
        let store = MemoryStore::new();
        store
            .append("messages", new_message("general", "hi"))
            .await
            .expect("append should work");

        let mut subscription = store
            .subscribe("messages", Query::room("general").ordered_by_created_at())
            .await
            .expect("subscribe should work");
        assert_eq!(next_snapshot(&mut subscription).await.messages.len(), 1);

        store
            .append("messages", new_message("random", "elsewhere"))
            .await
            .expect("append should work");
        store
            .append("messages", new_message("general", "there"))
            .await
            .expect("append should work");

        let mut latest = next_snapshot(&mut subscription).await;
        while latest.messages.len() < 2 {
            latest = next_snapshot(&mut subscription).await;
        }
        let texts: Vec<&str> = latest.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hi", "there"]);
    }

    #[tokio::test]
    async fn rejects_ordered_query_without_indexes() {
        let store = MemoryStore::without_indexes();
        let mut subscription = store
            .subscribe("messages", Query::room("general").ordered_by_created_at())
            .await
            .expect("subscribe should return a handle");

        let event = subscription.next().await.expect("an event should arrive");
        let err = event.expect_err("ordered query should be rejected");
        assert!(err.is_ordering_unsupported());
    }

    #[tokio::test]
    async fn failed_writes_store_nothing() {
        let store = MemoryStore::new();
        store.fail_writes(Some("quota exceeded")).await;

        let err = store
            .append("messages", new_message("general", "hi"))
            .await
            .expect_err("write should fail");
        assert_eq!(err, StoreError::Failed("quota exceeded".into()));
        assert!(store.scan_all("messages").await.unwrap().is_empty());
    }
}
