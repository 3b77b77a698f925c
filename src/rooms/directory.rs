use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};

use super::Message;
use crate::error::{StoreError, ValidationError};
use crate::store::{DocumentStore, Query};

/// Distinct room names across `messages`, sorted lexicographically.
pub fn list_rooms(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter(|message| !message.room.is_empty())
        .map(|message| message.room.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Scan the whole collection once and derive the room list.
pub async fn scan_rooms(store: &dyn DocumentStore, collection: &str) -> Result<Vec<String>, StoreError> {
    let messages = store.scan_all(collection).await?;
    Ok(list_rooms(&messages))
}

/// Case-insensitive substring filter over room names.
pub fn filter_rooms(rooms: &[String], term: &str) -> Vec<String> {
    let term = term.to_lowercase();
    rooms
        .iter()
        .filter(|room| room.to_lowercase().contains(&term))
        .cloned()
        .collect()
}

/// Validate a room name for selection. Nothing is written until the first
/// message lands in the room.
pub fn create_room(name: &str, max_len: usize) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyRoomName);
    }
    if name.chars().count() > max_len {
        return Err(ValidationError::RoomNameTooLong { max: max_len });
    }
    Ok(name.to_string())
}

/// Discards scan results that resolve after a newer scan was applied.
#[derive(Debug, Default)]
pub struct ScanFence {
    issued: u64,
    applied: u64,
}

impl ScanFence {
    /// Generation number for a scan about to start.
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Whether a result of `generation` may be applied; records it if so.
    pub fn accept(&mut self, generation: u64) -> bool {
        if generation <= self.applied {
            return false;
        }
        self.applied = generation;
        true
    }
}

type ScanOutcome = (u64, Result<Vec<String>, StoreError>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryUpdate {
    Rooms(Vec<String>),
    ScanFailed(String),
}

/// Live room list. Owns the collection listener, the debounce timer and any
/// in-flight scans; dropping it tears all of them down.
pub struct DirectoryWatcher {
    task: JoinHandle<()>,
}

impl DirectoryWatcher {
    pub fn start(
        store: Arc<dyn DocumentStore>,
        collection: String,
        debounce: Duration,
        updates: mpsc::UnboundedSender<DirectoryUpdate>,
    ) -> Self {
        let task = tokio::spawn(watch(store, collection, debounce, updates));
        Self { task }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch(
    store: Arc<dyn DocumentStore>,
    collection: String,
    debounce: Duration,
    updates: mpsc::UnboundedSender<DirectoryUpdate>,
) {
    let mut fence = ScanFence::default();
    let mut scans: JoinSet<ScanOutcome> = JoinSet::new();
    let mut deadline: Option<Instant> = None;

    let spawn_scan = |fence: &mut ScanFence, scans: &mut JoinSet<ScanOutcome>| {
        let generation = fence.issue();
        let store = Arc::clone(&store);
        let collection = collection.clone();
        scans.spawn(async move { (generation, scan_rooms(store.as_ref(), &collection).await) });
    };

    spawn_scan(&mut fence, &mut scans);

    let mut listener = match store.subscribe(&collection, Query::all()).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            tracing::warn!(error = %err, "room directory listener failed to start");
            None
        }
    };

    loop {
        tokio::select! {
            event = async { listener.as_mut()?.next().await }, if listener.is_some() => {
                match event {
                    Some(Ok(_)) => deadline = Some(Instant::now() + debounce),
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "room directory listener stopped");
                        listener = None;
                    }
                    None => listener = None,
                }
            }
            _ = async { sleep_until(deadline.unwrap_or_else(Instant::now)).await }, if deadline.is_some() => {
                deadline = None;
                spawn_scan(&mut fence, &mut scans);
            }
            Some(joined) = scans.join_next(), if !scans.is_empty() => {
                let Ok((generation, result)) = joined else { continue };
                if !fence.accept(generation) {
                    tracing::debug!(generation, "discarding stale room scan");
                    continue;
                }
                let update = match result {
                    Ok(rooms) => {
                        tracing::debug!(generation, count = rooms.len(), "room scan applied");
                        DirectoryUpdate::Rooms(rooms)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "room scan failed");
                        DirectoryUpdate::ScanFailed(err.to_string())
                    }
                };
                if updates.send(update).is_err() {
                    return;
                }
            }
            else => return,
        }
    }
}
