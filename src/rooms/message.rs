use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation time of a message as resolved by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timestamp {
    /// Written but not yet acknowledged by the server.
    Pending,
    Resolved(DateTime<Utc>),
}

impl Timestamp {
    /// Sort key used for local ordering; pending timestamps count as the epoch.
    pub fn sort_key(&self) -> DateTime<Utc> {
        match self {
            Timestamp::Pending => DateTime::<Utc>::UNIX_EPOCH,
            Timestamp::Resolved(at) => *at,
        }
    }

    pub fn resolved(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Pending => None,
            Timestamp::Resolved(at) => Some(*at),
        }
    }
}

impl From<Option<DateTime<Utc>>> for Timestamp {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Timestamp::Pending, Timestamp::Resolved)
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A message record as stored in the message collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author: String,
    pub room: String,
    pub created_at: Timestamp,
}

/// A message about to be written; the store assigns id and creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub author: String,
    pub room: String,
}

/// Stable sort by creation time, pending timestamps first.
pub fn sort_by_created_at(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: &str, created_at: Timestamp) -> Message {
        Message {
            id: id.to_string(),
            text: id.to_string(),
            author: "alice".to_string(),
            room: "general".to_string(),
            created_at,
        }
    }

    #[test]
    fn pending_sorts_before_resolved() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(Timestamp::Pending < Timestamp::Resolved(at));
        assert_eq!(Timestamp::Pending.sort_key(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn sort_is_stable_for_equal_timestamps() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut messages = vec![
            message("late", Timestamp::Resolved(at + chrono::Duration::seconds(5))),
            message("first-equal", Timestamp::Resolved(at)),
            message("pending", Timestamp::Pending),
            message("second-equal", Timestamp::Resolved(at)),
        ];

        sort_by_created_at(&mut messages);

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["pending", "first-equal", "second-equal", "late"]);
    }
}
