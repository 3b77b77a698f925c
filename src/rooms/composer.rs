use crate::auth::Identity;
use crate::error::{ChatError, ValidationError};
use crate::store::DocumentStore;

use super::NewMessage;

/// Input line of a room view plus the inline error shown above it.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    pub input: String,
    pub cursor_position: usize,
    pub error: Option<String>,
    pending: bool,
}

impl Composer {
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn insert_char(&mut self, c: char) {
        let byte_index = self.byte_index();
        self.input.insert(byte_index, c);
        self.cursor_position += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let byte_index = self.byte_index();
            self.input.remove(byte_index);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor_position = (self.cursor_position + 1).min(self.input.chars().count());
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(index, _)| index)
    }

    /// Validate the current input and build the record to write.
    ///
    /// Whitespace-only input is ignored (`Ok(None)`); a missing identity is
    /// surfaced inline. The text is written untrimmed and the author's display
    /// name is echoed verbatim.
    pub fn prepare(&mut self, room: &str, identity: Option<&Identity>) -> Result<Option<NewMessage>, ValidationError> {
        if self.pending || self.input.trim().is_empty() {
            return Ok(None);
        }
        let Some(identity) = identity else {
            self.error = Some(ValidationError::NotAuthenticated.to_string());
            return Err(ValidationError::NotAuthenticated);
        };

        self.pending = true;
        Ok(Some(NewMessage {
            text: self.input.clone(),
            author: identity.display_name.clone(),
            room: room.to_string(),
        }))
    }

    /// Apply the store's answer to a write issued by `prepare`.
    pub fn on_send_result(&mut self, result: &Result<String, ChatError>) {
        self.pending = false;
        match result {
            Ok(_) => {
                self.input.clear();
                self.cursor_position = 0;
                self.error = None;
            }
            Err(err) => self.error = Some(err.to_string()),
        }
    }
}

/// Append a prepared record to the message collection.
pub async fn deliver(store: &dyn DocumentStore, collection: &str, record: NewMessage) -> Result<String, ChatError> {
    let room = record.room.clone();
    match store.append(collection, record).await {
        Ok(id) => {
            tracing::debug!(%room, %id, "message acknowledged");
            Ok(id)
        }
        Err(err) => {
            tracing::warn!(%room, error = %err, "message write rejected");
            Err(ChatError::write(err))
        }
    }
}
