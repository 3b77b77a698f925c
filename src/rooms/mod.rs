pub use composer::{deliver, Composer};
pub use directory::{create_room, filter_rooms, DirectoryUpdate, DirectoryWatcher};
pub use message::{sort_by_created_at, Message, NewMessage, Timestamp};
pub use stream::{StreamHandle, StreamState, StreamUpdate};

mod composer;
mod directory;
mod message;
mod stream;
