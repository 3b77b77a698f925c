use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use crate::auth::{Identity, IdentityProvider, SessionGate, SessionStorage, SignInRequest};
use crate::config::Config;
use crate::error::{AuthError, ChatError};
use crate::rooms::{
    create_room, deliver, filter_rooms, Composer, DirectoryUpdate, DirectoryWatcher, Message, StreamHandle, StreamState,
    StreamUpdate,
};
use crate::store::DocumentStore;

const MAX_STATUS_MESSAGES: usize = 100;

#[derive(Debug)]
enum AuthEvent {
    SignedIn(Result<Identity, AuthError>),
    Restored(Result<Identity, AuthError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInField {
    Login,
    Secret,
}

#[derive(Debug, Clone)]
pub struct SignInForm {
    pub login: String,
    pub secret: String,
    pub focus: SignInField,
}

impl SignInForm {
    fn new() -> Self {
        Self {
            login: String::new(),
            secret: String::new(),
            focus: SignInField::Login,
        }
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            SignInField::Login => &mut self.login,
            SignInField::Secret => &mut self.secret,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListMode {
    Browse,
    Search,
    Create(String),
}

/// Room list screen. Owns the directory watcher for as long as it is shown.
pub struct RoomListView {
    _watcher: DirectoryWatcher,
    updates: mpsc::UnboundedReceiver<DirectoryUpdate>,
    pub rooms: Vec<String>,
    pub loading: bool,
    pub search: String,
    pub mode: ListMode,
    pub selected: usize,
    pub error: Option<String>,
}

impl RoomView {
    fn scroll_back(&mut self, by: usize) {
        self.scroll_offset = (self.scroll_offset + by).min(self.messages.len().saturating_sub(1));
    }
}

impl RoomListView {
    pub fn visible_rooms(&self) -> Vec<String> {
        filter_rooms(&self.rooms, &self.search)
    }

    fn clamp_selection(&mut self) {
        let count = self.visible_rooms().len();
        self.selected = self.selected.min(count.saturating_sub(1));
    }
}

/// Open room. Owns the live subscription and the composer; dropping it
/// releases both, and acknowledgements still in flight are discarded.
pub struct RoomView {
    pub room: String,
    _stream: StreamHandle,
    updates: mpsc::UnboundedReceiver<StreamUpdate>,
    pub messages: Vec<Message>,
    pub state: StreamState,
    pub error: Option<String>,
    pub composer: Composer,
    sends_tx: mpsc::UnboundedSender<Result<String, ChatError>>,
    sends_rx: mpsc::UnboundedReceiver<Result<String, ChatError>>,
    /// Messages scrolled back from the newest one.
    pub scroll_offset: usize,
}

pub enum View {
    SignIn(SignInForm),
    /// A persisted session is being restored; no store work starts until the
    /// provider answers, so the first requests already carry the credential.
    Restoring,
    Rooms(RoomListView),
    Room(RoomView),
}

pub struct App {
    pub should_quit: bool,
    pub view: View,
    pub gate: SessionGate,
    pub backend_label: String,
    pub status_messages: Vec<String>,

    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn IdentityProvider>,
    collection: String,
    refresh_debounce: Duration,
    max_room_name_len: usize,
    pending_room: Option<String>,

    auth_tx: mpsc::UnboundedSender<AuthEvent>,
    auth_rx: mpsc::UnboundedReceiver<AuthEvent>,
}

impl App {
    pub fn new(
        config: &Config,
        backend_label: String,
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn IdentityProvider>,
        storage: Box<dyn SessionStorage>,
        auto_room: Option<&str>,
    ) -> Self {
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let gate = SessionGate::new(storage);

        let mut app = Self {
            should_quit: false,
            view: View::SignIn(SignInForm::new()),
            gate,
            backend_label,
            status_messages: Vec::new(),

            store,
            provider,
            collection: config.firestore.collection.clone(),
            refresh_debounce: config.refresh_debounce(),
            max_room_name_len: config.rooms.max_name_len,
            pending_room: auto_room.map(str::to_string),

            auth_tx,
            auth_rx,
        };

        if let Some(token) = app.gate.session_token() {
            app.restore_session(token);
            app.view = View::Restoring;
        }
        app
    }

    fn restore_session(&self, token: String) {
        let provider = Arc::clone(&self.provider);
        let auth_tx = self.auth_tx.clone();
        tokio::spawn(async move {
            let result = provider.restore(&token).await;
            let _ = auth_tx.send(AuthEvent::Restored(result));
        });
    }

    /// Rooms screen, or the room requested on the command line.
    fn enter_main_view(&mut self) {
        match self.pending_room.take() {
            Some(room) => match create_room(&room, self.max_room_name_len) {
                Ok(room) => self.open_room(room),
                Err(err) => {
                    self.add_status_message(format!("Cannot open room '{}': {}", room, err));
                    self.show_rooms();
                }
            },
            None => self.show_rooms(),
        }
    }

    fn show_rooms(&mut self) {
        let (tx, updates) = mpsc::unbounded_channel();
        let watcher = DirectoryWatcher::start(
            Arc::clone(&self.store),
            self.collection.clone(),
            self.refresh_debounce,
            tx,
        );
        // Replacing the view drops the previous watcher or stream.
        self.view = View::Rooms(RoomListView {
            _watcher: watcher,
            updates,
            rooms: Vec::new(),
            loading: true,
            search: String::new(),
            mode: ListMode::Browse,
            selected: 0,
            error: None,
        });
    }

    fn open_room(&mut self, room: String) {
        let (tx, updates) = mpsc::unbounded_channel();
        let stream = StreamHandle::open(Arc::clone(&self.store), self.collection.clone(), &room, tx);
        let (sends_tx, sends_rx) = mpsc::unbounded_channel();
        tracing::info!(%room, "opened room");
        self.view = View::Room(RoomView {
            room,
            _stream: stream,
            updates,
            messages: Vec::new(),
            state: StreamState::Subscribing,
            error: None,
            composer: Composer::default(),
            sends_tx,
            sends_rx,
            scroll_offset: 0,
        });
    }

    pub async fn handle_input(&mut self, event: Event) -> Result<()> {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Release {
                return Ok(());
            }
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                self.should_quit = true;
                return Ok(());
            }
            match self.view {
                View::SignIn(_) => self.handle_sign_in_key(key),
                View::Restoring => {
                    if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
                        self.should_quit = true;
                    }
                }
                View::Rooms(_) => self.handle_rooms_key(key)?,
                View::Room(_) => self.handle_room_key(key),
            }
        }
        Ok(())
    }

    fn handle_sign_in_key(&mut self, key: KeyEvent) {
        let View::SignIn(form) = &mut self.view else { return };
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                form.focus = match form.focus {
                    SignInField::Login => SignInField::Secret,
                    SignInField::Secret => SignInField::Login,
                };
            }
            KeyCode::Char(c) => form.focused_mut().push(c),
            KeyCode::Backspace => {
                form.focused_mut().pop();
            }
            KeyCode::Enter => {
                let request = SignInRequest {
                    login: form.login.clone(),
                    secret: form.secret.clone(),
                };
                self.sign_in(request);
            }
            _ => {}
        }
    }

    fn sign_in(&mut self, request: SignInRequest) {
        if !self.gate.begin_sign_in() {
            return;
        }
        let provider = Arc::clone(&self.provider);
        let auth_tx = self.auth_tx.clone();
        tokio::spawn(async move {
            let result = provider.interactive_sign_in(request).await;
            let _ = auth_tx.send(AuthEvent::SignedIn(result));
        });
    }

    fn handle_rooms_key(&mut self, key: KeyEvent) -> Result<()> {
        let View::Rooms(list) = &mut self.view else { return Ok(()) };
        match list.mode.clone() {
            ListMode::Browse => match key.code {
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Char('/') => list.mode = ListMode::Search,
                KeyCode::Char('n') => {
                    list.error = None;
                    list.mode = ListMode::Create(String::new());
                }
                KeyCode::Char('o') => self.sign_out()?,
                KeyCode::Up => list.selected = list.selected.saturating_sub(1),
                KeyCode::Down => {
                    list.selected += 1;
                    list.clamp_selection();
                }
                KeyCode::Esc => {
                    list.search.clear();
                    list.selected = 0;
                }
                KeyCode::Enter => {
                    if let Some(room) = list.visible_rooms().get(list.selected).cloned() {
                        self.open_room(room);
                    }
                }
                _ => {}
            },
            ListMode::Search => {
                match key.code {
                    KeyCode::Esc | KeyCode::Enter => list.mode = ListMode::Browse,
                    KeyCode::Char(c) => list.search.push(c),
                    KeyCode::Backspace => {
                        list.search.pop();
                    }
                    _ => {}
                }
                list.clamp_selection();
            }
            ListMode::Create(mut name) => match key.code {
                KeyCode::Esc => {
                    list.error = None;
                    list.mode = ListMode::Browse;
                }
                KeyCode::Enter => match create_room(&name, self.max_room_name_len) {
                    Ok(room) => self.open_room(room),
                    Err(err) => list.error = Some(err.to_string()),
                },
                KeyCode::Char(c) => {
                    if name.chars().count() < self.max_room_name_len {
                        name.push(c);
                    }
                    list.mode = ListMode::Create(name);
                }
                KeyCode::Backspace => {
                    name.pop();
                    list.mode = ListMode::Create(name);
                }
                _ => {}
            },
        }
        Ok(())
    }

    fn handle_room_key(&mut self, key: KeyEvent) {
        let View::Room(view) = &mut self.view else { return };
        match key.code {
            KeyCode::Esc => self.show_rooms(),
            KeyCode::Enter => self.submit_message(),
            KeyCode::Char(c) => view.composer.insert_char(c),
            KeyCode::Backspace => view.composer.backspace(),
            KeyCode::Left => view.composer.move_left(),
            KeyCode::Right => view.composer.move_right(),
            KeyCode::Up => view.scroll_back(1),
            KeyCode::Down => view.scroll_offset = view.scroll_offset.saturating_sub(1),
            KeyCode::PageUp => view.scroll_back(10),
            KeyCode::PageDown => view.scroll_offset = view.scroll_offset.saturating_sub(10),
            _ => {}
        }
    }

    fn submit_message(&mut self) {
        let View::Room(view) = &mut self.view else { return };
        let record = match view.composer.prepare(&view.room, self.gate.identity()) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(error = %err, "message rejected before sending");
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let collection = self.collection.clone();
        let sends_tx = view.sends_tx.clone();
        tokio::spawn(async move {
            let result = deliver(store.as_ref(), &collection, record).await;
            let _ = sends_tx.send(result);
        });
    }

    fn sign_out(&mut self) -> Result<()> {
        self.gate.sign_out()?;
        self.store.set_credential(None);
        self.view = View::SignIn(SignInForm::new());
        self.add_status_message("Signed out".to_string());
        Ok(())
    }

    pub fn add_status_message(&mut self, message: String) {
        self.status_messages
            .push(format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), message));

        if self.status_messages.len() > MAX_STATUS_MESSAGES {
            self.status_messages.remove(0);
        }
    }

    pub async fn on_tick(&mut self) -> Result<()> {
        while let Ok(event) = self.auth_rx.try_recv() {
            self.apply_auth_event(event);
        }

        match &mut self.view {
            View::SignIn(_) | View::Restoring => {}
            View::Rooms(list) => {
                while let Ok(update) = list.updates.try_recv() {
                    list.loading = false;
                    match update {
                        DirectoryUpdate::Rooms(rooms) => list.rooms = rooms,
                        DirectoryUpdate::ScanFailed(message) => {
                            tracing::debug!(%message, "keeping previous room list");
                        }
                    }
                }
                list.clamp_selection();
            }
            View::Room(view) => {
                while let Ok(update) = view.updates.try_recv() {
                    match update {
                        StreamUpdate::Messages { messages, state } => {
                            view.messages = messages;
                            view.state = state;
                            view.error = None;
                        }
                        StreamUpdate::Failed(message) => {
                            view.state = StreamState::Error(message.clone());
                            view.error = Some(message);
                        }
                    }
                }
                while let Ok(result) = view.sends_rx.try_recv() {
                    view.composer.on_send_result(&result);
                }
            }
        }

        Ok(())
    }

    fn apply_auth_event(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(Ok(identity)) => {
                let id_token = identity.id_token.clone();
                if let Err(err) = self.gate.complete_sign_in(identity) {
                    tracing::warn!(error = %err, "could not persist session");
                    self.gate.fail_sign_in(AuthError::Rejected(err.to_string()));
                    return;
                }
                self.store.set_credential(id_token);
                if matches!(self.view, View::SignIn(_)) {
                    self.enter_main_view();
                }
            }
            AuthEvent::SignedIn(Err(err)) => {
                self.gate.fail_sign_in(err);
            }
            AuthEvent::Restored(_) if !self.gate.is_authenticated() => {}
            AuthEvent::Restored(Ok(identity)) => {
                tracing::info!(user = %identity.display_name, "session restored");
                self.store.set_credential(identity.id_token.clone());
                self.gate.attach(identity);
                if matches!(self.view, View::Restoring) {
                    self.enter_main_view();
                }
            }
            AuthEvent::Restored(Err(err)) => {
                tracing::warn!(error = %err, "could not restore session identity");
                self.add_status_message("Signed in without an identity; sending is disabled".to_string());
                if matches!(self.view, View::Restoring) {
                    self.enter_main_view();
                }
            }
        }
    }

    pub fn current_identity_name(&self) -> Option<&str> {
        self.gate.identity().map(|identity| identity.display_name.as_str())
    }

    /// Newest messages, `scroll_offset` back from the end, that fit in
    /// `height` rows of `width` columns. At least one message is returned
    /// when the room has any.
    pub fn get_visible_messages(&self, height: usize, width: usize) -> Vec<&Message> {
        let View::Room(view) = &self.view else { return vec![] };
        let messages = &view.messages;
        let end = messages.len().saturating_sub(view.scroll_offset);

        let mut start = end;
        let mut used = 0;
        while start > 0 {
            let rows = message_rows(&messages[start - 1], width);
            if used + rows > height && start < end {
                break;
            }
            used += rows;
            start -= 1;
        }
        messages[start..end].iter().collect()
    }
}

/// Width of the `[HH:MM:SS] <author> ` prefix a message is rendered with.
pub fn message_prefix_len(message: &Message) -> usize {
    "[00:00:00] ".len() + message.author.chars().count() + "<> ".len()
}

/// Rows a message takes when hard-wrapped at `width` columns: the first row
/// holds the prefix and the start of the text, the rest holds text only.
pub fn message_rows(message: &Message, width: usize) -> usize {
    let width = width.max(1);
    let text_len = message.text.chars().count();
    let first = text_len.min(width.saturating_sub(message_prefix_len(message)));
    1 + (text_len - first).div_ceil(width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::auth::{MemorySessionStorage, OfflineIdentityProvider, AUTH_TOKEN_KEY};
    use crate::error::StoreError;
    use crate::rooms::{NewMessage, Timestamp};
    use crate::store::{MemoryStore, Query, Subscription};

    /// Rejects every request until a bearer credential has been set.
    struct CredentialRequired {
        inner: MemoryStore,
        credential: Mutex<Option<String>>,
    }

    impl CredentialRequired {
        fn check(&self) -> Result<(), StoreError> {
            match self.credential.lock().unwrap().as_deref() {
                Some(_) => Ok(()),
                None => Err(StoreError::failed("Missing or insufficient permissions.")),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for CredentialRequired {
        async fn scan_all(&self, collection: &str) -> Result<Vec<Message>, StoreError> {
            self.check()?;
            self.inner.scan_all(collection).await
        }

        async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription, StoreError> {
            self.check()?;
            self.inner.subscribe(collection, query).await
        }

        async fn append(&self, collection: &str, record: NewMessage) -> Result<String, StoreError> {
            self.check()?;
            self.inner.append(collection, record).await
        }

        fn set_credential(&self, id_token: Option<String>) {
            *self.credential.lock().unwrap() = id_token;
        }
    }

    /// Restores any token after a delay, issuing a store credential.
    struct SlowRestore;

    #[async_trait]
    impl IdentityProvider for SlowRestore {
        async fn interactive_sign_in(&self, _request: SignInRequest) -> Result<Identity, AuthError> {
            Err(AuthError::Cancelled)
        }

        async fn restore(&self, session_token: &str) -> Result<Identity, AuthError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Identity {
                display_name: "carol".to_string(),
                refresh_token: session_token.to_string(),
                id_token: Some("id-token".to_string()),
            })
        }
    }

    fn posted(room: &str, text: &str) -> Message {
        Message {
            id: format!("id-{}", text),
            text: text.to_string(),
            author: "dave".to_string(),
            room: room.to_string(),
            created_at: Timestamp::Resolved(Utc::now()),
        }
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_input(key(KeyCode::Char(c))).await.unwrap();
        }
    }

    async fn tick_until<F: Fn(&App) -> bool>(app: &mut App, done: F) {
        for _ in 0..200 {
            app.on_tick().await.unwrap();
            if done(app) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    fn test_app(store: Arc<MemoryStore>, storage: MemorySessionStorage) -> App {
        let mut config = Config::default();
        config.rooms.refresh_debounce_ms = 10;
        App::new(
            &config,
            "offline".to_string(),
            store,
            Arc::new(OfflineIdentityProvider),
            Box::new(storage),
            None,
        )
    }

    #[tokio::test]
    async fn starts_at_sign_in_without_token() {
        let app = test_app(Arc::new(MemoryStore::new()), MemorySessionStorage::default());
        assert!(matches!(app.view, View::SignIn(_)));
    }

    #[tokio::test]
    async fn sign_in_create_room_and_send() {
        let store = Arc::new(MemoryStore::new());
        let mut app = test_app(store.clone(), MemorySessionStorage::default());

        type_text(&mut app, "alice").await;
        app.handle_input(key(KeyCode::Enter)).await.unwrap();
        tick_until(&mut app, |app| matches!(app.view, View::Rooms(_))).await;
        assert!(app.gate.is_authenticated());
        assert_eq!(app.current_identity_name(), Some("alice"));

        app.handle_input(key(KeyCode::Char('n'))).await.unwrap();
        type_text(&mut app, " lobby ").await;
        app.handle_input(key(KeyCode::Enter)).await.unwrap();
        match &app.view {
            View::Room(view) => assert_eq!(view.room, "lobby"),
            _ => panic!("create should open the room"),
        }
        assert!(store.scan_all("messages").await.unwrap().is_empty());

        type_text(&mut app, "hello").await;
        app.handle_input(key(KeyCode::Enter)).await.unwrap();
        tick_until(&mut app, |app| match &app.view {
            View::Room(view) => view.composer.input.is_empty() && view.messages.len() == 1,
            _ => false,
        })
        .await;

        let stored = store.scan_all("messages").await.unwrap();
        assert_eq!(stored[0].author, "alice");
        assert_eq!(stored[0].room, "lobby");

        app.handle_input(key(KeyCode::Esc)).await.unwrap();
        tick_until(&mut app, |app| match &app.view {
            View::Rooms(list) => list.rooms == ["lobby"],
            _ => false,
        })
        .await;
    }

    #[tokio::test]
    async fn persisted_token_without_identity_cannot_send() {
        let mut storage = MemorySessionStorage::default();
        storage.set(AUTH_TOKEN_KEY, "expired-provider-token").unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut app = test_app(store.clone(), storage);
        assert!(matches!(app.view, View::Restoring));

        tick_until(&mut app, |app| matches!(app.view, View::Rooms(_))).await;
        assert!(!app.status_messages.is_empty());
        app.open_room("general".to_string());
        type_text(&mut app, "hi").await;
        app.handle_input(key(KeyCode::Enter)).await.unwrap();

        match &app.view {
            View::Room(view) => {
                assert_eq!(view.composer.error.as_deref(), Some("Not authenticated"));
                assert_eq!(view.composer.input, "hi");
            }
            _ => panic!("should still be in the room"),
        }
        assert!(store.scan_all("messages").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_filters_visible_rooms() {
        let store = Arc::new(MemoryStore::new());
        for room in ["General", "gaming", "random"] {
            store
                .append(
                    "messages",
                    crate::rooms::NewMessage {
                        text: "x".to_string(),
                        author: "bob".to_string(),
                        room: room.to_string(),
                    },
                )
                .await
                .unwrap();
        }
        let mut storage = MemorySessionStorage::default();
        storage.set(AUTH_TOKEN_KEY, "offline:abc:bob").unwrap();
        let mut app = test_app(store, storage);

        tick_until(&mut app, |app| match &app.view {
            View::Rooms(list) => list.rooms.len() == 3,
            _ => false,
        })
        .await;
        app.handle_input(key(KeyCode::Char('/'))).await.unwrap();
        type_text(&mut app, "GA").await;

        match &app.view {
            View::Rooms(list) => assert_eq!(list.visible_rooms(), ["gaming"]),
            _ => panic!("should be on the room list"),
        }
    }

    #[tokio::test]
    async fn sign_out_returns_to_sign_in() {
        let mut storage = MemorySessionStorage::default();
        storage.set(AUTH_TOKEN_KEY, "offline:abc:bob").unwrap();
        let mut app = test_app(Arc::new(MemoryStore::new()), storage);
        tick_until(&mut app, |app| matches!(app.view, View::Rooms(_))).await;

        app.handle_input(key(KeyCode::Char('o'))).await.unwrap();
        assert!(matches!(app.view, View::SignIn(_)));
        assert!(!app.gate.is_authenticated());
    }

    #[tokio::test]
    async fn restored_session_waits_for_credential_before_listing_rooms() {
        let inner = MemoryStore::new();
        inner.insert("messages", posted("general", "hi")).await;
        let store = Arc::new(CredentialRequired {
            inner: inner.clone(),
            credential: Mutex::new(None),
        });
        let mut storage = MemorySessionStorage::default();
        storage.set(AUTH_TOKEN_KEY, "refresh-token").unwrap();

        let mut config = Config::default();
        config.rooms.refresh_debounce_ms = 10;
        let mut app = App::new(
            &config,
            "firestore:test".to_string(),
            store,
            Arc::new(SlowRestore),
            Box::new(storage),
            None,
        );
        assert!(matches!(app.view, View::Restoring));

        tick_until(&mut app, |app| match &app.view {
            View::Rooms(list) => list.rooms == ["general"],
            _ => false,
        })
        .await;
        assert_eq!(app.current_identity_name(), Some("carol"));

        inner.insert("messages", posted("later", "news")).await;
        tick_until(&mut app, |app| match &app.view {
            View::Rooms(list) => list.rooms == ["general", "later"],
            _ => false,
        })
        .await;
    }

    #[tokio::test]
    async fn long_messages_push_older_ones_out_of_the_window() {
        let mut app = test_app(Arc::new(MemoryStore::new()), MemorySessionStorage::default());
        app.open_room("general".to_string());

        let short = posted("general", "ok");
        // Prefix "[hh:mm:ss] <dave> " is 18 columns; at width 40 this takes 3 rows.
        let long = posted("general", &"x".repeat(22 + 40 + 10));
        let newest = posted("general", "bye");
        assert_eq!(message_rows(&short, 40), 1);
        assert_eq!(message_rows(&long, 40), 3);

        if let View::Room(view) = &mut app.view {
            view.messages = vec![short, long.clone(), newest.clone()];
        }
        let texts = |messages: Vec<&Message>| messages.iter().map(|m| m.text.clone()).collect::<Vec<_>>();

        assert_eq!(texts(app.get_visible_messages(4, 40)), [long.text.clone(), newest.text.clone()]);
        assert_eq!(texts(app.get_visible_messages(2, 40)), [newest.text.clone()]);
        assert_eq!(app.get_visible_messages(5, 40).len(), 3);

        if let View::Room(view) = &mut app.view {
            view.scroll_back(10);
            assert_eq!(view.scroll_offset, 2);
        }
        // Scrolling back stops at the oldest message.
        assert_eq!(texts(app.get_visible_messages(1, 40)), [posted("general", "ok").text]);
    }
}
