use async_trait::async_trait;

use crate::error::{AuthError, ChatError, SIGN_IN_FAILED};

pub use firebase::FirebaseAuth;
pub use offline::OfflineIdentityProvider;
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};

mod firebase;
mod offline;
mod storage;

/// Storage key of the persisted session token.
pub const AUTH_TOKEN_KEY: &str = "auth-token";

/// A signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub refresh_token: String,
    /// Bearer credential for the document store, when the provider issues one.
    pub id_token: Option<String>,
}

/// What the user typed into the sign-in form.
#[derive(Debug, Clone, Default)]
pub struct SignInRequest {
    pub login: String,
    pub secret: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn interactive_sign_in(&self, request: SignInRequest) -> Result<Identity, AuthError>;

    /// Rebuild an identity from a persisted session token.
    async fn restore(&self, session_token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInState {
    Idle,
    Loading,
    Failed(String),
}

/// Decides between the sign-in flow and the main application.
///
/// Presence of the persisted token is trusted as-is; the backing services
/// reject stale credentials on their own.
pub struct SessionGate {
    storage: Box<dyn SessionStorage>,
    state: SignInState,
    identity: Option<Identity>,
}

impl SessionGate {
    pub fn new(storage: Box<dyn SessionStorage>) -> Self {
        Self {
            storage,
            state: SignInState::Idle,
            identity: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.storage.get(AUTH_TOKEN_KEY).is_some()
    }

    pub fn session_token(&self) -> Option<String> {
        self.storage.get(AUTH_TOKEN_KEY)
    }

    pub fn state(&self) -> &SignInState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Enter the loading state; returns false if a sign-in is already running.
    pub fn begin_sign_in(&mut self) -> bool {
        if self.state == SignInState::Loading {
            return false;
        }
        self.state = SignInState::Loading;
        true
    }

    pub fn complete_sign_in(&mut self, identity: Identity) -> Result<(), ChatError> {
        self.storage.set(AUTH_TOKEN_KEY, &identity.refresh_token)?;
        tracing::info!(user = %identity.display_name, "signed in");
        self.identity = Some(identity);
        self.state = SignInState::Idle;
        Ok(())
    }

    /// Record a failed sign-in; the cause is logged, never shown.
    pub fn fail_sign_in(&mut self, err: AuthError) -> ChatError {
        tracing::warn!(error = %err, "sign-in failed");
        self.state = SignInState::Failed(SIGN_IN_FAILED.to_string());
        ChatError::AuthFailure(err)
    }

    /// Attach an identity restored from the persisted token.
    pub fn attach(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    pub fn sign_out(&mut self) -> Result<(), ChatError> {
        self.storage.remove(AUTH_TOKEN_KEY)?;
        self.identity = None;
        self.state = SignInState::Idle;
        tracing::info!("signed out");
        Ok(())
    }
}
