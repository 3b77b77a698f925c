use thiserror::Error;

/// Generic message shown when interactive sign-in fails for any reason.
pub const SIGN_IN_FAILED: &str = "Failed to sign in. Please try again.";

/// Generic message shown when a room subscription fails.
pub const LOAD_MESSAGES_FAILED: &str = "Could not load messages. Please try again.";

/// Errors surfaced by a document store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The ordered query needs an index the store does not have.
    #[error("ordering not supported without index: {0}")]
    OrderingUnsupported(String),
    /// Transport trouble or a server-side outage; the same request may succeed later.
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

impl StoreError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    #[cfg(test)]
    pub fn is_ordering_unsupported(&self) -> bool {
        matches!(self, Self::OrderingUnsupported(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Failed(err.to_string())
        }
    }
}

/// Errors surfaced by an identity provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("sign-in rejected by provider: {0}")]
    Rejected(String),
    #[error("sign-in cancelled")]
    Cancelled,
    #[error("network failure during sign-in: {0}")]
    Network(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Input rejected before anything is written.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("room name is empty")]
    EmptyRoomName,
    #[error("room name is longer than {max} characters")]
    RoomNameTooLong { max: usize },
}

#[derive(Debug, Error)]
pub enum SessionStorageError {
    #[error("failed to access session file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse session file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode session: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Failures of the synchronization core, one variant per surfaced category.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{}", SIGN_IN_FAILED)]
    AuthFailure(#[source] AuthError),
    #[error("query ordering unsupported: {0}")]
    QueryOrderingUnsupported(String),
    #[error("{}", LOAD_MESSAGES_FAILED)]
    SubscriptionFailure(#[source] StoreError),
    #[error("Failed to send message: {0}")]
    WriteFailure(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionStorageError),
}

impl ChatError {
    /// Map a store error raised while writing.
    pub fn write(err: StoreError) -> Self {
        match err {
            StoreError::OrderingUnsupported(detail)
            | StoreError::Unavailable(detail)
            | StoreError::Failed(detail) => Self::WriteFailure(detail),
        }
    }

    /// Map a store error raised by a live query.
    pub fn subscription(err: StoreError) -> Self {
        match err {
            StoreError::OrderingUnsupported(detail) => Self::QueryOrderingUnsupported(detail),
            other => Self::SubscriptionFailure(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_failure_surfaces_store_detail_verbatim() {
        let err = ChatError::write(StoreError::failed("permission denied"));
        assert_eq!(err.to_string(), "Failed to send message: permission denied");
    }

    #[test]
    fn subscription_errors_keep_ordering_condition_distinct() {
        let err = ChatError::subscription(StoreError::OrderingUnsupported("index".into()));
        assert!(matches!(err, ChatError::QueryOrderingUnsupported(_)));

        let err = ChatError::subscription(StoreError::failed("offline"));
        assert_eq!(err.to_string(), LOAD_MESSAGES_FAILED);
    }

    #[test]
    fn auth_failures_hide_the_provider_detail() {
        let err = ChatError::AuthFailure(AuthError::Network("dns".into()));
        assert_eq!(err.to_string(), SIGN_IN_FAILED);
    }

    #[test]
    fn not_authenticated_reads_like_the_inline_message() {
        let err: ChatError = ValidationError::NotAuthenticated.into();
        assert_eq!(err.to_string(), "Not authenticated");
    }
}
