// ABOUTME: Error types shared by the puppet host contract and the raw payload cache.
// ABOUTME: Distinguishes lookup misses and lifecycle misuse from storage and provider failures.

use thiserror::Error;

/// Which kind of raw payload a lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Contact,
    Room,
    Message,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contact => write!(f, "contact"),
            Self::Room => write!(f, "room"),
            Self::Message => write!(f, "message"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PuppetError {
    /// Nothing in cache and nothing from the provider. Expired messages land here too.
    #[error("{kind} payload not found for id {id}")]
    NotFound { kind: PayloadKind, id: String },

    #[error("already started: stop() before start() again")]
    AlreadyStarted,

    #[error("not started")]
    NotStarted,

    /// The cache was stopped and cannot be restarted
    #[error("raw cache has been stopped; construct a new one to start again")]
    Terminated,

    #[error("key-value store is closed")]
    StoreClosed,

    #[error("not logged in")]
    NotLoggedIn,

    /// A session cache is active; logout() before logging in again
    #[error("already logged in as {0}")]
    AlreadyLoggedIn(String),

    #[error("invalid cache namespace: {0}")]
    InvalidNamespace(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

impl PuppetError {
    pub fn not_found(kind: PayloadKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short label used for the error counter
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyStarted => "already_started",
            Self::NotStarted => "not_started",
            Self::Terminated => "terminated",
            Self::StoreClosed => "store_closed",
            Self::NotLoggedIn => "not_logged_in",
            Self::AlreadyLoggedIn(_) => "already_logged_in",
            Self::InvalidNamespace(_) => "invalid_namespace",
            Self::Store(_) => "store",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Provider(_) => "provider",
        }
    }
}

pub type Result<T, E = PuppetError> = std::result::Result<T, E>;
