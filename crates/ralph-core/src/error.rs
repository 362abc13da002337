//! Error types for ralph

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    #[error("agent binary not found: {binary}")]
    MissingBinary { binary: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("session locked by pid {owner_pid}")]
    SessionLocked { owner_pid: u32 },

    #[error("rate limited{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("tracker error: {tracker} - {message}")]
    Tracker { tracker: String, message: String },

    #[error("runner error: {runner} - {message}")]
    Runner { runner: String, message: String },

    #[error("plugin crashed: {0}")]
    PluginCrash(String),

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("user cancelled")]
    UserCancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by the retry policy and the exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retried with exponential backoff.
    Transient,
    /// Sleep then retry; never counted against the retry budget.
    RateLimited,
    /// Surface and stop, no retry.
    Fatal,
    /// Refuse to start.
    SessionLocked,
    /// Clean stop, exit 0.
    UserCancelled,
}

impl Error {
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    pub fn tracker(tracker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tracker {
            tracker: tracker.into(),
            message: message.into(),
        }
    }

    pub fn runner(runner: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runner {
            runner: runner.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. }
            | Self::MissingBinary { .. }
            | Self::InvalidConfig(_)
            | Self::InvalidPrompt(_)
            | Self::PluginCrash(_)
            | Self::PluginNotFound(_) => ErrorKind::Fatal,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::SessionLocked { .. } => ErrorKind::SessionLocked,
            Self::UserCancelled => ErrorKind::UserCancelled,
            Self::Tracker { .. }
            | Self::Runner { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Internal(_) => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Process exit code: 0 success, 1 generic, 2 invalid arguments,
    /// 3 session-locked, 4 missing-binary, 5 auth.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UserCancelled => 0,
            Self::InvalidConfig(_) | Self::InvalidPrompt(_) => 2,
            Self::SessionLocked { .. } => 3,
            Self::MissingBinary { .. } => 4,
            Self::Auth { .. } => 5,
            _ => 1,
        }
    }
}
