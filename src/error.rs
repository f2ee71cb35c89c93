//! Unified error handling for the scrapeflow crate
//!
//! All engine components return [`Error`]. The variants follow the four-way
//! taxonomy the engine relies on when deciding what to do with a failure:
//!
//! - per-user recoverable failures ([`Error::Fetch`], [`Error::Action`]) are
//!   logged and counted, and processing moves on to the next user
//! - contention ([`Error::UserActive`]) is a skip unless strict mode is on
//! - cancellation ([`Error::Cancelled`]) is always propagated and never retried
//! - [`Error::RetryExhausted`] ends only the call that was being retried
//!
//! # Usage
//!
//! ```rust
//! use scrapeflow::error::{Error, ErrorCategory};
//!
//! let err = Error::fetch("alice", "connection reset");
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), ErrorCategory::Remote);
//! ```

use std::io;
use thiserror::Error;

pub use crate::scheduler::error::SchedulerError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Failures reported by the content fetcher or action router
    Remote,
    /// Another caller already holds the user's claim
    Contention,
    /// The run-scoped cancellation signal fired
    Cancellation,
    /// A retried call ran out of attempts
    Exhausted,
    /// Configuration and validation errors
    Config,
    /// Scheduler and timing errors
    Scheduler,
    /// Storage and I/O errors
    Io,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in log fields and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Contention => "contention",
            Self::Cancellation => "cancellation",
            Self::Exhausted => "exhausted",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the scrapeflow crate
#[derive(Error, Debug)]
pub enum Error {
    /// The run-scoped cancellation signal fired
    #[error("operation cancelled")]
    Cancelled,

    /// The user is already being processed by another caller
    #[error("user '{user}' is already active")]
    UserActive { user: String },

    /// Post retrieval failed for a user
    #[error("fetch failed for '{user}': {reason}")]
    Fetch { user: String, reason: String },

    /// The action router reported a failure
    #[error("action '{action}' failed for '{user}': {reason}")]
    Action {
        action: String,
        user: String,
        reason: String,
    },

    /// All retry attempts failed; the last underlying error is preserved
    #[error("gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A dispatched job panicked
    #[error("worker task panicked: {0}")]
    WorkerPanic(String),

    /// Scheduler and timing errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a fetch error for a user
    pub fn fetch(user: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            user: user.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an action error for a user
    pub fn action(action: impl Into<String>, user: impl Into<String>, reason: impl ToString) -> Self {
        Self::Action {
            action: action.into(),
            user: user.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True for the cancellation condition, including one wrapped by a retry
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::RetryExhausted { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error is recoverable (processing may continue)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch { .. } | Self::Action { .. } | Self::UserActive { .. } => true,
            Self::RetryExhausted { .. } | Self::WorkerPanic(_) => true,
            Self::Io(_) => true,
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Cancelled | Self::Json(_) | Self::Config(_) | Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch { .. } | Self::Action { .. } => ErrorCategory::Remote,
            Self::UserActive { .. } => ErrorCategory::Contention,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::RetryExhausted { .. } => ErrorCategory::Exhausted,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Io(_) | Self::Json(_) => ErrorCategory::Io,
            Self::Config(_) => ErrorCategory::Config,
            Self::WorkerPanic(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
