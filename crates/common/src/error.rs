//! Error taxonomy for tablet manager calls.
//!
//! Every failure a caller can observe is a [`CallError`]. Timeouts are
//! carried by the distinguished [`TimeoutError`] so callers can test for
//! them with [`is_timeout_error`] instead of matching on message text.

use crate::TabletAlias;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

/// A shareable underlying cause.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// TimeoutError
// ---------------------------------------------------------------------------

/// The call's deadline expired, either before any I/O or while waiting.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TimeoutError {
    message: String,
    #[source]
    cause: Option<SharedError>,
}

impl TimeoutError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: SharedError) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// DialError
// ---------------------------------------------------------------------------

/// Failure to establish a connection to a tablet manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialError {
    #[error("invalid address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("connect to {addr} did not complete within {timeout:?}")]
    TimedOut { addr: String, timeout: Duration },
}

// ---------------------------------------------------------------------------
// CallError
// ---------------------------------------------------------------------------

/// Coarse classification of a [`CallError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallErrorKind {
    /// The deadline expired.
    Timeout,
    /// The caller cancelled the wait.
    Interrupted,
    /// The connection or stream failed locally or in transit.
    Transport,
    /// The remote agent ran the operation and reported a failure.
    Remote,
}

impl CallErrorKind {
    /// Lowercase label, as used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallErrorKind::Timeout => "timeout",
            CallErrorKind::Interrupted => "interrupted",
            CallErrorKind::Transport => "transport",
            CallErrorKind::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("RPC error for TabletManager.{method} on {alias}: {source}")]
    Dial {
        alias: TabletAlias,
        method: &'static str,
        #[source]
        source: DialError,
    },

    #[error("remote error for TabletManager.{method} on {alias}: {message}")]
    Remote {
        alias: TabletAlias,
        method: &'static str,
        message: String,
    },

    #[error("interrupted waiting for TabletManager.{method} to {alias}")]
    Interrupted {
        alias: TabletAlias,
        method: &'static str,
    },

    #[error("stream TabletManager.{method} from {alias} failed: {message}")]
    Stream {
        alias: TabletAlias,
        method: &'static str,
        message: String,
    },

    #[error("cannot decode TabletManager.{method} response from {alias}: {message}")]
    Decode {
        alias: TabletAlias,
        method: &'static str,
        message: String,
    },

    #[error("unexpected TabletManager.{method} response from {alias}: {message}")]
    UnexpectedResponse {
        alias: TabletAlias,
        method: &'static str,
        message: String,
    },
}

impl CallError {
    pub fn kind(&self) -> CallErrorKind {
        match self {
            CallError::Timeout(_) => CallErrorKind::Timeout,
            CallError::Interrupted { .. } => CallErrorKind::Interrupted,
            CallError::Dial { .. } | CallError::Stream { .. } | CallError::Decode { .. } => {
                CallErrorKind::Transport
            }
            CallError::Remote { .. } | CallError::UnexpectedResponse { .. } => {
                CallErrorKind::Remote
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == CallErrorKind::Timeout
    }

    pub fn is_interrupted(&self) -> bool {
        self.kind() == CallErrorKind::Interrupted
    }

    /// The alias of the tablet the call was addressed to, if the error carries one.
    pub fn alias(&self) -> Option<&TabletAlias> {
        match self {
            CallError::Timeout(_) => None,
            CallError::Dial { alias, .. }
            | CallError::Remote { alias, .. }
            | CallError::Interrupted { alias, .. }
            | CallError::Stream { alias, .. }
            | CallError::Decode { alias, .. }
            | CallError::UnexpectedResponse { alias, .. } => Some(alias),
        }
    }
}

/// Whether `err`, or anything in its source chain, is a [`TimeoutError`].
pub fn is_timeout_error(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<TimeoutError>() {
            return true;
        }
        // `Timeout` is transparent, so its source() skips the TimeoutError itself.
        if let Some(CallError::Timeout(_)) = e.downcast_ref::<CallError>() {
            return true;
        }
        current = e.source();
    }
    false
}
