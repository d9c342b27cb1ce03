//! Error types for the commit confirmation core.

use crate::domain::validation::ValidationCode;
use thiserror::Error;

/// Final failure reasons for a transaction commit wait.
///
/// A value of this type is the single outcome broadcast to every caller of
/// `wait_for_completion`, so it is `Clone`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// A peer deterministically rejected the transaction.
    ///
    /// Authoritative: one non-VALID validation code fails the transaction
    /// regardless of how many other peers might still confirm it.
    #[error("peer {peer} rejected the transaction: {code}")]
    PeerRejected { peer: String, code: ValidationCode },

    /// The commit timeout elapsed before any resolution.
    #[error("timed out after {after_secs}s waiting for commit events")]
    Timeout { after_secs: u64 },

    /// Enough notification sources failed that the quorum rule can no
    /// longer be satisfied.
    #[error("commit quorum unreachable, errored peers: {peers:?}")]
    AllSourcesErrored { peers: Vec<String> },

    /// `cancel_listening` was called before any other resolution.
    #[error("commit listening was cancelled")]
    Cancelled,
}

/// Synchronous configuration errors raised by `start_listening`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The commit strategy produced an empty fan-out set.
    #[error("commit strategy produced no event sources")]
    NoEventSources,

    /// `start_listening` was called more than once.
    #[error("commit handler is already listening or resolved")]
    AlreadyListening,
}

/// Per-channel errors surfaced through listener registration and dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Listener registration requires a non-empty transaction id.
    #[error("transaction id must not be empty")]
    EmptyTransactionId,

    /// The underlying peer event stream could not be established.
    #[error("failed to connect to peer {peer}: {reason}")]
    ConnectFailed { peer: String, reason: String },

    /// The peer dropped the notification connection.
    ///
    /// This does not mean the ledger rejected the transaction; the commit
    /// strategy decides whether remaining peers can still satisfy quorum.
    #[error("notification channel for peer {peer} disconnected")]
    Disconnected { peer: String },

    /// The channel was closed locally.
    #[error("notification channel for peer {peer} is closed")]
    Closed { peer: String },
}

/// Errors from event source selection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Every configured peer is currently marked dead.
    #[error("no available peers for event sourcing")]
    NoAvailablePeers,
}

/// Result type for commit resolution.
pub type CommitResult<T> = Result<T, CommitError>;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
