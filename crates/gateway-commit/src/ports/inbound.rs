//! Driving port: the commit confirmation API exposed to the SDK's
//! submission flow.

use crate::error::{CommitResult, ConfigError};
use async_trait::async_trait;

/// Per-transaction commit confirmation.
///
/// Implemented by [`CommitHandler`](crate::handler::CommitHandler). The
/// submission flow calls `start_listening` immediately after handing the
/// transaction to the ordering service, then awaits `wait_for_completion`.
#[async_trait]
pub trait CommitApi: Send + Sync {
    /// Register listeners across the strategy's fan-out set and start the
    /// timeout timer. Callable exactly once.
    fn start_listening(&self) -> Result<(), ConfigError>;

    /// Suspend until the transaction's fate is resolved. May be awaited
    /// from multiple call sites; all observe the identical outcome.
    async fn wait_for_completion(&self) -> CommitResult<()>;

    /// Unregister everywhere and cancel the timer. Before resolution this
    /// resolves the wait as cancelled; afterwards it is a no-op.
    fn cancel_listening(&self);
}
