//! Pure domain types and logic: peer identity, validation outcomes, quorum
//! bookkeeping, and event source selection. No I/O lives here.

pub mod peer;
pub mod quorum;
pub mod selector;
pub mod transaction;
pub mod validation;

pub use peer::{OrgId, PeerRef};
pub use quorum::{QuorumDecision, QuorumRule, QuorumScope, QuorumTracker};
pub use selector::{EventSourceSelector, PinnedSelector, RoundRobinSelector};
pub use transaction::TransactionId;
pub use validation::{CommitReport, ValidationCode};
