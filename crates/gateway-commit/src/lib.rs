//! # gateway-commit
//!
//! Transaction commit confirmation core for the gateway client SDK.
//!
//! ## Overview
//!
//! After a transaction has been endorsed and submitted to the ordering
//! service, the client must determine whether it ultimately committed.
//! Peers are independent processes that report outcomes at different times,
//! may never report at all, may report validation failure deterministically,
//! or may drop the notification connection without the transaction itself
//! having failed. This crate correlates those per-peer notifications into a
//! single reliable answer:
//!
//! - **NotificationChannel**: one subscription per peer, dispatching commit
//!   events to per-transaction listeners
//! - **NotificationChannelFactory**: one-peer-one-channel caching within a
//!   network context
//! - **CommitStrategy**: pluggable quorum rules (ALL/ANY × per-org/network)
//! - **CommitHandler**: per-transaction orchestration with timeout,
//!   cancellation, and a single guaranteed resolution
//! - **EventSourceSelector**: peer rotation/failover for long-lived
//!   notification sources
//!
//! ## Architecture
//!
//! ```text
//! submission flow ──tx id──→ CommitHandler ──quorum──→ CommitStrategy
//!                                 │
//!                                 ├── register/unregister ──→ NotificationChannel (×N)
//!                                 │                                  │
//!                                 │                          PeerEventStream (port)
//!                                 │
//!                                 └── one-shot timer, resolve-once guard
//! ```
//!
//! The crate follows Hexagonal Architecture:
//! - **Domain layer**: peer identity, validation codes, quorum bookkeeping,
//!   source selection (no I/O)
//! - **Ports layer**: traits for the event stream, topology view, and the
//!   commit API
//! - **Channel/handler layer**: the async machinery wiring domain to ports
//!
//! Out of scope, consumed through ports: proposal construction and signing,
//! endorsement policy evaluation, identity/wallet storage, and the wire
//! protocol of the underlying block event stream.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gateway_commit::{
//!     CommitHandler, CommitOptions, NotificationChannelFactory, QuorumStrategy,
//! };
//!
//! let factory = NotificationChannelFactory::new(connector);
//! let strategy = QuorumStrategy::any_per_org(&network_view, &factory)?;
//!
//! let handler = CommitHandler::new(
//!     tx_id,
//!     strategy,
//!     CommitOptions { commit_timeout_secs: 30 },
//! );
//! handler.start_listening()?;
//! handler.wait_for_completion().await?;
//! ```

pub mod channel;
pub mod domain;
pub mod error;
pub mod handler;
pub mod ports;
pub mod strategy;

/// Test utilities (scripted streams, static topology views).
///
/// Requires feature: `test-utils`
#[cfg(feature = "test-utils")]
pub mod testing;

pub use channel::{ChannelState, NotificationChannel, NotificationChannelFactory, TxListener};
pub use domain::{
    CommitReport, EventSourceSelector, OrgId, PeerRef, PinnedSelector, QuorumRule, QuorumScope,
    RoundRobinSelector, TransactionId, ValidationCode,
};
pub use error::{
    ChannelError, ChannelResult, CommitError, CommitResult, ConfigError, SelectorError,
};
pub use handler::{CommitHandler, CommitOptions};
pub use ports::inbound::CommitApi;
pub use ports::outbound::{
    AcceptAllVerifier, CommitEventVerifier, NetworkView, PeerEventStream, PeerStreamConnector,
    PeerStreamEvent,
};
pub use strategy::{CommitStrategy, QuorumStrategy, StrategyVerdict};
