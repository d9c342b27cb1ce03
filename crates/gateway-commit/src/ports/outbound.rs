//! Driven ports: the collaborators this core consumes.
//!
//! The wire protocol behind [`PeerEventStream`] (a streaming RPC carrying
//! block or filtered-block messages) and any cryptographic verification of
//! block contents are out of scope; the stream hands this core pre-decoded
//! commit events.

use crate::domain::peer::{OrgId, PeerRef};
use crate::domain::transaction::TransactionId;
use crate::domain::validation::ValidationCode;
use crate::error::ChannelError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One message delivered by a peer's raw event stream.
#[derive(Clone, Debug)]
pub enum PeerStreamEvent {
    /// The peer recorded a validation outcome for a transaction.
    Commit {
        tx_id: TransactionId,
        code: ValidationCode,
    },
}

/// Raw per-peer event-stream primitive a notification channel is built on.
///
/// Implementations own the transport. The stream is single-shot: once the
/// receiver returned by `connect` ends, the connection is gone and the
/// owning channel moves to its failed state permanently.
#[async_trait]
pub trait PeerEventStream: Send + Sync {
    /// Establish the stream. The receiver yields events until the peer
    /// drops the connection, at which point it ends.
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<PeerStreamEvent>, ChannelError>;

    /// Release the underlying transport. Idempotent.
    async fn close(&self);
}

/// Produces the raw event stream for a peer.
///
/// The channel factory's outbound dependency: one stream per peer, created
/// when the peer's channel is first requested.
pub trait PeerStreamConnector: Send + Sync {
    /// Build the event stream primitive for `peer`.
    fn stream_for(&self, peer: &PeerRef) -> Arc<dyn PeerEventStream>;
}

/// Read-only view of the network topology.
///
/// Queried once, at strategy construction; strategies never observe
/// topology changes after that point.
pub trait NetworkView: Send + Sync {
    /// Organization identifiers present on the channel, in configuration
    /// order.
    fn organizations(&self) -> Vec<OrgId>;

    /// The event-capable peers of one organization, in configuration order.
    fn event_peers(&self, org: &OrgId) -> Vec<PeerRef>;

    /// All event-capable peers, grouped by organization in organization
    /// order.
    fn all_event_peers(&self) -> Vec<PeerRef> {
        self.organizations()
            .iter()
            .flat_map(|org| self.event_peers(org))
            .collect()
    }
}

/// Pluggable pre-dispatch check for incoming commit events.
///
/// Validation codes are assumed authenticated by a lower layer; this hook
/// lets an integration add its own screening. Events it rejects are dropped
/// before any listener sees them.
pub trait CommitEventVerifier: Send + Sync {
    /// Whether the event from `peer` should be dispatched.
    fn verify(&self, peer: &PeerRef, event: &PeerStreamEvent) -> bool;
}

/// Default verifier: trusts the lower layer and accepts everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllVerifier;

impl CommitEventVerifier for AcceptAllVerifier {
    fn verify(&self, _peer: &PeerRef, _event: &PeerStreamEvent) -> bool {
        true
    }
}
