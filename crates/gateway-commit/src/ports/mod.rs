//! Port definitions: trait seams between this core and its collaborators.

pub mod inbound;
pub mod outbound;

pub use inbound::CommitApi;
pub use outbound::{
    AcceptAllVerifier, CommitEventVerifier, NetworkView, PeerEventStream, PeerStreamConnector,
    PeerStreamEvent,
};
