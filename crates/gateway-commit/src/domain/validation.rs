//! Peer-reported validation outcomes.

use crate::domain::peer::PeerRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A peer's deterministic outcome from validating a committed transaction
/// against its ledger state.
///
/// Codes arriving here are assumed authenticated by a lower layer; this core
/// only interprets them. Anything other than `Valid` is authoritative and
/// fatal for the transaction. `Other` keeps the set open for codes this
/// enum does not name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationCode {
    /// The transaction committed successfully.
    Valid,
    /// A key in the read set was modified between endorsement and commit.
    MvccReadConflict,
    /// A range query result changed between endorsement and commit.
    PhantomReadConflict,
    /// The endorsements did not satisfy the channel's endorsement policy.
    EndorsementPolicyFailure,
    /// A transaction with the same id was already committed.
    DuplicateTxid,
    /// The transaction payload could not be decoded.
    BadPayload,
    /// The proposal hash did not match the transaction id.
    BadProposalTxid,
    /// The creator signature failed verification.
    BadCreatorSignature,
    /// The response payload in the endorsement was malformed.
    BadResponsePayload,
    /// The read/write set was malformed.
    BadRwset,
    /// The write set touched a namespace it may not write to.
    IllegalWriteset,
    /// The referenced chaincode was not found or was disabled.
    InvalidChaincode,
    /// The chaincode version disagreed across endorsements.
    ChaincodeVersionConflict,
    /// The transaction referenced an unknown channel.
    TargetChainNotFound,
    /// The transaction expired before it was ordered.
    Expired,
    /// The peer did not validate the transaction.
    NotValidated,
    /// The peer rejected the transaction for an unspecified reason.
    InvalidOtherReason,
    /// A rejection code not modeled by name.
    Other(i32),
}

impl ValidationCode {
    /// Whether this code reports a successful commit.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Valid => "VALID",
            Self::MvccReadConflict => "MVCC_READ_CONFLICT",
            Self::PhantomReadConflict => "PHANTOM_READ_CONFLICT",
            Self::EndorsementPolicyFailure => "ENDORSEMENT_POLICY_FAILURE",
            Self::DuplicateTxid => "DUPLICATE_TXID",
            Self::BadPayload => "BAD_PAYLOAD",
            Self::BadProposalTxid => "BAD_PROPOSAL_TXID",
            Self::BadCreatorSignature => "BAD_CREATOR_SIGNATURE",
            Self::BadResponsePayload => "BAD_RESPONSE_PAYLOAD",
            Self::BadRwset => "BAD_RWSET",
            Self::IllegalWriteset => "ILLEGAL_WRITESET",
            Self::InvalidChaincode => "INVALID_CHAINCODE",
            Self::ChaincodeVersionConflict => "CHAINCODE_VERSION_CONFLICT",
            Self::TargetChainNotFound => "TARGET_CHAIN_NOT_FOUND",
            Self::Expired => "EXPIRED",
            Self::NotValidated => "NOT_VALIDATED",
            Self::InvalidOtherReason => "INVALID_OTHER_REASON",
            Self::Other(code) => return write!(f, "UNKNOWN_CODE({code})"),
        };
        f.write_str(name)
    }
}

/// Ephemeral report of one peer's validation outcome for one transaction.
///
/// Never persisted; it exists only on the dispatch path between a
/// notification channel and a commit handler.
#[derive(Clone, Debug)]
pub struct CommitReport {
    /// The reporting peer.
    pub peer: PeerRef,
    /// The validation code the peer recorded for the transaction.
    pub code: ValidationCode,
}
