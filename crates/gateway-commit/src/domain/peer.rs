//! Peer and organization identity value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Organization (MSP) identifier.
///
/// Peers are partitioned by organizational membership; per-organization
/// quorum rules evaluate each organization's peers independently.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrgId(String);

impl OrgId {
    /// Create a new organization identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrgId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Stable reference to a peer within one network context.
///
/// Equality and hashing use only the peer `name`: the name is the stable key
/// under which channels are cached and quorum votes are counted, so two
/// `PeerRef` values naming the same peer are the same peer even if they were
/// constructed separately.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerRef {
    name: String,
    org: OrgId,
    endpoint: String,
}

impl PeerRef {
    /// Create a new peer reference.
    pub fn new(name: impl Into<String>, org: OrgId, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            org,
            endpoint: endpoint.into(),
        }
    }

    /// Stable peer name, unique within the network context.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning organization.
    #[must_use]
    pub fn org(&self) -> &OrgId {
        &self.org
    }

    /// Network endpoint the event stream connects to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PartialEq for PeerRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PeerRef {}

impl Hash for PeerRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
