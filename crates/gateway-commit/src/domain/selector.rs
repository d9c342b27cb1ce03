//! Peer selection for long-lived notification sources.
//!
//! General-purpose listeners (block listeners, chaincode event listeners)
//! keep one notification source connected for long periods and need a
//! replacement when that peer dies. This is independent of the one-shot
//! commit confirmation fan-out, which always subscribes to the whole set its
//! strategy names.

use crate::domain::peer::PeerRef;
use crate::error::SelectorError;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Selection policy for the next notification source.
///
/// This is an extension point: callers may supply custom policies alongside
/// the built-in [`RoundRobinSelector`] and [`PinnedSelector`].
pub trait EventSourceSelector: Send + Sync {
    /// Select the peer the next notification source should connect to.
    fn next_peer(&self) -> Result<PeerRef, SelectorError>;

    /// Mark a peer dead (`alive = false`), removing it from rotation until a
    /// later call marks it alive again.
    fn update_availability(&self, peer: &PeerRef, alive: bool);
}

struct RoundRobinState {
    peers: Vec<PeerRef>,
    dead: HashSet<PeerRef>,
    cursor: usize,
}

/// Rotates over a configured peer list, skipping dead peers and wrapping
/// around.
pub struct RoundRobinSelector {
    state: Mutex<RoundRobinState>,
}

impl RoundRobinSelector {
    /// Create a selector over the configured peer list.
    #[must_use]
    pub fn new(peers: Vec<PeerRef>) -> Self {
        Self {
            state: Mutex::new(RoundRobinState {
                peers,
                dead: HashSet::new(),
                cursor: 0,
            }),
        }
    }
}

impl EventSourceSelector for RoundRobinSelector {
    fn next_peer(&self) -> Result<PeerRef, SelectorError> {
        let mut state = self.state.lock();
        let len = state.peers.len();
        for offset in 0..len {
            let index = (state.cursor + offset) % len;
            let candidate = state.peers[index].clone();
            if state.dead.contains(&candidate) {
                continue;
            }
            state.cursor = (index + 1) % len;
            debug!(peer = %candidate, "selected next event source");
            return Ok(candidate);
        }
        Err(SelectorError::NoAvailablePeers)
    }

    fn update_availability(&self, peer: &PeerRef, alive: bool) {
        let mut state = self.state.lock();
        if alive {
            if state.dead.remove(peer) {
                debug!(peer = %peer, "event source peer restored to rotation");
            }
        } else if state.dead.insert(peer.clone()) {
            warn!(peer = %peer, "event source peer marked dead");
        }
    }
}

/// No-rotation policy: always returns the pinned peer.
///
/// When the pinned peer dies, selection fails until the caller manually
/// supplies a replacement via [`PinnedSelector::pin`].
pub struct PinnedSelector {
    pinned: Mutex<Option<PeerRef>>,
}

impl PinnedSelector {
    /// Create a selector pinned to one peer.
    #[must_use]
    pub fn new(peer: PeerRef) -> Self {
        Self {
            pinned: Mutex::new(Some(peer)),
        }
    }

    /// Replace the pinned peer.
    pub fn pin(&self, peer: PeerRef) {
        debug!(peer = %peer, "pinned new event source peer");
        *self.pinned.lock() = Some(peer);
    }
}

impl EventSourceSelector for PinnedSelector {
    fn next_peer(&self) -> Result<PeerRef, SelectorError> {
        self.pinned
            .lock()
            .clone()
            .ok_or(SelectorError::NoAvailablePeers)
    }

    fn update_availability(&self, peer: &PeerRef, alive: bool) {
        if alive {
            return;
        }
        let mut pinned = self.pinned.lock();
        if pinned.as_ref() == Some(peer) {
            warn!(peer = %peer, "pinned event source peer marked dead");
            *pinned = None;
        }
    }
}
