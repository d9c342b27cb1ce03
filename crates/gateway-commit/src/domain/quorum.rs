//! Pure quorum bookkeeping for the built-in commit strategies.
//!
//! A [`QuorumTracker`] accumulates per-peer reports (VALID or channel error)
//! and decides when enough have arrived to resolve the transaction's fate.
//! Peers are partitioned into groups: one pooled group for network scope,
//! one group per organization for per-organization scope. The tracker holds
//! no channels and performs no I/O, which keeps every rule combination
//! unit-testable without a runtime.

use crate::domain::peer::PeerRef;
use std::collections::HashSet;
use tracing::debug;

/// How peers are pooled when evaluating the quorum rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuorumScope {
    /// All peers in the fan-out set form a single pool.
    Network,
    /// The rule is evaluated independently per organization; every
    /// organization must individually reach its verdict.
    PerOrganization,
}

/// The per-group success rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuorumRule {
    /// Every peer in the group must report VALID.
    All,
    /// One VALID report from any peer in the group suffices.
    Any,
}

/// Outcome of recording one report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuorumDecision {
    /// Not enough information yet; keep listening.
    Wait,
    /// Every group satisfied its rule.
    Success,
    /// Some group can no longer satisfy its rule.
    Unreachable,
}

/// One pool of peers sharing a verdict.
#[derive(Debug)]
struct QuorumGroup {
    peers: HashSet<PeerRef>,
    valid: HashSet<PeerRef>,
    errored: HashSet<PeerRef>,
}

/// Status of a single group under the tracker's rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GroupStatus {
    Pending,
    Satisfied,
    Lost,
}

impl QuorumGroup {
    fn new(peers: HashSet<PeerRef>) -> Self {
        Self {
            peers,
            valid: HashSet::new(),
            errored: HashSet::new(),
        }
    }

    fn contains(&self, peer: &PeerRef) -> bool {
        self.peers.contains(peer)
    }

    /// Peers that have reported either way.
    fn reported(&self) -> usize {
        self.valid.len() + self.errored.len()
    }

    fn status(&self, rule: QuorumRule) -> GroupStatus {
        match rule {
            QuorumRule::All => {
                if self.valid.len() == self.peers.len() {
                    GroupStatus::Satisfied
                } else if self.reported() == self.peers.len() {
                    // Every peer reported and at least one did not report
                    // VALID: the ALL requirement is permanently out of reach.
                    GroupStatus::Lost
                } else {
                    GroupStatus::Pending
                }
            }
            QuorumRule::Any => {
                if !self.valid.is_empty() {
                    GroupStatus::Satisfied
                } else if self.errored.len() == self.peers.len() {
                    GroupStatus::Lost
                } else {
                    GroupStatus::Pending
                }
            }
        }
    }
}

/// Accumulates per-peer reports and evaluates the quorum predicate.
#[derive(Debug)]
pub struct QuorumTracker {
    rule: QuorumRule,
    groups: Vec<QuorumGroup>,
}

impl QuorumTracker {
    /// Build a tracker over the fan-out peer set.
    ///
    /// For `Network` scope all peers share one group; for `PerOrganization`
    /// scope each organization present in `peers` gets its own group.
    #[must_use]
    pub fn new(scope: QuorumScope, rule: QuorumRule, peers: &[PeerRef]) -> Self {
        let groups = match scope {
            QuorumScope::Network => {
                vec![QuorumGroup::new(peers.iter().cloned().collect())]
            }
            QuorumScope::PerOrganization => {
                let mut orgs: Vec<_> = peers.iter().map(|p| p.org().clone()).collect();
                orgs.sort();
                orgs.dedup();
                orgs.into_iter()
                    .map(|org| {
                        QuorumGroup::new(
                            peers.iter().filter(|p| *p.org() == org).cloned().collect(),
                        )
                    })
                    .collect()
            }
        };
        Self { rule, groups }
    }

    /// Record a VALID report from `peer` and re-evaluate.
    pub fn record_valid(&mut self, peer: &PeerRef) -> QuorumDecision {
        self.record(peer, true)
    }

    /// Record a notification-channel error from `peer` and re-evaluate.
    pub fn record_error(&mut self, peer: &PeerRef) -> QuorumDecision {
        self.record(peer, false)
    }

    /// Every peer that has reported a channel error so far, sorted by name
    /// for stable error messages.
    #[must_use]
    pub fn errored_peers(&self) -> Vec<PeerRef> {
        let mut peers: Vec<_> = self
            .groups
            .iter()
            .flat_map(|g| g.errored.iter().cloned())
            .collect();
        peers.sort_by(|a, b| a.name().cmp(b.name()));
        peers
    }

    fn record(&mut self, peer: &PeerRef, valid: bool) -> QuorumDecision {
        let Some(group) = self.groups.iter_mut().find(|g| g.contains(peer)) else {
            debug!(peer = %peer, "report from peer outside the fan-out set, ignoring");
            return self.evaluate();
        };
        if valid {
            group.valid.insert(peer.clone());
        } else {
            group.errored.insert(peer.clone());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> QuorumDecision {
        let mut all_satisfied = true;
        for group in &self.groups {
            match group.status(self.rule) {
                GroupStatus::Lost => return QuorumDecision::Unreachable,
                GroupStatus::Pending => all_satisfied = false,
                GroupStatus::Satisfied => {}
            }
        }
        if all_satisfied {
            QuorumDecision::Success
        } else {
            QuorumDecision::Wait
        }
    }
}
