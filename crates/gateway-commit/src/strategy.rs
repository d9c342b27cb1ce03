//! Commit strategies: pluggable quorum rules over a fan-out set.

use crate::channel::{NotificationChannel, NotificationChannelFactory};
use crate::domain::peer::PeerRef;
use crate::domain::quorum::{QuorumDecision, QuorumRule, QuorumScope, QuorumTracker};
use crate::error::ConfigError;
use crate::ports::outbound::NetworkView;
use std::sync::Arc;
use tracing::{debug, warn};

/// A strategy's decision after one per-peer report.
///
/// At most one decisive verdict is ever produced; `Wait` leaves the handler
/// listening for further reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StrategyVerdict {
    /// Quorum not decided yet; keep listening.
    Wait,
    /// The quorum condition is satisfied.
    Success,
    /// Quorum can no longer be reached; carries the errored peers.
    Fail(Vec<PeerRef>),
}

/// Quorum rule deciding a transaction's fate from per-peer reports.
///
/// `event_received`/`error_received` are invoked once per distinct peer
/// report. A validation failure never reaches the strategy: the handler
/// short-circuits it, because a non-VALID code is deterministic and
/// authoritative. Strategies only weigh VALID reports against
/// notification-channel errors, which do not themselves mean the ledger
/// rejected the transaction.
pub trait CommitStrategy: Send + Sync {
    /// The fan-out set, computed once at construction from the network
    /// topology. Order is the registration order.
    fn event_sources(&self) -> &[Arc<NotificationChannel>];

    /// A peer reported VALID.
    fn event_received(&mut self, peer: &PeerRef) -> StrategyVerdict;

    /// A peer's notification channel errored.
    fn error_received(&mut self, peer: &PeerRef) -> StrategyVerdict;
}

/// The built-in strategies: scope × rule over the context's event peers.
///
/// | constructor         | success requires                                  |
/// |---------------------|---------------------------------------------------|
/// | `all_for_network`   | VALID from every peer in the fan-out set          |
/// | `any_for_network`   | VALID from any one peer                           |
/// | `all_per_org`       | VALID from every peer of every organization       |
/// | `any_per_org`       | VALID from at least one peer of every organization|
pub struct QuorumStrategy {
    scope: QuorumScope,
    rule: QuorumRule,
    channels: Vec<Arc<NotificationChannel>>,
    tracker: QuorumTracker,
}

impl QuorumStrategy {
    /// ALL rule over the pooled network.
    pub fn all_for_network(
        view: &dyn NetworkView,
        factory: &NotificationChannelFactory,
    ) -> Result<Self, ConfigError> {
        Self::build(QuorumScope::Network, QuorumRule::All, view, factory)
    }

    /// ANY rule over the pooled network.
    pub fn any_for_network(
        view: &dyn NetworkView,
        factory: &NotificationChannelFactory,
    ) -> Result<Self, ConfigError> {
        Self::build(QuorumScope::Network, QuorumRule::Any, view, factory)
    }

    /// ALL rule evaluated independently per organization.
    pub fn all_per_org(
        view: &dyn NetworkView,
        factory: &NotificationChannelFactory,
    ) -> Result<Self, ConfigError> {
        Self::build(QuorumScope::PerOrganization, QuorumRule::All, view, factory)
    }

    /// ANY rule evaluated independently per organization.
    pub fn any_per_org(
        view: &dyn NetworkView,
        factory: &NotificationChannelFactory,
    ) -> Result<Self, ConfigError> {
        Self::build(QuorumScope::PerOrganization, QuorumRule::Any, view, factory)
    }

    /// Build the fan-out set and tracker from the topology, queried once.
    ///
    /// Organizations without event-capable peers cannot vote and are left
    /// out of the quorum rather than making it unsatisfiable.
    fn build(
        scope: QuorumScope,
        rule: QuorumRule,
        view: &dyn NetworkView,
        factory: &NotificationChannelFactory,
    ) -> Result<Self, ConfigError> {
        let mut peers = Vec::new();
        for org in view.organizations() {
            let org_peers = view.event_peers(&org);
            if org_peers.is_empty() {
                warn!(org = %org, "organization has no event-capable peers, excluded from quorum");
                continue;
            }
            peers.extend(org_peers);
        }
        if peers.is_empty() {
            return Err(ConfigError::NoEventSources);
        }

        let tracker = QuorumTracker::new(scope, rule, &peers);
        let channels = factory.channels_for(&peers);
        debug!(?scope, ?rule, peers = peers.len(), "built commit quorum strategy");
        Ok(Self {
            scope,
            rule,
            channels,
            tracker,
        })
    }

    /// The configured scope.
    #[must_use]
    pub fn scope(&self) -> QuorumScope {
        self.scope
    }

    /// The configured rule.
    #[must_use]
    pub fn rule(&self) -> QuorumRule {
        self.rule
    }

    fn verdict(&self, decision: QuorumDecision) -> StrategyVerdict {
        match decision {
            QuorumDecision::Wait => StrategyVerdict::Wait,
            QuorumDecision::Success => StrategyVerdict::Success,
            QuorumDecision::Unreachable => StrategyVerdict::Fail(self.tracker.errored_peers()),
        }
    }
}

impl CommitStrategy for QuorumStrategy {
    fn event_sources(&self) -> &[Arc<NotificationChannel>] {
        &self.channels
    }

    fn event_received(&mut self, peer: &PeerRef) -> StrategyVerdict {
        let decision = self.tracker.record_valid(peer);
        self.verdict(decision)
    }

    fn error_received(&mut self, peer: &PeerRef) -> StrategyVerdict {
        let decision = self.tracker.record_error(peer);
        self.verdict(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::NotificationChannelFactory;
    use crate::testing::{ScriptedConnector, StaticNetworkView};

    fn fixture() -> (StaticNetworkView, NotificationChannelFactory) {
        let view = StaticNetworkView::new()
            .with_org("Org1", &["p1", "p2"])
            .with_org("Org2", &["p3"]);
        let factory = NotificationChannelFactory::new(ScriptedConnector::new());
        (view, factory)
    }

    #[tokio::test]
    async fn test_fan_out_preserves_org_order() {
        let (view, factory) = fixture();
        let strategy = QuorumStrategy::all_for_network(&view, &factory).unwrap();
        let names: Vec<_> = strategy
            .event_sources()
            .iter()
            .map(|c| c.peer().name().to_owned())
            .collect();
        assert_eq!(names, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_empty_topology_is_a_config_error() {
        let view = StaticNetworkView::new();
        let factory = NotificationChannelFactory::new(ScriptedConnector::new());
        let result = QuorumStrategy::any_for_network(&view, &factory);
        assert!(matches!(result, Err(ConfigError::NoEventSources)));
    }

    #[tokio::test]
    async fn test_org_without_event_peers_is_excluded() {
        let view = StaticNetworkView::new()
            .with_org("Org1", &["p1"])
            .with_org("Org2", &[]);
        let factory = NotificationChannelFactory::new(ScriptedConnector::new());
        let mut strategy = QuorumStrategy::any_per_org(&view, &factory).unwrap();
        assert_eq!(strategy.event_sources().len(), 1);

        let p1 = strategy.event_sources()[0].peer().clone();
        assert_eq!(strategy.event_received(&p1), StrategyVerdict::Success);
    }

    #[tokio::test]
    async fn test_any_network_resolves_on_first_valid() {
        let (view, factory) = fixture();
        let mut strategy = QuorumStrategy::any_for_network(&view, &factory).unwrap();
        let p3 = strategy.event_sources()[2].peer().clone();
        assert_eq!(strategy.event_received(&p3), StrategyVerdict::Success);
    }

    #[tokio::test]
    async fn test_all_network_fail_carries_errored_peers() {
        let (view, factory) = fixture();
        let mut strategy = QuorumStrategy::all_for_network(&view, &factory).unwrap();
        let p1 = strategy.event_sources()[0].peer().clone();
        let p2 = strategy.event_sources()[1].peer().clone();
        let p3 = strategy.event_sources()[2].peer().clone();

        assert_eq!(strategy.error_received(&p1), StrategyVerdict::Wait);
        assert_eq!(strategy.event_received(&p2), StrategyVerdict::Wait);
        assert_eq!(
            strategy.event_received(&p3),
            StrategyVerdict::Fail(vec![p1])
        );
    }
}
