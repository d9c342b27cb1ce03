//! Per-transaction commit orchestration.
//!
//! A [`CommitHandler`] resolves exactly one outcome for one transaction id,
//! no matter how many or how few peer reports arrive. The resolve-once
//! guard is the handler's mutex-guarded phase plus a `watch` broadcast: the
//! first resolution among {strategy verdict, validation failure, timeout,
//! cancellation} wins and every later one is ignored, including races
//! between a near-simultaneous timeout and strategy decision.

use crate::channel::{NotificationChannel, TxListener};
use crate::domain::peer::PeerRef;
use crate::domain::transaction::TransactionId;
use crate::domain::validation::CommitReport;
use crate::error::{ChannelError, CommitError, CommitResult, ConfigError};
use crate::ports::inbound::CommitApi;
use crate::strategy::{CommitStrategy, StrategyVerdict};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commit handler configuration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CommitOptions {
    /// Seconds to wait for resolution before failing with a timeout.
    /// Zero means wait without bound.
    pub commit_timeout_secs: u64,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            commit_timeout_secs: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Listening,
    Resolved,
}

struct HandlerState {
    phase: Phase,
    strategy: Box<dyn CommitStrategy>,
    /// Channels the handler registered on; drained at resolution so every
    /// registration is removed by the time the wait completes.
    channels: Vec<Arc<NotificationChannel>>,
    timer: Option<JoinHandle<()>>,
}

struct HandlerInner {
    tx_id: TransactionId,
    state: Mutex<HandlerState>,
    outcome_tx: watch::Sender<Option<CommitResult<()>>>,
}

impl HandlerInner {
    /// Resolve-once: the first caller wins, later calls are no-ops.
    fn resolve(&self, outcome: CommitResult<()>) {
        let (channels, timer) = {
            let mut state = self.state.lock();
            if state.phase == Phase::Resolved {
                debug!(tx_id = %self.tx_id, "already resolved, ignoring late resolution");
                return;
            }
            state.phase = Phase::Resolved;
            (mem::take(&mut state.channels), state.timer.take())
        };

        for channel in &channels {
            channel.unregister_tx_listener(&self.tx_id);
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        match &outcome {
            Ok(()) => info!(tx_id = %self.tx_id, "transaction commit confirmed"),
            Err(err) => info!(tx_id = %self.tx_id, error = %err, "transaction commit failed"),
        }
        let _ = self.outcome_tx.send(Some(outcome));
    }

    /// A peer reported a validation outcome.
    fn on_event(&self, report: CommitReport) {
        if !report.code.is_valid() {
            // Deterministic and authoritative: short-circuit regardless of
            // how many other peers might still confirm.
            warn!(
                tx_id = %self.tx_id,
                peer = %report.peer,
                code = %report.code,
                "peer rejected transaction"
            );
            self.resolve(Err(CommitError::PeerRejected {
                peer: report.peer.name().to_owned(),
                code: report.code,
            }));
            return;
        }

        let pending = {
            let mut state = self.state.lock();
            if state.phase == Phase::Resolved {
                return;
            }
            debug!(tx_id = %self.tx_id, peer = %report.peer, "valid commit event");
            verdict_outcome(state.strategy.event_received(&report.peer))
        };
        if let Some(outcome) = pending {
            self.resolve(outcome);
        }
    }

    /// A peer's notification channel errored. The strategy decides whether
    /// remaining peers can still satisfy quorum.
    fn on_error(&self, peer: PeerRef, err: ChannelError) {
        let pending = {
            let mut state = self.state.lock();
            if state.phase == Phase::Resolved {
                return;
            }
            debug!(tx_id = %self.tx_id, peer = %peer, error = %err, "notification source errored");
            verdict_outcome(state.strategy.error_received(&peer))
        };
        if let Some(outcome) = pending {
            self.resolve(outcome);
        }
    }
}

fn verdict_outcome(verdict: StrategyVerdict) -> Option<CommitResult<()>> {
    match verdict {
        StrategyVerdict::Wait => None,
        StrategyVerdict::Success => Some(Ok(())),
        StrategyVerdict::Fail(peers) => Some(Err(CommitError::AllSourcesErrored {
            peers: peers.iter().map(|p| p.name().to_owned()).collect(),
        })),
    }
}

/// Orchestrates commit confirmation for one transaction id.
pub struct CommitHandler {
    inner: Arc<HandlerInner>,
    options: CommitOptions,
}

impl CommitHandler {
    /// Create a handler for `tx_id` using the given strategy's fan-out set.
    pub fn new(
        tx_id: impl Into<TransactionId>,
        strategy: impl CommitStrategy + 'static,
        options: CommitOptions,
    ) -> Self {
        let (outcome_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(HandlerInner {
                tx_id: tx_id.into(),
                state: Mutex::new(HandlerState {
                    phase: Phase::Idle,
                    strategy: Box::new(strategy),
                    channels: Vec::new(),
                    timer: None,
                }),
                outcome_tx,
            }),
            options,
        }
    }

    /// The transaction this handler confirms.
    #[must_use]
    pub fn transaction_id(&self) -> &TransactionId {
        &self.inner.tx_id
    }

    /// Register listeners across the fan-out set and start the timeout
    /// timer. Callable exactly once.
    ///
    /// An empty fan-out set fails synchronously: it would otherwise hang
    /// the wait forever. Channels that are already dead at registration
    /// time are fed to the strategy as error reports, so a strategy that
    /// can absorb them keeps listening on the rest.
    pub fn start_listening(&self) -> Result<(), ConfigError> {
        let mut decided = None;
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Idle {
                return Err(ConfigError::AlreadyListening);
            }
            let channels = state.strategy.event_sources().to_vec();
            if channels.is_empty() {
                return Err(ConfigError::NoEventSources);
            }
            state.phase = Phase::Listening;
            state.channels = channels.clone();

            debug!(
                tx_id = %self.inner.tx_id,
                fan_out = channels.len(),
                "listening for commit events"
            );
            for channel in &channels {
                let weak = Arc::downgrade(&self.inner);
                let listener = TxListener::new(
                    {
                        let weak = Weak::clone(&weak);
                        move |report| {
                            if let Some(inner) = weak.upgrade() {
                                inner.on_event(report);
                            }
                        }
                    },
                    move |peer, err| {
                        if let Some(inner) = weak.upgrade() {
                            inner.on_error(peer, err);
                        }
                    },
                );
                if let Err(err) = channel.register_tx_listener(self.inner.tx_id.clone(), listener)
                {
                    // The channel is already Failed/Closed; route it through
                    // the strategy like any other notification-source error.
                    let peer = channel.peer().clone();
                    debug!(tx_id = %self.inner.tx_id, peer = %peer, error = %err, "registration failed");
                    decided = verdict_outcome(state.strategy.error_received(&peer));
                    if decided.is_some() {
                        break;
                    }
                }
            }

            if decided.is_none() && self.options.commit_timeout_secs > 0 {
                state.timer = Some(self.spawn_timer());
            }
        }

        if let Some(outcome) = decided {
            self.inner.resolve(outcome);
        }
        Ok(())
    }

    /// Suspend until the transaction's fate is resolved.
    ///
    /// Resolution is broadcast, not consumed: any number of call sites may
    /// await it and all observe the identical outcome.
    pub async fn wait_for_completion(&self) -> CommitResult<()> {
        let mut rx = self.inner.outcome_tx.subscribe();
        loop {
            if let Some(outcome) = rx.borrow_and_update().as_ref() {
                return outcome.clone();
            }
            if rx.changed().await.is_err() {
                return Err(CommitError::Cancelled);
            }
        }
    }

    /// Unregister from every channel and cancel the timer.
    ///
    /// Before resolution this resolves the wait as cancelled rather than
    /// leaving it pending; after resolution it is a no-op.
    pub fn cancel_listening(&self) {
        self.inner.resolve(Err(CommitError::Cancelled));
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let secs = self.options.commit_timeout_secs;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if let Some(inner) = weak.upgrade() {
                warn!(tx_id = %inner.tx_id, after_secs = secs, "commit wait timed out");
                inner.resolve(Err(CommitError::Timeout { after_secs: secs }));
            }
        })
    }
}

#[async_trait]
impl CommitApi for CommitHandler {
    fn start_listening(&self) -> Result<(), ConfigError> {
        CommitHandler::start_listening(self)
    }

    async fn wait_for_completion(&self) -> CommitResult<()> {
        CommitHandler::wait_for_completion(self).await
    }

    fn cancel_listening(&self) {
        CommitHandler::cancel_listening(self);
    }
}
