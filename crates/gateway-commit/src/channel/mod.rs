//! Notification channels: one logical subscription per peer.
//!
//! A [`NotificationChannel`] translates a single peer's asynchronous event
//! stream into callbacks for any number of concurrently registered
//! transaction listeners. Channels are shared: one instance serves every
//! active transaction interested in that peer within a network context.
//!
//! Dispatch discipline: a listener's registration is removed from the map
//! under the lock, and its callback is invoked only after the lock is
//! released. A peer therefore delivers at most one report per transaction
//! id, and no application callback ever runs while the registration map is
//! locked.

pub mod factory;

pub use factory::NotificationChannelFactory;

use crate::domain::peer::PeerRef;
use crate::domain::transaction::TransactionId;
use crate::domain::validation::CommitReport;
use crate::error::{ChannelError, ChannelResult};
use crate::ports::outbound::{CommitEventVerifier, PeerEventStream, PeerStreamEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection lifecycle of a channel.
///
/// `Failed` and `Closed` are terminal: a channel is never reused, a fresh
/// instance is required after either.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Created, not yet connecting.
    Disconnected,
    /// `connect` is in flight.
    Connecting,
    /// The event stream is live and dispatching.
    Connected,
    /// The stream could not be established or was dropped by the peer.
    Failed,
    /// Closed locally.
    Closed,
}

impl ChannelState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Callbacks registered for one transaction on one channel.
///
/// Exactly one of the two callbacks fires, at most once: either the peer
/// reports a validation outcome, or the channel fails/closes first.
pub struct TxListener {
    on_event: Box<dyn FnOnce(CommitReport) + Send>,
    on_error: Box<dyn FnOnce(PeerRef, ChannelError) + Send>,
}

impl TxListener {
    /// Build a listener from its two callbacks.
    pub fn new(
        on_event: impl FnOnce(CommitReport) + Send + 'static,
        on_error: impl FnOnce(PeerRef, ChannelError) + Send + 'static,
    ) -> Self {
        Self {
            on_event: Box::new(on_event),
            on_error: Box::new(on_error),
        }
    }
}

struct ChannelInner {
    state: ChannelState,
    registrations: HashMap<TransactionId, TxListener>,
    dispatch_task: Option<JoinHandle<()>>,
}

/// One logical subscription to a single peer's commit-event stream.
pub struct NotificationChannel {
    peer: PeerRef,
    stream: Arc<dyn PeerEventStream>,
    verifier: Arc<dyn CommitEventVerifier>,
    inner: Arc<Mutex<ChannelInner>>,
}

impl NotificationChannel {
    /// Create a channel for `peer` over the given stream primitive.
    #[must_use]
    pub fn new(
        peer: PeerRef,
        stream: Arc<dyn PeerEventStream>,
        verifier: Arc<dyn CommitEventVerifier>,
    ) -> Self {
        Self {
            peer,
            stream,
            verifier,
            inner: Arc::new(Mutex::new(ChannelInner {
                state: ChannelState::Disconnected,
                registrations: HashMap::new(),
                dispatch_task: None,
            })),
        }
    }

    /// The peer this channel subscribes to.
    #[must_use]
    pub fn peer(&self) -> &PeerRef {
        &self.peer
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    /// Number of currently registered transaction listeners.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.inner.lock().registrations.len()
    }

    /// Establish the underlying event stream and start dispatching.
    ///
    /// On failure the channel moves to `Failed` and every currently
    /// registered listener is failed with the connection error; there is no
    /// internal retry. Calling `connect` while already connecting or
    /// connected is a no-op.
    pub async fn connect(&self) -> ChannelResult<()> {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ChannelState::Disconnected => inner.state = ChannelState::Connecting,
                ChannelState::Connecting | ChannelState::Connected => return Ok(()),
                ChannelState::Failed => {
                    return Err(ChannelError::Disconnected {
                        peer: self.peer.name().to_owned(),
                    })
                }
                ChannelState::Closed => {
                    return Err(ChannelError::Closed {
                        peer: self.peer.name().to_owned(),
                    })
                }
            }
        }

        match self.stream.connect().await {
            Ok(receiver) => {
                let mut inner = self.inner.lock();
                if inner.state != ChannelState::Connecting {
                    // Closed while the connect was in flight.
                    return Err(ChannelError::Closed {
                        peer: self.peer.name().to_owned(),
                    });
                }
                inner.state = ChannelState::Connected;
                inner.dispatch_task = Some(tokio::spawn(dispatch_loop(
                    self.peer.clone(),
                    Arc::clone(&self.verifier),
                    Arc::clone(&self.inner),
                    receiver,
                )));
                debug!(peer = %self.peer, "notification channel connected");
                Ok(())
            }
            Err(err) => {
                warn!(peer = %self.peer, error = %err, "notification channel connect failed");
                fail_all(&self.peer, &self.inner, err.clone());
                Err(err)
            }
        }
    }

    /// Register callbacks for one transaction id.
    ///
    /// The id must be non-empty. If the channel is already `Failed` or
    /// `Closed` the descriptive error is returned synchronously instead of
    /// registering; the caller routes it exactly as it would an
    /// asynchronous channel error. A second registration for the same id
    /// replaces the first.
    pub fn register_tx_listener(
        &self,
        tx_id: TransactionId,
        listener: TxListener,
    ) -> ChannelResult<()> {
        if tx_id.is_empty() {
            return Err(ChannelError::EmptyTransactionId);
        }
        let mut inner = self.inner.lock();
        match inner.state {
            ChannelState::Failed => Err(ChannelError::Disconnected {
                peer: self.peer.name().to_owned(),
            }),
            ChannelState::Closed => Err(ChannelError::Closed {
                peer: self.peer.name().to_owned(),
            }),
            _ => {
                debug!(peer = %self.peer, tx_id = %tx_id, "registered commit listener");
                inner.registrations.insert(tx_id, listener);
                Ok(())
            }
        }
    }

    /// Remove the registration for a transaction id. Idempotent; removing a
    /// non-existent registration is not an error.
    pub fn unregister_tx_listener(&self, tx_id: &TransactionId) {
        let removed = self.inner.lock().registrations.remove(tx_id);
        if removed.is_some() {
            debug!(peer = %self.peer, tx_id = %tx_id, "unregistered commit listener");
        }
    }

    /// Close the channel, failing all pending listeners and releasing the
    /// stream. Idempotent.
    pub async fn close(&self) {
        let (listeners, task) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return;
            }
            inner.state = ChannelState::Closed;
            (
                inner.registrations.drain().collect::<Vec<_>>(),
                inner.dispatch_task.take(),
            )
        };

        info!(peer = %self.peer, pending = listeners.len(), "closing notification channel");
        if let Some(task) = task {
            task.abort();
        }
        let err = ChannelError::Closed {
            peer: self.peer.name().to_owned(),
        };
        for (_, listener) in listeners {
            (listener.on_error)(self.peer.clone(), err.clone());
        }
        self.stream.close().await;
    }
}

/// Move the channel to `Failed` and fail every pending listener.
///
/// No-op if the channel already reached a terminal state (a close racing a
/// stream drop must not fail listeners twice).
fn fail_all(peer: &PeerRef, inner: &Arc<Mutex<ChannelInner>>, err: ChannelError) {
    let listeners = {
        let mut inner = inner.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.state = ChannelState::Failed;
        inner.registrations.drain().collect::<Vec<_>>()
    };
    warn!(peer = %peer, pending = listeners.len(), error = %err, "notification channel failed");
    for (_, listener) in listeners {
        (listener.on_error)(peer.clone(), err.clone());
    }
}

/// Drain the stream receiver, dispatching each event to the listener
/// registered for its transaction id.
async fn dispatch_loop(
    peer: PeerRef,
    verifier: Arc<dyn CommitEventVerifier>,
    inner: Arc<Mutex<ChannelInner>>,
    mut receiver: mpsc::UnboundedReceiver<PeerStreamEvent>,
) {
    while let Some(event) = receiver.recv().await {
        if !verifier.verify(&peer, &event) {
            warn!(peer = %peer, "dropping commit event rejected by verifier");
            continue;
        }
        let PeerStreamEvent::Commit { tx_id, code } = event;
        let listener = inner.lock().registrations.remove(&tx_id);
        match listener {
            Some(listener) => {
                debug!(peer = %peer, tx_id = %tx_id, code = %code, "dispatching commit event");
                (listener.on_event)(CommitReport {
                    peer: peer.clone(),
                    code,
                });
            }
            None => {
                debug!(peer = %peer, tx_id = %tx_id, "commit event with no listener, dropping");
            }
        }
    }

    // The peer dropped the connection.
    fail_all(
        &peer,
        &inner,
        ChannelError::Disconnected {
            peer: peer.name().to_owned(),
        },
    );
}
