//! Test utilities: scripted port implementations for driving the commit
//! core without a network.
//!
//! Available with the `test-utils` feature flag.

use crate::domain::peer::{OrgId, PeerRef};
use crate::domain::transaction::TransactionId;
use crate::domain::validation::ValidationCode;
use crate::error::ChannelError;
use crate::ports::outbound::{NetworkView, PeerEventStream, PeerStreamConnector, PeerStreamEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Build a peer reference with a synthetic endpoint.
#[must_use]
pub fn peer(name: &str, org: &str) -> PeerRef {
    PeerRef::new(name, OrgId::new(org), format!("grpcs://{name}:7051"))
}

/// Test-side handle for a [`ScriptedStream`]: delivers events and drops the
/// connection on demand.
pub struct StreamHandle {
    sender: Mutex<Option<mpsc::UnboundedSender<PeerStreamEvent>>>,
}

impl StreamHandle {
    /// Deliver a commit event for `tx_id`. Returns `false` once the
    /// connection was dropped.
    pub fn deliver(&self, tx_id: &str, code: ValidationCode) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender
                .send(PeerStreamEvent::Commit {
                    tx_id: TransactionId::from(tx_id),
                    code,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Drop the connection, as if the peer went away. The owning channel
    /// observes the stream ending and fails its pending listeners.
    pub fn drop_connection(&self) {
        self.sender.lock().take();
    }
}

/// In-memory [`PeerEventStream`] scripted from the test.
///
/// Events delivered through the handle before `connect` are buffered and
/// dispatched once the channel connects.
pub struct ScriptedStream {
    peer_name: String,
    fail_connect: bool,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<PeerStreamEvent>>>,
    closed: AtomicBool,
}

impl ScriptedStream {
    /// A connectable stream plus its scripting handle.
    #[must_use]
    pub fn pair() -> (Arc<Self>, Arc<StreamHandle>) {
        Self::pair_for("scripted")
    }

    /// Same as [`pair`](Self::pair) with an explicit peer name for error
    /// messages.
    #[must_use]
    pub fn pair_for(peer_name: &str) -> (Arc<Self>, Arc<StreamHandle>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                peer_name: peer_name.to_owned(),
                fail_connect: false,
                receiver: Mutex::new(Some(receiver)),
                closed: AtomicBool::new(false),
            }),
            Arc::new(StreamHandle {
                sender: Mutex::new(Some(sender)),
            }),
        )
    }

    /// A stream whose `connect` always fails.
    #[must_use]
    pub fn failing(peer_name: &str) -> Arc<Self> {
        Arc::new(Self {
            peer_name: peer_name.to_owned(),
            fail_connect: true,
            receiver: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerEventStream for ScriptedStream {
    async fn connect(&self) -> Result<mpsc::UnboundedReceiver<PeerStreamEvent>, ChannelError> {
        if self.fail_connect {
            return Err(ChannelError::ConnectFailed {
                peer: self.peer_name.clone(),
                reason: "scripted connect failure".to_owned(),
            });
        }
        self.receiver
            .lock()
            .take()
            .ok_or_else(|| ChannelError::ConnectFailed {
                peer: self.peer_name.clone(),
                reason: "stream already consumed".to_owned(),
            })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct ConnectorEntry {
    stream: Arc<ScriptedStream>,
    handle: Arc<StreamHandle>,
}

/// [`PeerStreamConnector`] handing out one scripted stream per peer name.
pub struct ScriptedConnector {
    entries: Mutex<HashMap<String, ConnectorEntry>>,
}

impl ScriptedConnector {
    /// Create an empty connector.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// The scripting handle for `peer_name`, creating the stream if this is
    /// the first reference to it.
    pub fn handle_for(&self, peer_name: &str) -> Arc<StreamHandle> {
        let mut entries = self.entries.lock();
        Arc::clone(&Self::entry(&mut entries, peer_name).handle)
    }

    /// Make `peer_name`'s stream fail on connect. Must be called before the
    /// stream is first requested.
    pub fn fail_connect(&self, peer_name: &str) {
        let mut entries = self.entries.lock();
        entries.insert(
            peer_name.to_owned(),
            ConnectorEntry {
                stream: ScriptedStream::failing(peer_name),
                handle: Arc::new(StreamHandle {
                    sender: Mutex::new(None),
                }),
            },
        );
    }

    fn entry<'a>(
        entries: &'a mut HashMap<String, ConnectorEntry>,
        peer_name: &str,
    ) -> &'a ConnectorEntry {
        entries.entry(peer_name.to_owned()).or_insert_with(|| {
            let (stream, handle) = ScriptedStream::pair_for(peer_name);
            ConnectorEntry { stream, handle }
        })
    }
}

impl PeerStreamConnector for ScriptedConnector {
    fn stream_for(&self, peer: &PeerRef) -> Arc<dyn PeerEventStream> {
        let mut entries = self.entries.lock();
        Arc::clone(&Self::entry(&mut entries, peer.name()).stream) as Arc<dyn PeerEventStream>
    }
}

/// Fixed topology [`NetworkView`] built org by org.
#[derive(Clone, Default)]
pub struct StaticNetworkView {
    orgs: Vec<(OrgId, Vec<PeerRef>)>,
}

impl StaticNetworkView {
    /// An empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an organization with the named event-capable peers.
    #[must_use]
    pub fn with_org(mut self, org: &str, peer_names: &[&str]) -> Self {
        let peers = peer_names.iter().map(|name| peer(name, org)).collect();
        self.orgs.push((OrgId::new(org), peers));
        self
    }
}

impl NetworkView for StaticNetworkView {
    fn organizations(&self) -> Vec<OrgId> {
        self.orgs.iter().map(|(org, _)| org.clone()).collect()
    }

    fn event_peers(&self, org: &OrgId) -> Vec<PeerRef> {
        self.orgs
            .iter()
            .find(|(id, _)| id == org)
            .map(|(_, peers)| peers.clone())
            .unwrap_or_default()
    }
}
