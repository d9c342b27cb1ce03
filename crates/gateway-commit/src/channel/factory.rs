//! Channel factory: one peer, one channel, per network context.

use crate::channel::NotificationChannel;
use crate::domain::peer::PeerRef;
use crate::ports::outbound::{AcceptAllVerifier, CommitEventVerifier, PeerStreamConnector};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct CacheEntry {
    channel: Arc<NotificationChannel>,
    /// Channels supplied from outside are never closed by `dispose`; the
    /// supplier owns their lifecycle.
    external: bool,
}

/// Caches one [`NotificationChannel`] per peer within a network context.
///
/// Channels are created lazily on first request and connected in the
/// background: the factory never fails for connection problems, those
/// surface later through the registration error path of the affected
/// channel. The factory's lifecycle is tied to its network context; tear it
/// down with [`dispose`](Self::dispose) when the context goes away.
pub struct NotificationChannelFactory {
    connector: Arc<dyn PeerStreamConnector>,
    verifier: Arc<dyn CommitEventVerifier>,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl NotificationChannelFactory {
    /// Create a factory over the given stream connector.
    #[must_use]
    pub fn new(connector: Arc<dyn PeerStreamConnector>) -> Self {
        Self::with_verifier(connector, Arc::new(AcceptAllVerifier))
    }

    /// Create a factory whose channels screen events through `verifier`.
    #[must_use]
    pub fn with_verifier(
        connector: Arc<dyn PeerStreamConnector>,
        verifier: Arc<dyn CommitEventVerifier>,
    ) -> Self {
        Self {
            connector,
            verifier,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The channels for `peers`, in input order.
    ///
    /// Creates a channel on the first request for a peer, keyed by the
    /// peer's stable name, and returns the cached instance thereafter.
    pub fn channels_for(&self, peers: &[PeerRef]) -> Vec<Arc<NotificationChannel>> {
        let mut cache = self.cache.lock();
        peers
            .iter()
            .map(|peer| {
                if let Some(entry) = cache.get(peer.name()) {
                    return Arc::clone(&entry.channel);
                }
                let channel = Arc::new(NotificationChannel::new(
                    peer.clone(),
                    self.connector.stream_for(peer),
                    Arc::clone(&self.verifier),
                ));
                debug!(peer = %peer, "created notification channel");
                cache.insert(
                    peer.name().to_owned(),
                    CacheEntry {
                        channel: Arc::clone(&channel),
                        external: false,
                    },
                );

                // Connect in the background; failures surface through the
                // channel's own error path, never from the factory.
                let connecting = Arc::clone(&channel);
                tokio::spawn(async move {
                    if let Err(err) = connecting.connect().await {
                        warn!(peer = %connecting.peer(), error = %err, "background connect failed");
                    }
                });

                channel
            })
            .collect()
    }

    /// Insert a caller-owned channel into the cache.
    ///
    /// Subsequent `channels_for` requests for its peer return this instance,
    /// but `dispose` will not close it.
    pub fn register_external(&self, channel: Arc<NotificationChannel>) {
        let name = channel.peer().name().to_owned();
        debug!(peer = %name, "registered external notification channel");
        self.cache.lock().insert(
            name,
            CacheEntry {
                channel,
                external: true,
            },
        );
    }

    /// Number of channels currently cached.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Close every channel this factory created and empty the cache.
    ///
    /// Externally supplied channels are left open; closing shared resources
    /// the factory does not own would double-close them.
    pub async fn dispose(&self) {
        let entries: Vec<_> = self.cache.lock().drain().collect();
        info!(channels = entries.len(), "disposing notification channel factory");
        for (_, entry) in entries {
            if !entry.external {
                entry.channel.close().await;
            }
        }
    }
}
