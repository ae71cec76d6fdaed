use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::{ChannelId, NodeId, NodeSignature};

use crate::message::PeerMessage;
use crate::transport::{NodeHandler, PeerTransport};

/// In-process peer transport: a handler table keyed by node identity.
///
/// Requests still cross a bincode wire framing on the way in and out of a
/// handler, so everything the real transport would serialize is exercised
/// here too.
pub struct InProcessNetwork {
    handlers: RwLock<HashMap<NodeId, Arc<dyn NodeHandler>>>,
}

impl InProcessNetwork {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Decode one envelope, dispatch it to the peer's handler, and encode
    /// the response envelope — the in-process stand-in for a socket round
    /// trip.
    async fn deliver(handler: &Arc<dyn NodeHandler>, wire: Vec<u8>) -> Vec<u8> {
        let response = match PeerMessage::from_bytes(&wire) {
            Ok(PeerMessage::SignRequest { snapshot }) => {
                match handler.on_sign_request(&snapshot).await {
                    Ok(signature) => PeerMessage::SignResponse { signature },
                    Err(e) => PeerMessage::Refused { reason: e.to_string() },
                }
            }
            Ok(PeerMessage::Publish { snapshot }) => match handler.on_publish(&snapshot).await {
                Ok(()) => PeerMessage::Ack,
                Err(e) => PeerMessage::Refused { reason: e.to_string() },
            },
            Ok(PeerMessage::LatestRequest { channel }) => PeerMessage::LatestResponse {
                snapshot: handler.latest(&channel).await,
            },
            Ok(other) => PeerMessage::Refused {
                reason: format!("unexpected envelope: {other:?}"),
            },
            Err(e) => PeerMessage::Refused { reason: e.to_string() },
        };
        response.to_bytes()
    }

    async fn handler_for(&self, node_id: &NodeId) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.read().await.get(node_id).cloned()
    }
}

impl Default for InProcessNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for InProcessNetwork {
    async fn register(&self, node_id: NodeId, handler: Arc<dyn NodeHandler>) {
        debug!(node = %node_id, "peer registered");
        self.handlers.write().await.insert(node_id, handler);
    }

    async fn publish(&self, snapshot: &Snapshot) -> Result<(), VaultError> {
        let wire = PeerMessage::Publish { snapshot: snapshot.clone() }.to_bytes();
        for participant in &snapshot.participants {
            let Some(handler) = self.handler_for(participant).await else {
                debug!(node = %participant, "publish skipped unreachable peer");
                continue;
            };
            let response = Self::deliver(&handler, wire.clone()).await;
            if let Ok(PeerMessage::Refused { reason }) = PeerMessage::from_bytes(&response) {
                debug!(node = %participant, %reason, "peer refused publish");
            }
        }
        Ok(())
    }

    async fn get_latest(
        &self,
        channel: &ChannelId,
        deadline: Duration,
    ) -> Result<Option<Snapshot>, VaultError> {
        let lookup = async {
            let handlers: Vec<_> = self.handlers.read().await.values().cloned().collect();
            let wire = PeerMessage::LatestRequest { channel: *channel }.to_bytes();
            let mut best: Option<Snapshot> = None;
            for handler in handlers {
                let response = Self::deliver(&handler, wire.clone()).await;
                if let Ok(PeerMessage::LatestResponse { snapshot: Some(s) }) =
                    PeerMessage::from_bytes(&response)
                {
                    if best.as_ref().map_or(true, |b| s.height > b.height) {
                        best = Some(s);
                    }
                }
            }
            best
        };
        tokio::time::timeout(deadline, lookup)
            .await
            .map_err(|_| VaultError::Timeout)
    }

    async fn request_signature(
        &self,
        node_id: &NodeId,
        snapshot: &Snapshot,
        deadline: Duration,
    ) -> Result<NodeSignature, VaultError> {
        let handler = self
            .handler_for(node_id)
            .await
            .ok_or_else(|| VaultError::Transport(format!("unknown peer {node_id}")))?;

        let wire = PeerMessage::SignRequest { snapshot: snapshot.clone() }.to_bytes();
        let response = tokio::time::timeout(deadline, Self::deliver(&handler, wire))
            .await
            .map_err(|_| VaultError::Timeout)?;

        match PeerMessage::from_bytes(&response)? {
            PeerMessage::SignResponse { signature } => Ok(signature),
            PeerMessage::Refused { reason } => Err(VaultError::Transport(reason)),
            other => Err(VaultError::Transport(format!("unexpected envelope: {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use vaultmesh_core::types::{TokenAddr, Wallet};
    use vaultmesh_crypto::NodeKeypair;

    /// Minimal peer: signs anything, remembers what was published.
    struct StubPeer {
        keypair: NodeKeypair,
        published: Mutex<Vec<Snapshot>>,
        held: Option<Snapshot>,
        delay: Option<Duration>,
    }

    impl StubPeer {
        fn new(keypair: NodeKeypair) -> Self {
            Self { keypair, published: Mutex::new(Vec::new()), held: None, delay: None }
        }
    }

    #[async_trait]
    impl NodeHandler for StubPeer {
        async fn on_sign_request(&self, snapshot: &Snapshot) -> Result<NodeSignature, VaultError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.keypair.sign(&snapshot.digest()))
        }

        async fn on_publish(&self, snapshot: &Snapshot) -> Result<(), VaultError> {
            self.published.lock().unwrap().push(snapshot.clone());
            Ok(())
        }

        async fn latest(&self, channel: &ChannelId) -> Option<Snapshot> {
            self.held.clone().filter(|s| s.channel() == *channel)
        }
    }

    fn bare_snapshot(participants: Vec<NodeId>, height: u64) -> Snapshot {
        let n = participants.len();
        Snapshot {
            wallet: Wallet::from_bytes([1u8; 20]),
            token: TokenAddr::NATIVE,
            height,
            balance: 10,
            participants,
            signatures: vec![NodeSignature(vec![]); n],
        }
    }

    #[tokio::test]
    async fn signature_request_round_trips_through_wire_framing() {
        let net = InProcessNetwork::new();
        let peer = Arc::new(StubPeer::new(NodeKeypair::generate()));
        let id = peer.keypair.node_id;
        net.register(id, peer.clone()).await;

        let snapshot = bare_snapshot(vec![id], 1);
        let sig = net
            .request_signature(&id, &snapshot, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(
            vaultmesh_crypto::verify_signature(&peer.keypair.public_key, &snapshot.digest(), &sig)
                .is_ok()
        );
    }

    #[tokio::test]
    async fn unknown_peer_is_a_transport_error() {
        let net = InProcessNetwork::new();
        let snapshot = bare_snapshot(vec![NodeId::from_bytes([9u8; 32])], 1);
        let err = net
            .request_signature(&NodeId::from_bytes([9u8; 32]), &snapshot, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Transport(_)));
    }

    #[tokio::test]
    async fn slow_peer_times_out() {
        let net = InProcessNetwork::new();
        let mut peer = StubPeer::new(NodeKeypair::generate());
        peer.delay = Some(Duration::from_millis(200));
        let id = peer.keypair.node_id;
        net.register(id, Arc::new(peer)).await;

        let snapshot = bare_snapshot(vec![id], 1);
        let err = net
            .request_signature(&id, &snapshot, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Timeout));
    }

    #[tokio::test]
    async fn publish_reaches_registered_participants_only() {
        let net = InProcessNetwork::new();
        let a = Arc::new(StubPeer::new(NodeKeypair::generate()));
        let b = Arc::new(StubPeer::new(NodeKeypair::generate()));
        net.register(a.keypair.node_id, a.clone()).await;
        // b is a declared participant but never registered: skipped.
        let snapshot = bare_snapshot(vec![a.keypair.node_id, b.keypair.node_id], 3);

        net.publish(&snapshot).await.unwrap();
        assert_eq!(a.published.lock().unwrap().len(), 1);
        assert!(b.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_latest_returns_the_highest_across_peers() {
        let net = InProcessNetwork::new();
        let channel = ChannelId::new(Wallet::from_bytes([1u8; 20]), TokenAddr::NATIVE);

        let mut low = StubPeer::new(NodeKeypair::generate());
        low.held = Some(bare_snapshot(vec![low.keypair.node_id], 2));
        let mut high = StubPeer::new(NodeKeypair::generate());
        high.held = Some(bare_snapshot(vec![high.keypair.node_id], 5));

        net.register(low.keypair.node_id, Arc::new(low)).await;
        net.register(high.keypair.node_id, Arc::new(high)).await;

        let best = net.get_latest(&channel, Duration::from_secs(1)).await.unwrap();
        assert_eq!(best.unwrap().height, 5);
    }
}
