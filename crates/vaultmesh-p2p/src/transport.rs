use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::{ChannelId, NodeId, NodeSignature};

/// Inbound callbacks a node installs on the transport.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Witness a snapshot: validate it against local state and sign the
    /// canonical digest, or refuse with the tagged reason.
    async fn on_sign_request(&self, snapshot: &Snapshot) -> Result<NodeSignature, VaultError>;

    /// A fully signed snapshot was published to this node.
    async fn on_publish(&self, snapshot: &Snapshot) -> Result<(), VaultError>;

    /// This node's highest known snapshot for `channel`.
    async fn latest(&self, channel: &ChannelId) -> Option<Snapshot>;
}

/// The peer transport as the rest of the system sees it.
///
/// Every outbound call takes a deadline and resolves to `Timeout` when it
/// passes — callers never hang on a dead peer, and a timed-out fan-out
/// leaves no durable state behind, so retrying is always safe.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Install a node's inbound handlers under its deterministic identity.
    async fn register(&self, node_id: NodeId, handler: Arc<dyn NodeHandler>);

    /// Fan a signed snapshot out to its quorum. Best-effort: unreachable
    /// peers are skipped, not errors.
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), VaultError>;

    /// Best-effort lookup of the highest snapshot any reachable peer holds.
    async fn get_latest(
        &self,
        channel: &ChannelId,
        deadline: Duration,
    ) -> Result<Option<Snapshot>, VaultError>;

    /// Ask one peer to witness a snapshot.
    async fn request_signature(
        &self,
        node_id: &NodeId,
        snapshot: &Snapshot,
        deadline: Duration,
    ) -> Result<NodeSignature, VaultError>;
}
