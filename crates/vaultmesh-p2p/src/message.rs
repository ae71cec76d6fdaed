use serde::{Deserialize, Serialize};
use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::{ChannelId, NodeSignature};

/// Envelopes exchanged between peers. Everything crossing the transport is
/// one of these, bincode-framed, so any backing wire (in-process hub today,
/// a real socket layer behind the same port tomorrow) speaks the same bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Ask a peer to witness a snapshot by signing its canonical digest.
    SignRequest { snapshot: Snapshot },

    /// The peer's signature over the requested digest.
    SignResponse { signature: NodeSignature },

    /// Fan a fully signed snapshot out to its quorum.
    Publish { snapshot: Snapshot },

    /// Positive acknowledgement with no payload.
    Ack,

    /// Best-effort lookup of a peer's highest snapshot for a channel.
    LatestRequest { channel: ChannelId },

    LatestResponse { snapshot: Option<Snapshot> },

    /// The peer declined the request (validation refusal, stale state, …).
    Refused { reason: String },
}

impl PeerMessage {
    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("PeerMessage serialization is infallible")
    }

    /// Deserialize from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        bincode::deserialize(bytes).map_err(|e| VaultError::Serialization(e.to_string()))
    }
}
