use serde::{Deserialize, Serialize};
use vaultmesh_core::types::{Amount, NodeId, NodePublicKey, Timestamp, Wallet};
use vaultmesh_core::NetworkConfig;

/// One authorized node as the registry sees it. Read-mostly: the core only
/// ever mutates `endpoint` (operator rotation) and the unregistration stamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub node_id: NodeId,
    /// Registered signing key; verification resolves signatures against this,
    /// never against a key the snapshot itself declares.
    pub public_key: NodePublicKey,
    /// Settlement-layer account operating the node (receives the stake back).
    pub operator: Wallet,
    /// Advertised reachability hint; opaque to the protocol.
    pub endpoint: String,
    pub stake: Amount,
    pub registered_at: Timestamp,
    /// Set on unregistration: stake is withdrawable once this passes.
    pub unlock_at: Option<Timestamp>,
}

/// Published network manifest. Clients fetch it out of band and check the
/// checksum before trusting any parameter in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkManifest {
    pub version: u32,
    pub url: String,
    pub checksum: String,
}

/// Static registry parameters, lifted from the deployment config.
#[derive(Clone, Debug)]
pub struct RegistryParams {
    pub stake_amount: Amount,
    pub cooldown_period_ms: Timestamp,
    pub manifest: NetworkManifest,
}

impl RegistryParams {
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            stake_amount: config.stake_amount,
            cooldown_period_ms: config.cooldown_period_ms,
            manifest: NetworkManifest {
                version: config.manifest_version,
                url: config.manifest_url.clone(),
                checksum: config.manifest_checksum.clone(),
            },
        }
    }
}
