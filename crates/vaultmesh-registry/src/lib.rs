//! vaultmesh-registry
//!
//! The authorized-node set every other layer reads: quorum verification,
//! participant selection, challenger authorization and watcher startup all
//! consult this port. Reads dominate; writes are operator-facing.

pub mod entry;
pub mod memory;

use vaultmesh_core::error::VaultError;
use vaultmesh_core::types::{Amount, NodeId, Timestamp, Wallet};

pub use entry::{NetworkManifest, NodeEntry, RegistryParams};
pub use memory::InMemoryRegistry;

/// Read surface consumed by the core. Callers copy whatever membership they
/// need at the start of a transaction; nothing here blocks or suspends.
pub trait RegistryRead: Send + Sync {
    /// The published network manifest (version, url, checksum).
    fn manifest(&self) -> NetworkManifest;

    /// Page through the authorized set. Ordering is UNSTABLE across calls:
    /// removal uses swap-and-pop, so a concurrent unregistration may reorder
    /// or repeat entries between pages.
    fn nodes(&self, offset: usize, limit: usize) -> Vec<NodeEntry>;

    /// Look up a single authorized node.
    fn get_node(&self, node_id: &NodeId) -> Option<NodeEntry>;

    /// Membership check against the current authorized set.
    fn is_authorized(&self, node_id: &NodeId) -> bool;
}

/// Operator-facing writes. Not on the core path; the custodian and the
/// verification pipeline only ever read.
pub trait RegistryWrite: Send + Sync {
    /// Admit a node. The posted stake must meet the network minimum.
    fn register(&self, entry: NodeEntry) -> Result<(), VaultError>;

    /// Rotate the advertised endpoint.
    fn update_endpoint(&self, node_id: &NodeId, endpoint: String) -> Result<(), VaultError>;

    /// Remove a node from the authorized set and start its stake cooldown.
    fn unregister(&self, node_id: &NodeId, now: Timestamp) -> Result<(), VaultError>;

    /// Return the stake to the operator once the cooldown has elapsed.
    fn withdraw_stake(
        &self,
        node_id: &NodeId,
        operator: &Wallet,
        now: Timestamp,
    ) -> Result<Amount, VaultError>;
}

/// Full registry surface (watcher startup needs both halves).
pub trait Registry: RegistryRead + RegistryWrite {}

impl<T: RegistryRead + RegistryWrite> Registry for T {}
