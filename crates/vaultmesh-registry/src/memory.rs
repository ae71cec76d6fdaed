use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};
use vaultmesh_core::error::VaultError;
use vaultmesh_core::types::{Amount, NodeId, Timestamp, Wallet};

use crate::entry::{NetworkManifest, NodeEntry, RegistryParams};
use crate::{RegistryRead, RegistryWrite};

struct Inner {
    /// Authorized set. Removal is swap-and-pop, so iteration order is
    /// unstable across calls — readers must not assume stability.
    entries: Vec<NodeEntry>,
    index: HashMap<NodeId, usize>,
    /// Unregistered nodes still serving their stake cooldown.
    unstaking: HashMap<NodeId, NodeEntry>,
}

/// In-memory registry: the authoritative authorized-node set for a simulated
/// network, and the reference semantics for any durable implementation.
pub struct InMemoryRegistry {
    params: RegistryParams,
    inner: RwLock<Inner>,
}

impl InMemoryRegistry {
    pub fn new(params: RegistryParams) -> Self {
        Self {
            params,
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                index: HashMap::new(),
                unstaking: HashMap::new(),
            }),
        }
    }

    pub fn params(&self) -> &RegistryParams {
        &self.params
    }

    pub fn authorized_count(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").entries.len()
    }
}

impl RegistryRead for InMemoryRegistry {
    fn manifest(&self) -> NetworkManifest {
        self.params.manifest.clone()
    }

    fn nodes(&self, offset: usize, limit: usize) -> Vec<NodeEntry> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.entries.iter().skip(offset).take(limit).cloned().collect()
    }

    fn get_node(&self, node_id: &NodeId) -> Option<NodeEntry> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.index.get(node_id).map(|&i| inner.entries[i].clone())
    }

    fn is_authorized(&self, node_id: &NodeId) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .index
            .contains_key(node_id)
    }
}

impl RegistryWrite for InMemoryRegistry {
    fn register(&self, entry: NodeEntry) -> Result<(), VaultError> {
        if entry.stake < self.params.stake_amount {
            return Err(VaultError::InsufficientStake {
                need: self.params.stake_amount,
                got: entry.stake,
            });
        }
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.index.contains_key(&entry.node_id) {
            return Err(VaultError::AlreadyRegistered(entry.node_id.to_string()));
        }
        info!(node = %entry.node_id, stake = entry.stake, "node registered");
        let slot = inner.entries.len();
        inner.index.insert(entry.node_id, slot);
        inner.entries.push(entry);
        Ok(())
    }

    fn update_endpoint(&self, node_id: &NodeId, endpoint: String) -> Result<(), VaultError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let i = *inner
            .index
            .get(node_id)
            .ok_or_else(|| VaultError::UnknownNode(node_id.to_string()))?;
        debug!(node = %node_id, %endpoint, "endpoint updated");
        inner.entries[i].endpoint = endpoint;
        Ok(())
    }

    fn unregister(&self, node_id: &NodeId, now: Timestamp) -> Result<(), VaultError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let i = inner
            .index
            .remove(node_id)
            .ok_or_else(|| VaultError::UnknownNode(node_id.to_string()))?;
        // Swap-and-pop: O(1) removal, but it reorders the tail entry.
        let mut entry = inner.entries.swap_remove(i);
        if i < inner.entries.len() {
            let moved = inner.entries[i].node_id;
            inner.index.insert(moved, i);
        }
        entry.unlock_at = Some(now + self.params.cooldown_period_ms);
        info!(node = %node_id, unlock_at = entry.unlock_at, "node unregistered");
        inner.unstaking.insert(*node_id, entry);
        Ok(())
    }

    fn withdraw_stake(
        &self,
        node_id: &NodeId,
        operator: &Wallet,
        now: Timestamp,
    ) -> Result<Amount, VaultError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let entry = inner
            .unstaking
            .get(node_id)
            .ok_or_else(|| VaultError::UnknownNode(node_id.to_string()))?;
        if entry.operator != *operator {
            return Err(VaultError::UnknownNode(node_id.to_string()));
        }
        let unlock_at = entry.unlock_at.unwrap_or(Timestamp::MAX);
        if now < unlock_at {
            return Err(VaultError::StakeLocked { unlock_at });
        }
        let entry = inner.unstaking.remove(node_id).expect("checked above");
        info!(node = %node_id, stake = entry.stake, "stake withdrawn");
        Ok(entry.stake)
    }
}
