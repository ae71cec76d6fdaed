use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;
use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::{is_canonically_ordered, Snapshot};
use vaultmesh_core::types::{Amount, ChannelId, NodeId, NodeSignature};
use vaultmesh_crypto::NodeKeypair;
use vaultmesh_p2p::NodeHandler;
use vaultmesh_store::{ApplyOutcome, SnapshotStore};

/// The watcher's shared state: its identity, its local snapshot store, and
/// the per-channel custody floors learned from deposit events. This is what
/// the peer transport dispatches inbound requests to.
pub struct WatcherCore {
    keypair: Arc<NodeKeypair>,
    store: Arc<dyn SnapshotStore>,
    floors: Mutex<HashMap<ChannelId, Amount>>,
}

impl WatcherCore {
    pub fn new(keypair: Arc<NodeKeypair>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            keypair,
            store,
            floors: Mutex::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.keypair.node_id
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// On-chain custody observed for a channel (deposits minus withdrawals).
    /// Bounds the opening balance of any snapshot this node will witness.
    pub fn custody_floor(&self, channel: &ChannelId) -> Option<Amount> {
        self.floors.lock().expect("floor lock poisoned").get(channel).copied()
    }

    pub fn note_deposit(&self, channel: ChannelId, amount: Amount) {
        let mut floors = self.floors.lock().expect("floor lock poisoned");
        *floors.entry(channel).or_insert(0) += amount;
    }

    pub fn note_withdrawal(&self, channel: ChannelId, amount: Amount) {
        let mut floors = self.floors.lock().expect("floor lock poisoned");
        if let Some(floor) = floors.get_mut(&channel) {
            *floor = floor.saturating_sub(amount);
        }
    }

    /// The witnessing policy. A node signs only what it can audit:
    /// the next height over its own view, never a balance that grew, never
    /// an opening balance above the custody it saw deposited, never a
    /// quorum it is not part of, never a non-canonical ordering.
    fn check_sign_request(&self, snapshot: &Snapshot) -> Result<(), VaultError> {
        snapshot.check_structure()?;

        let channel = snapshot.channel();
        if !is_canonically_ordered(&channel, &snapshot.participants) {
            return Err(VaultError::NonCanonicalOrder);
        }
        if !snapshot.participants.contains(&self.keypair.node_id) {
            return Err(VaultError::SignerNotInQuorum);
        }

        match self.store.get(&channel) {
            Some(local) => {
                if snapshot.height != local.height + 1 {
                    return Err(VaultError::HeightNotSequential {
                        expected: local.height + 1,
                        got: snapshot.height,
                    });
                }
                if snapshot.balance > local.balance {
                    return Err(VaultError::BalanceIncreased {
                        prior: local.balance,
                        balance: snapshot.balance,
                    });
                }
            }
            None => {
                // First sight of this channel: there is no prior height to
                // sequence against, so the opening balance is bounded by the
                // custody observed on-chain instead.
                if let Some(floor) = self.custody_floor(&channel) {
                    if snapshot.balance > floor {
                        return Err(VaultError::BalanceAboveFloor {
                            floor,
                            balance: snapshot.balance,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NodeHandler for WatcherCore {
    async fn on_sign_request(&self, snapshot: &Snapshot) -> Result<NodeSignature, VaultError> {
        self.check_sign_request(snapshot)?;
        debug!(
            channel = %snapshot.channel(),
            height = snapshot.height,
            "witnessing snapshot"
        );
        Ok(self.keypair.sign(&snapshot.digest()))
    }

    async fn on_publish(&self, snapshot: &Snapshot) -> Result<(), VaultError> {
        match self.store.try_apply(snapshot) {
            ApplyOutcome::Accepted | ApplyOutcome::Stale => Ok(()),
            ApplyOutcome::Invalid(e) => Err(e),
        }
    }

    async fn latest(&self, channel: &ChannelId) -> Option<Snapshot> {
        self.store.get(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultmesh_core::snapshot::canonical_order;
    use vaultmesh_core::types::{TokenAddr, Wallet};
    use vaultmesh_core::NetworkConfig;
    use vaultmesh_registry::{InMemoryRegistry, NodeEntry, RegistryParams, RegistryWrite};
    use vaultmesh_store::MemoryStore;

    struct Fixture {
        keypair: Arc<NodeKeypair>,
        core: WatcherCore,
    }

    /// Single-node network with min_quorum 1: the watcher itself is the
    /// whole quorum, which keeps the signing policy the only thing under
    /// test.
    fn fixture() -> Fixture {
        let keypair = Arc::new(NodeKeypair::generate());
        let mut config = NetworkConfig::default();
        config.stake_amount = 1;
        let registry = Arc::new(InMemoryRegistry::new(RegistryParams::from_config(&config)));
        registry
            .register(NodeEntry {
                node_id: keypair.node_id,
                public_key: keypair.public_key.clone(),
                operator: Wallet::from_bytes([0u8; 20]),
                endpoint: String::new(),
                stake: 1,
                registered_at: 0,
                unlock_at: None,
            })
            .unwrap();
        let store = Arc::new(MemoryStore::new(registry, 1));
        Fixture {
            keypair: keypair.clone(),
            core: WatcherCore::new(keypair, store),
        }
    }

    fn channel() -> ChannelId {
        ChannelId::new(Wallet::from_bytes([0xaa; 20]), TokenAddr::NATIVE)
    }

    fn draft(fix: &Fixture, height: u64, balance: u128) -> Snapshot {
        let ch = channel();
        Snapshot {
            wallet: ch.wallet,
            token: ch.token,
            height,
            balance,
            participants: canonical_order(&ch, vec![fix.keypair.node_id]),
            signatures: vec![NodeSignature(vec![])],
        }
    }

    fn signed(fix: &Fixture, height: u64, balance: u128) -> Snapshot {
        let mut s = draft(fix, height, balance);
        let digest = s.digest();
        s.signatures = vec![fix.keypair.sign(&digest)];
        s
    }

    #[tokio::test]
    async fn signs_opening_height_within_floor() {
        let fix = fixture();
        fix.core.note_deposit(channel(), 100);
        let s = draft(&fix, 1, 100);
        let sig = fix.core.on_sign_request(&s).await.unwrap();
        assert!(vaultmesh_crypto::verify_signature(&fix.keypair.public_key, &s.digest(), &sig).is_ok());
    }

    #[tokio::test]
    async fn refuses_opening_balance_above_floor() {
        let fix = fixture();
        fix.core.note_deposit(channel(), 100);
        let s = draft(&fix, 1, 101);
        assert!(matches!(
            fix.core.on_sign_request(&s).await,
            Err(VaultError::BalanceAboveFloor { floor: 100, balance: 101 })
        ));
    }

    #[tokio::test]
    async fn refuses_height_gap() {
        let fix = fixture();
        // With height 1 in the store, only height 2 is signable.
        fix.core.on_publish(&signed(&fix, 1, 100)).await.unwrap();
        assert!(matches!(
            fix.core.on_sign_request(&draft(&fix, 4, 10)).await,
            Err(VaultError::HeightNotSequential { expected: 2, got: 4 })
        ));
        assert!(matches!(
            fix.core.on_sign_request(&draft(&fix, 1, 90)).await,
            Err(VaultError::HeightNotSequential { expected: 2, got: 1 })
        ));
        assert!(fix.core.on_sign_request(&draft(&fix, 2, 80)).await.is_ok());
    }

    #[tokio::test]
    async fn unseen_channel_is_signable_at_any_height() {
        let fix = fixture();
        // No local history to sequence against: only the floor bounds it.
        fix.core.note_deposit(channel(), 100);
        assert!(fix.core.on_sign_request(&draft(&fix, 3, 40)).await.is_ok());
    }

    #[tokio::test]
    async fn refuses_balance_increase() {
        let fix = fixture();
        fix.core.on_publish(&signed(&fix, 1, 100)).await.unwrap();
        assert!(matches!(
            fix.core.on_sign_request(&draft(&fix, 2, 120)).await,
            Err(VaultError::BalanceIncreased { prior: 100, balance: 120 })
        ));
    }

    #[tokio::test]
    async fn refuses_quorum_excluding_self() {
        let fix = fixture();
        let mut s = draft(&fix, 1, 10);
        s.participants = vec![NodeId::from_bytes([0x42; 32])];
        assert!(matches!(
            fix.core.on_sign_request(&s).await,
            Err(VaultError::SignerNotInQuorum)
        ));
    }

    #[tokio::test]
    async fn refuses_non_canonical_ordering() {
        let fix = fixture();
        let other = NodeId::from_bytes([0x42; 32]);
        let mut s = draft(&fix, 1, 10);
        let ordered = canonical_order(&channel(), vec![fix.keypair.node_id, other]);
        s.participants = vec![ordered[1], ordered[0]];
        s.signatures = vec![NodeSignature(vec![]), NodeSignature(vec![])];
        assert!(matches!(
            fix.core.on_sign_request(&s).await,
            Err(VaultError::NonCanonicalOrder)
        ));
    }

    #[tokio::test]
    async fn publish_applies_and_latest_reads_back() {
        let fix = fixture();
        let s = signed(&fix, 1, 100);
        fix.core.on_publish(&s).await.unwrap();
        assert_eq!(fix.core.latest(&channel()).await.unwrap().digest(), s.digest());
    }

    #[tokio::test]
    async fn withdrawal_lowers_the_floor() {
        let fix = fixture();
        fix.core.note_deposit(channel(), 100);
        fix.core.note_withdrawal(channel(), 30);
        assert_eq!(fix.core.custody_floor(&channel()), Some(70));
    }
}
