use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use vaultmesh_core::error::VaultError;
use vaultmesh_core::snapshot::Snapshot;
use vaultmesh_core::types::{
    Amount, ChannelId, Height, NodeId, NodeSignature, SnapshotDigest, Timestamp, TokenAddr, Wallet,
};
use vaultmesh_quorum::verify_snapshot;
use vaultmesh_registry::RegistryRead;

use crate::{ApplyOutcome, SnapshotStore};

// ── Rows ─────────────────────────────────────────────────────────────────────

/// One accepted snapshot as persisted. `credit`/`debit` record the balance
/// delta against the previously stored height, for audit queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRow {
    pub wallet: Wallet,
    pub token: TokenAddr,
    pub height: Height,
    pub credit: Amount,
    pub debit: Amount,
    pub balance: Amount,
    pub participants: Vec<NodeId>,
    pub signatures: Vec<NodeSignature>,
    pub created_at: Timestamp,
}

/// Per-participant signature provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureRow {
    pub signature: NodeSignature,
    pub created_at: Timestamp,
}

// ── SledStore ────────────────────────────────────────────────────────────────

/// Durable snapshot store backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   transactions  — digest (32) → bincode(TransactionRow); primary key
///   channel_index — wallet ‖ token ‖ height be (48) → digest (32);
///                   uniqueness guard on (wallet, token, height) and the
///                   latest-per-channel lookup path
///   signatures    — digest ‖ participant (64) → bincode(SignatureRow)
pub struct SledStore {
    _db: sled::Db,
    transactions: sled::Tree,
    channel_index: sled::Tree,
    signatures: sled::Tree,
    registry: Arc<dyn RegistryRead>,
    min_quorum: usize,
    locks: Mutex<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

fn channel_prefix(channel: &ChannelId) -> [u8; 40] {
    let mut p = [0u8; 40];
    p[..20].copy_from_slice(channel.wallet.as_bytes());
    p[20..].copy_from_slice(channel.token.as_bytes());
    p
}

fn index_key(channel: &ChannelId, height: Height) -> [u8; 48] {
    let mut k = [0u8; 48];
    k[..40].copy_from_slice(&channel_prefix(channel));
    k[40..].copy_from_slice(&height.to_be_bytes());
    k
}

fn signature_key(digest: &SnapshotDigest, participant: &NodeId) -> [u8; 64] {
    let mut k = [0u8; 64];
    k[..32].copy_from_slice(digest.as_bytes());
    k[32..].copy_from_slice(participant.as_bytes());
    k
}

impl SledStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        registry: Arc<dyn RegistryRead>,
        min_quorum: usize,
    ) -> Result<Self, VaultError> {
        let db = sled::open(path).map_err(|e| VaultError::Storage(e.to_string()))?;
        let transactions = db
            .open_tree("transactions")
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        let channel_index = db
            .open_tree("channel_index")
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        let signatures = db
            .open_tree("signatures")
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(Self {
            _db: db,
            transactions,
            channel_index,
            signatures,
            registry,
            min_quorum,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn channel_lock(&self, channel: &ChannelId) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().expect("store lock poisoned");
        map.entry(*channel).or_default().clone()
    }

    /// Highest persisted height for a channel, with its digest.
    fn latest_entry(
        &self,
        channel: &ChannelId,
    ) -> Result<Option<(Height, SnapshotDigest)>, VaultError> {
        let prefix = channel_prefix(channel);
        let last = self
            .channel_index
            .scan_prefix(prefix)
            .last()
            .transpose()
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(last.map(|(key, digest_bytes)| {
            let mut height_be = [0u8; 8];
            height_be.copy_from_slice(&key[40..48]);
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&digest_bytes);
            (Height::from_be_bytes(height_be), SnapshotDigest(digest))
        }))
    }

    fn load_row(&self, digest: &SnapshotDigest) -> Result<Option<TransactionRow>, VaultError> {
        match self
            .transactions
            .get(digest.as_bytes())
            .map_err(|e| VaultError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let row = bincode::deserialize(&bytes)
                    .map_err(|e| VaultError::Serialization(e.to_string()))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Full provenance row for a persisted snapshot, by digest.
    pub fn transaction(&self, digest: &SnapshotDigest) -> Result<Option<TransactionRow>, VaultError> {
        self.load_row(digest)
    }

    /// A single participant's recorded signature over a persisted snapshot.
    pub fn participant_signature(
        &self,
        digest: &SnapshotDigest,
        participant: &NodeId,
    ) -> Result<Option<SignatureRow>, VaultError> {
        match self
            .signatures
            .get(signature_key(digest, participant))
            .map_err(|e| VaultError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let row = bincode::deserialize(&bytes)
                    .map_err(|e| VaultError::Serialization(e.to_string()))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn persist(&self, snapshot: &Snapshot, prev_balance: Option<Amount>) -> Result<(), VaultError> {
        let digest = snapshot.digest();
        let now = chrono::Utc::now().timestamp_millis();
        let prev = prev_balance.unwrap_or(0);
        let row = TransactionRow {
            wallet: snapshot.wallet,
            token: snapshot.token,
            height: snapshot.height,
            credit: snapshot.balance.saturating_sub(prev),
            debit: prev.saturating_sub(snapshot.balance),
            balance: snapshot.balance,
            participants: snapshot.participants.clone(),
            signatures: snapshot.signatures.clone(),
            created_at: now,
        };
        let bytes =
            bincode::serialize(&row).map_err(|e| VaultError::Serialization(e.to_string()))?;
        self.transactions
            .insert(digest.as_bytes(), bytes)
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        self.channel_index
            .insert(index_key(&snapshot.channel(), snapshot.height), digest.as_bytes())
            .map_err(|e| VaultError::Storage(e.to_string()))?;
        for (participant, signature) in snapshot.participants.iter().zip(&snapshot.signatures) {
            let sig_row = SignatureRow {
                signature: signature.clone(),
                created_at: now,
            };
            let sig_bytes = bincode::serialize(&sig_row)
                .map_err(|e| VaultError::Serialization(e.to_string()))?;
            self.signatures
                .insert(signature_key(&digest, participant), sig_bytes)
                .map_err(|e| VaultError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

impl SnapshotStore for SledStore {
    fn get(&self, channel: &ChannelId) -> Option<Snapshot> {
        let result = self.latest_entry(channel).and_then(|latest| match latest {
            Some((_, digest)) => self.load_row(&digest),
            None => Ok(None),
        });
        match result {
            Ok(row) => row.map(|r| Snapshot {
                wallet: r.wallet,
                token: r.token,
                height: r.height,
                balance: r.balance,
                participants: r.participants,
                signatures: r.signatures,
            }),
            Err(e) => {
                error!(%channel, error = %e, "snapshot load failed");
                None
            }
        }
    }

    fn try_apply(&self, snapshot: &Snapshot) -> ApplyOutcome {
        if let Err(reason) = verify_snapshot(snapshot, self.registry.as_ref(), self.min_quorum) {
            return ApplyOutcome::Invalid(reason);
        }

        let channel = snapshot.channel();
        let lock = self.channel_lock(&channel);
        let _guard = lock.lock().expect("channel lock poisoned");

        let latest = match self.latest_entry(&channel) {
            Ok(l) => l,
            Err(e) => return ApplyOutcome::Invalid(e),
        };
        if let Some((height, _)) = latest {
            if height >= snapshot.height {
                return ApplyOutcome::Stale;
            }
        }
        let prev_balance = latest
            .and_then(|(_, digest)| self.load_row(&digest).ok().flatten())
            .map(|row| row.balance);
        if let Err(e) = self.persist(snapshot, prev_balance) {
            return ApplyOutcome::Invalid(e);
        }
        debug!(%channel, height = snapshot.height, "snapshot persisted");
        ApplyOutcome::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultmesh_core::snapshot::canonical_order;
    use vaultmesh_core::NetworkConfig;
    use vaultmesh_crypto::NodeKeypair;
    use vaultmesh_registry::{InMemoryRegistry, NodeEntry, RegistryParams, RegistryWrite};

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("vaultmesh_store_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    struct Fixture {
        keypairs: Vec<NodeKeypair>,
        store: SledStore,
    }

    fn fixture(name: &str) -> Fixture {
        let keypairs: Vec<_> = (0..3).map(|_| NodeKeypair::generate()).collect();
        let mut config = NetworkConfig::default();
        config.stake_amount = 1;
        let reg = Arc::new(InMemoryRegistry::new(RegistryParams::from_config(&config)));
        for kp in &keypairs {
            reg.register(NodeEntry {
                node_id: kp.node_id,
                public_key: kp.public_key.clone(),
                operator: Wallet::from_bytes([0u8; 20]),
                endpoint: String::new(),
                stake: 1,
                registered_at: 0,
                unlock_at: None,
            })
            .unwrap();
        }
        let store = SledStore::open(temp_dir(name), reg, 3).expect("open temp store");
        Fixture { keypairs, store }
    }

    fn signed(fix: &Fixture, height: u64, balance: u128) -> Snapshot {
        let wallet = Wallet::from_bytes([0xaa; 20]);
        let channel = ChannelId::new(wallet, TokenAddr::NATIVE);
        let participants =
            canonical_order(&channel, fix.keypairs.iter().map(|kp| kp.node_id).collect());
        let mut snapshot = Snapshot {
            wallet,
            token: TokenAddr::NATIVE,
            height,
            balance,
            participants: participants.clone(),
            signatures: Vec::new(),
        };
        let digest = snapshot.digest();
        snapshot.signatures = participants
            .iter()
            .map(|p| {
                fix.keypairs
                    .iter()
                    .find(|kp| kp.node_id == *p)
                    .unwrap()
                    .sign(&digest)
            })
            .collect();
        snapshot
    }

    #[test]
    fn persists_and_reloads_highest() {
        let fix = fixture("reload");
        let s1 = signed(&fix, 1, 100);
        let s2 = signed(&fix, 2, 70);
        assert!(fix.store.try_apply(&s1).is_accepted());
        assert!(fix.store.try_apply(&s2).is_accepted());

        let loaded = fix.store.get(&s2.channel()).unwrap();
        assert_eq!(loaded, s2);
        assert_eq!(loaded.digest(), s2.digest());
    }

    #[test]
    fn records_balance_deltas() {
        let fix = fixture("deltas");
        let s1 = signed(&fix, 1, 100);
        let s2 = signed(&fix, 2, 70);
        fix.store.try_apply(&s1);
        fix.store.try_apply(&s2);

        let row1 = fix.store.transaction(&s1.digest()).unwrap().unwrap();
        assert_eq!((row1.credit, row1.debit), (100, 0));
        let row2 = fix.store.transaction(&s2.digest()).unwrap().unwrap();
        assert_eq!((row2.credit, row2.debit), (0, 30));
    }

    #[test]
    fn records_per_participant_signatures() {
        let fix = fixture("sigs");
        let s = signed(&fix, 1, 100);
        fix.store.try_apply(&s);

        for (i, p) in s.participants.iter().enumerate() {
            let row = fix.store.participant_signature(&s.digest(), p).unwrap().unwrap();
            assert_eq!(row.signature, s.signatures[i]);
        }
    }

    #[test]
    fn same_height_is_stale() {
        let fix = fixture("stale");
        let s = signed(&fix, 3, 50);
        let fork = signed(&fix, 3, 49);
        assert!(fix.store.try_apply(&s).is_accepted());
        assert!(matches!(fix.store.try_apply(&fork), ApplyOutcome::Stale));
        assert_eq!(fix.store.get(&s.channel()).unwrap().digest(), s.digest());
    }
}
