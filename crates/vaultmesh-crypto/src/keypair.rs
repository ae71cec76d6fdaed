use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use vaultmesh_core::types::{NodeId, NodePublicKey, NodeSignature, SnapshotDigest};

use crate::hash::node_id_from_pubkey;
use crate::signer::sign_digest;

/// A node keypair: Dilithium2 public + secret keys with the derived NodeId.
///
/// The identity is deterministic: the same key material always yields the
/// same NodeId, so a restarted watcher rejoins the network as itself.
#[derive(Serialize, Deserialize)]
pub struct NodeKeypair {
    pub node_id: NodeId,
    pub public_key: NodePublicKey,
    secret_key: Vec<u8>,
}

impl NodeKeypair {
    /// Generate a fresh Dilithium2 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        let public_key = NodePublicKey(pk.as_bytes().to_vec());
        let node_id = node_id_from_pubkey(&public_key);
        Self {
            node_id,
            public_key,
            secret_key: sk.as_bytes().to_vec(),
        }
    }

    /// Sign a snapshot digest with this node's secret key.
    pub fn sign(&self, digest: &SnapshotDigest) -> NodeSignature {
        sign_digest(&self.secret_key, digest).expect("sign with valid secret key is infallible")
    }

    /// Restore a keypair from raw bytes (e.g. loaded from a key file).
    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        let public_key = NodePublicKey(pk_bytes);
        let node_id = node_id_from_pubkey(&public_key);
        Self {
            node_id,
            public_key,
            secret_key: sk_bytes,
        }
    }

    /// Return a read-only view of the secret key bytes.
    pub fn secret_key_bytes(&self) -> &[u8] {
        &self.secret_key
    }
}

impl Drop for NodeKeypair {
    fn drop(&mut self) {
        // Zeroize the secret key bytes on drop.
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for NodeKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeKeypair {{ node_id: {:?} }}", self.node_id)
    }
}
