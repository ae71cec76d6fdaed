use vaultmesh_core::types::{NodeId, NodePublicKey};

/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive a NodeId from raw public key bytes using BLAKE3.
pub fn node_id_from_pubkey(pubkey: &NodePublicKey) -> NodeId {
    NodeId::from_bytes(blake3_hash(&pubkey.0))
}
