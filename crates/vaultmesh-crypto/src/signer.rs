use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};
use thiserror::Error;
use vaultmesh_core::types::{NodePublicKey, NodeSignature, SnapshotDigest};

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key length: expected {expected}, got {got}")]
    InvalidPublicKeyLength { expected: usize, got: usize },
}

/// Sign a snapshot digest with a Dilithium2 secret key.
/// Returns a detached signature.
pub fn sign_digest(
    secret_key_bytes: &[u8],
    digest: &SnapshotDigest,
) -> Result<NodeSignature, SignatureError> {
    let sk = dilithium2::SecretKey::from_bytes(secret_key_bytes)
        .map_err(|_| SignatureError::InvalidSignature)?;
    let sig = dilithium2::detached_sign(digest.as_bytes(), &sk);
    Ok(NodeSignature(sig.as_bytes().to_vec()))
}

/// Verify a detached Dilithium2 signature over a snapshot digest.
pub fn verify_signature(
    public_key: &NodePublicKey,
    digest: &SnapshotDigest,
    signature: &NodeSignature,
) -> Result<(), SignatureError> {
    let pk = dilithium2::PublicKey::from_bytes(&public_key.0).map_err(|_| {
        SignatureError::InvalidPublicKeyLength {
            expected: dilithium2::public_key_bytes(),
            got: public_key.0.len(),
        }
    })?;
    let sig = dilithium2::DetachedSignature::from_bytes(&signature.0)
        .map_err(|_| SignatureError::InvalidSignature)?;
    dilithium2::verify_detached_signature(&sig, digest.as_bytes(), &pk)
        .map_err(|_| SignatureError::InvalidSignature)
}
