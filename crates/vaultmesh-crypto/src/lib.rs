pub mod hash;
pub mod keypair;
pub mod signer;

pub use hash::{blake3_hash, node_id_from_pubkey};
pub use keypair::NodeKeypair;
pub use signer::{sign_digest, verify_signature, SignatureError};
