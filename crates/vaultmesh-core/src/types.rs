use serde::{Deserialize, Serialize};
use sha3::{Digest as _, Keccak256};
use std::fmt;

/// Settlement-layer amount. u128 covers 18-decimal assets with room to spare.
pub type Amount = u128;

/// Unix timestamp in milliseconds, UTC. Challenge windows are sub-second in
/// development networks, so second resolution is not enough.
pub type Timestamp = i64;

/// Per-channel snapshot version. Strictly increases; never reused.
pub type Height = u64;

// ── Wallet ───────────────────────────────────────────────────────────────────

/// 20-byte settlement-layer account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Wallet(pub [u8; 20]);

impl Wallet {
    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex representation.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        if bytes.len() != 20 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wallet({}…)", &self.to_hex()[..10])
    }
}

// ── TokenAddr ────────────────────────────────────────────────────────────────

/// 20-byte asset identifier. The all-zero value is the settlement layer's
/// native asset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenAddr(pub [u8; 20]);

impl TokenAddr {
    pub const NATIVE: TokenAddr = TokenAddr([0u8; 20]);

    pub fn from_bytes(b: [u8; 20]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for TokenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "native")
        } else {
            write!(f, "{}", self.to_hex())
        }
    }
}

impl fmt::Debug for TokenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAddr({self})")
    }
}

// ── NodeId ───────────────────────────────────────────────────────────────────

/// 32-byte node identifier derived as BLAKE3(dilithium_public_key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Base-58 encoded string representation.
    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_b58(s: &str) -> Result<Self, bs58::decode::Error> {
        let bytes = bs58::decode(s).into_vec()?;
        if bytes.len() != 32 {
            return Err(bs58::decode::Error::BufferTooSmall);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", &self.to_b58()[..8])
    }
}

// ── Digest ───────────────────────────────────────────────────────────────────

/// 32-byte Keccak-256 snapshot digest. Identical on the settlement layer and
/// off-chain: both sides hash the same canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotDigest(pub [u8; 32]);

impl SnapshotDigest {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SnapshotDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SnapshotDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotDigest({}…)", &self.to_hex()[..16])
    }
}

// ── Node key material ────────────────────────────────────────────────────────

/// Dilithium2 public key (1312 bytes per NIST FIPS 204).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePublicKey(pub Vec<u8>);

impl fmt::Debug for NodePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePublicKey({}b)", self.0.len())
    }
}

/// Dilithium2 detached signature (2420 bytes per NIST FIPS 204).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSignature(pub Vec<u8>);

impl fmt::Debug for NodeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeSignature({}b)", self.0.len())
    }
}

// ── ChannelId ────────────────────────────────────────────────────────────────

/// A channel is the ledger scoped to one `(wallet, token)` pair.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    pub wallet: Wallet,
    pub token: TokenAddr,
}

impl ChannelId {
    pub fn new(wallet: Wallet, token: TokenAddr) -> Self {
        Self { wallet, token }
    }

    /// Keccak-256 of `wallet ‖ token` — the reference point for the XOR
    /// distance metric that orders a channel's quorum.
    pub fn key(&self) -> [u8; 32] {
        let mut h = Keccak256::new();
        h.update(self.wallet.as_bytes());
        h.update(self.token.as_bytes());
        h.finalize().into()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.wallet, self.token)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({self})")
    }
}

// ── Party ────────────────────────────────────────────────────────────────────

/// The identity a settlement-layer call originates from. Custodian
/// transitions authorize callers against this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    Wallet(Wallet),
    Node(NodeId),
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Wallet(w) => write!(f, "wallet:{w}"),
            Party::Node(n) => write!(f, "node:{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_hex_round_trip() {
        let w = Wallet::from_bytes([0xab; 20]);
        let s = w.to_hex();
        assert!(s.starts_with("0x"));
        assert_eq!(Wallet::from_hex(&s).unwrap(), w);
    }

    #[test]
    fn wallet_hex_wrong_length_rejected() {
        assert!(Wallet::from_hex("0xdeadbeef").is_err());
    }

    #[test]
    fn native_token_displays_as_native() {
        assert_eq!(TokenAddr::NATIVE.to_string(), "native");
        assert!(TokenAddr::NATIVE.is_native());
        assert!(!TokenAddr::from_bytes([1u8; 20]).is_native());
    }

    #[test]
    fn node_id_b58_round_trip() {
        let id = NodeId::from_bytes([7u8; 32]);
        assert_eq!(NodeId::from_b58(&id.to_b58()).unwrap(), id);
    }

    #[test]
    fn channel_key_depends_on_both_fields() {
        let w = Wallet::from_bytes([1u8; 20]);
        let a = ChannelId::new(w, TokenAddr::NATIVE);
        let b = ChannelId::new(w, TokenAddr::from_bytes([2u8; 20]));
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), ChannelId::new(w, TokenAddr::NATIVE).key());
    }
}
