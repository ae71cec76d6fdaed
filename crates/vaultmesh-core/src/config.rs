use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHALLENGE_PERIOD_MS, DEFAULT_COOLDOWN_PERIOD_MS, DEFAULT_MIN_QUORUM,
    DEFAULT_STAKE_AMOUNT, DEV_MANIFEST_URL, MANIFEST_VERSION,
};
use crate::types::{Amount, Timestamp};

/// Static deployment parameters shared by custodian, registry, nodes and
/// clients. Loaded from JSON or built from CLI flags; never contains secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Challenge window length (ms).
    pub challenge_period_ms: Timestamp,
    /// Minimum participant count per snapshot.
    pub min_quorum: usize,
    /// Stake a node posts on registration.
    pub stake_amount: Amount,
    /// Unregister → stake-withdrawal cooldown (ms).
    pub cooldown_period_ms: Timestamp,
    /// Manifest schema version.
    pub manifest_version: u32,
    /// Where the network manifest is published.
    pub manifest_url: String,
    /// Hex Keccak-256 checksum of the published manifest body.
    pub manifest_checksum: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            challenge_period_ms: DEFAULT_CHALLENGE_PERIOD_MS,
            min_quorum: DEFAULT_MIN_QUORUM,
            stake_amount: DEFAULT_STAKE_AMOUNT,
            cooldown_period_ms: DEFAULT_COOLDOWN_PERIOD_MS,
            manifest_version: MANIFEST_VERSION,
            manifest_url: DEV_MANIFEST_URL.into(),
            manifest_checksum: String::new(),
        }
    }
}

impl NetworkConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("config serialization is infallible")
    }
}
