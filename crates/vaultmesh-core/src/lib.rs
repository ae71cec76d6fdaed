pub mod config;
pub mod constants;
pub mod error;
pub mod snapshot;
pub mod types;

pub use config::NetworkConfig;
pub use constants::*;
pub use error::VaultError;
pub use snapshot::{canonical_order, is_canonically_ordered, xor_distance, Snapshot};
pub use types::*;
