//! vaultmesh-watcher
//!
//! The watcher node: it witnesses snapshots for the quorums it belongs to,
//! keeps the highest signed snapshot per channel in its local store, and
//! polices the custodian's withdrawal queue — any request citing a height
//! below the watcher's view is challenged with the newer evidence.

pub mod core;
pub mod watcher;

pub use crate::core::WatcherCore;
pub use watcher::{start, WatcherConfig, WatcherHandle};
