//! vaultmesh-p2p
//!
//! The peer-transport port: how clients reach the quorum for signatures and
//! how nodes receive published snapshots. The in-process hub is the
//! development and test transport; a wire-level implementation slots in
//! behind the same `PeerTransport` trait.

pub mod message;
pub mod network;
pub mod transport;

pub use message::PeerMessage;
pub use network::InProcessNetwork;
pub use transport::{NodeHandler, PeerTransport};
