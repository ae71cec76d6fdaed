//! vaultmesh-custodian
//!
//! The settlement-side half of the protocol: the custody ledger, the
//! pending-withdrawal table with its challenge windows, and the event
//! fan-out every watcher hangs off. The engine is a synchronous state
//! machine; `SettlementPort` is the async seam clients and watchers use,
//! with the in-process `SimulatedSettlement` as its development variant.

pub mod bank;
pub mod bus;
pub mod engine;
pub mod events;
pub mod settlement;

pub use bank::{AssetBank, SimulatedBank};
pub use bus::{EventBus, EventStream};
pub use engine::{Custodian, PendingRequest};
pub use events::CustodianEvent;
pub use settlement::{SettlementPort, SimulatedSettlement};
