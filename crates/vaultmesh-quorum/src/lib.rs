//! vaultmesh-quorum
//!
//! The quorum discipline shared by every participant: full verification of a
//! received snapshot against the live authorized set, and selection of the
//! k-closest quorum a proposing client must use.

pub mod select;
pub mod verify;

pub use select::select_participants;
pub use verify::verify_snapshot;
