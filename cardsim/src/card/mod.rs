//! Card model: families, memory and persistence
//!
//! The 256-byte and 1K memory cards share one memory model; every
//! difference between them is a [`CardKind`] table.

pub mod atr;
pub mod kind;
pub mod memory;
pub mod snapshot;
pub mod storage;

pub use atr::SELECT_RESPONSE;
pub use kind::CardKind;
pub use memory::{AddressStatus, MemoryStore, WriteOutcome, ERASED};
pub use snapshot::CardSnapshot;
pub use storage::SnapshotStore;
