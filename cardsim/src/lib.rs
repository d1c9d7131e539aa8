//! Simulator core for SLE5542/SLE5528 memory cards
//!
//! Emulates the two memory-card families driven through a reader's
//! pseudo-APDUs (class `FF`):
//! - SLE5542: 256 bytes, 3-byte PSC in an internal register, 3 attempts
//! - SLE5528: 1024 bytes, 2-byte PSC stored at 0x3FE, 8 attempts
//!
//! Each open card is a [`session::CardSession`] that owns its memory, its
//! error counter, its security flags and an audit log of every command.
//! A [`session::SessionManager`] keeps several cards open side by side.
//! Raw APDU bytes can be exchanged through [`transport::SimulatedReader`],
//! and [`transport::PhysicalCardBridge`] sends the same bytes to a real
//! reader behind any [`transport::CardTransport`].

pub mod apdu;
pub mod card;
pub mod config;
pub mod error;
pub mod psc;
pub mod session;
pub mod transport;
pub mod util;

pub use card::CardKind;
pub use config::SimulatorConfig;
pub use error::{ConfigError, SessionError, StoreError, TransportError};
pub use psc::{Command, CommandResult};
pub use session::{AppState, CardSession, SessionManager};
