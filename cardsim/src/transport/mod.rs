//! Reader-level access to cards
//!
//! [`SimulatedReader`] answers raw APDU bytes from a simulated session;
//! [`PhysicalCardBridge`] drives any [`CardTransport`] with the same APDU
//! builder the simulator uses, so a real card sees identical bytes.

mod bridge;
mod simulated;

pub use bridge::{psc_accepted, PhysicalCardBridge, READ_CHUNK};
pub use simulated::SimulatedReader;

use crate::apdu::Response;
use crate::error::TransportError;

/// Something that exchanges raw APDUs with a card
pub trait CardTransport {
    /// Send one command APDU and return the card's answer
    fn transmit(&mut self, apdu: &[u8]) -> Result<Response, TransportError>;
}
