//! Drive a card through any transport with the simulator's APDU builder

use log::{debug, info, warn};

use crate::apdu::Response;
use crate::card::CardKind;
use crate::error::TransportError;
use crate::psc::{ApduCommandProcessor, Command};
use crate::util::format_hex;
use super::CardTransport;

/// Bytes fetched per READ MEMORY when reading a whole card
pub const READ_CHUNK: usize = 128;

/// Whether a PRESENT PSC answer means the PSC was accepted
///
/// Cards answer `90 xx` with the error counter in SW2; only a counter
/// back at its fresh value means success.
pub fn psc_accepted(kind: CardKind, response: &Response) -> bool {
    response.sw1 == 0x90 && kind.ladder().first() == Some(&response.sw2)
}

/// Command front end for a card behind a transport
pub struct PhysicalCardBridge<T: CardTransport> {
    transport: T,
    kind: CardKind,
}

impl<T: CardTransport> PhysicalCardBridge<T> {
    pub fn new(transport: T, kind: CardKind) -> Self {
        Self { transport, kind }
    }

    pub fn kind(&self) -> CardKind {
        self.kind
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Build, send and return the raw answer for one command
    pub fn send(&mut self, command: &Command) -> Result<Response, TransportError> {
        if let Some(address) = command.address() {
            if !self.kind.encodes_address(address) {
                warn!("{} not sent: 0x{:03X} outside {}", command.title(), address, self.kind);
                return Err(TransportError::AddressOutOfRange(address));
            }
        }
        let apdu = ApduCommandProcessor::build_apdu(self.kind, command).to_bytes();
        match command {
            Command::PresentPsc { .. } | Command::ChangePsc { .. } => {
                debug!("{} -> {} (PSC hidden)", command.title(), format_hex(&apdu[..4]))
            }
            _ => debug!("{} -> {}", command.title(), format_hex(&apdu)),
        }
        let response = self.transport.transmit(&apdu)?;
        debug!("{} <- SW {:04X}", command.title(), response.sw());
        Ok(response)
    }

    fn expect_ok(&mut self, command: &Command) -> Result<Response, TransportError> {
        let response = self.send(command)?;
        if response.is_okay() {
            Ok(response)
        } else {
            warn!("{} failed with {:04X}", command.title(), response.sw());
            Err(TransportError::Status(response.sw()))
        }
    }

    /// SELECT CARD TYPE; returns the card's answer bytes
    pub fn select(&mut self) -> Result<Vec<u8>, TransportError> {
        let response = self.expect_ok(&Command::SelectCard)?;
        info!("Selected {} through bridge", self.kind);
        Ok(response.data)
    }

    /// PRESENT PSC; Ok(true) when accepted
    pub fn present_psc(&mut self, psc: &[u8]) -> Result<bool, TransportError> {
        let response = self.send(&Command::PresentPsc { psc: psc.to_vec() })?;
        Ok(psc_accepted(self.kind, &response))
    }

    pub fn change_psc(&mut self, new_psc: &[u8]) -> Result<(), TransportError> {
        self.expect_ok(&Command::ChangePsc {
            new_psc: new_psc.to_vec(),
        })
        .map(|_| ())
    }

    /// READ ERROR COUNTER; returns the counter byte
    pub fn read_error_counter(&mut self) -> Result<u8, TransportError> {
        let response = self.send(&Command::ReadErrorCounter)?;
        if response.sw1 != 0x90 {
            return Err(TransportError::Status(response.sw()));
        }
        response
            .data
            .first()
            .copied()
            .ok_or(TransportError::ShortResponse(response.len()))
    }

    /// READ MEMORY; a zero length reads nothing and sends nothing
    pub fn read_memory(&mut self, address: u16, length: usize) -> Result<Vec<u8>, TransportError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let response = self.expect_ok(&Command::ReadMemory { address, length })?;
        Ok(response.data)
    }

    pub fn write_memory(&mut self, address: u16, data: &[u8]) -> Result<(), TransportError> {
        self.expect_ok(&Command::WriteMemory {
            address,
            data: data.to_vec(),
        })
        .map(|_| ())
    }

    /// Read the whole card in [`READ_CHUNK`]-byte pieces
    pub fn read_full(&mut self) -> Result<Vec<u8>, TransportError> {
        let size = self.kind.size();
        let mut dump = Vec::with_capacity(size);
        let mut address = 0;
        while address < size {
            let length = READ_CHUNK.min(size - address);
            let chunk = self.read_memory(address as u16, length)?;
            if chunk.len() != length {
                return Err(TransportError::ShortResponse(chunk.len()));
            }
            dump.extend_from_slice(&chunk);
            address += length;
        }
        info!("Read {} bytes from {}", dump.len(), self.kind);
        Ok(dump)
    }
}
