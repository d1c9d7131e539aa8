//! Raw APDU front end for a simulated card

use log::{debug, error, info};

use crate::apdu::{ins, parse_apdu, Response, APDU, CLA_MEMORY_CARD, SW};
use crate::card::{CardKind, SELECT_RESPONSE};
use crate::error::TransportError;
use crate::psc::processor::MAX_READ_LENGTH;
use crate::session::SharedSession;
use super::CardTransport;

/// A reader slot holding one simulated card
pub struct SimulatedReader {
    session: SharedSession,
    powered: bool,
}

impl SimulatedReader {
    /// Insert a card; the reader starts powered off
    pub fn new(session: SharedSession) -> Self {
        Self {
            session,
            powered: false,
        }
    }

    /// Card in the slot
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Power on the card, returning its answer to reset
    pub fn power_on(&mut self) -> Vec<u8> {
        self.powered = true;
        info!("Simulated reader powered on");
        SELECT_RESPONSE.to_vec()
    }

    /// Power off the card; it has to be selected again afterwards
    pub fn power_off(&mut self) {
        if self.powered {
            self.session.lock().power_down();
        }
        self.powered = false;
        info!("Simulated reader powered off");
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Process an APDU and return data + SW1 + SW2
    pub fn process_apdu(&mut self, apdu_bytes: &[u8]) -> Vec<u8> {
        self.process(apdu_bytes).to_bytes()
    }

    fn process(&mut self, apdu_bytes: &[u8]) -> Response {
        if !self.powered {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }

        let cmd = match parse_apdu(apdu_bytes) {
            Ok(apdu) => apdu,
            Err(e) => {
                error!("Failed to parse APDU: {:?}", e);
                return Response::error(SW::WRONG_LENGTH);
            }
        };

        debug!(
            "Processing APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X}",
            cmd.cla, cmd.ins, cmd.p1, cmd.p2
        );

        if cmd.cla != CLA_MEMORY_CARD {
            return Response::error(SW::CLA_NOT_SUPPORTED);
        }

        self.dispatch(&cmd)
    }

    fn dispatch(&mut self, cmd: &APDU) -> Response {
        let mut session = self.session.lock();
        let kind = session.kind();
        if kind == CardKind::Small256 && cmd.p1 != 0x00 {
            debug!("P1 {:02X} has no meaning on {}", cmd.p1, kind);
            return Response::error(SW::INCORRECT_P1_P2);
        }
        let address = kind.address_from(cmd.p1, cmd.p2);

        let result = match cmd.ins {
            ins::SELECT_CARD_TYPE => {
                match cmd.data.first().copied().and_then(CardKind::from_select_code) {
                    Some(requested) if requested == kind => session.select_card(),
                    _ => {
                        debug!("SELECT for another card type: {:02X?}", cmd.data);
                        return Response::error(SW::WRONG_DATA);
                    }
                }
            }
            ins::READ_MEMORY => match cmd.le {
                Some(le) => session.read_memory(address, (le as usize).min(MAX_READ_LENGTH)),
                None => return Response::error(SW::WRONG_LENGTH),
            },
            ins::READ_ERROR_COUNTER => session.read_error_counter(),
            ins::READ_PROTECTION_BITS => session.read_protection_bits(),
            ins::PRESENT_PSC => session.present_psc(&cmd.data),
            ins::WRITE_MEMORY => {
                // The 1K card changes its PSC by writing the PSC cells
                if kind.psc_address() == Some(address) && cmd.data.len() == kind.psc_length() {
                    session.change_psc(&cmd.data)
                } else {
                    session.write_memory(address, &cmd.data)
                }
            }
            ins::WRITE_PROTECTION => session.write_protect(address, &cmd.data),
            ins::CHANGE_PSC if kind.psc_address().is_none() => session.change_psc(&cmd.data),
            _ => {
                debug!("Unsupported INS {:02X} for {}", cmd.ins, kind);
                return Response::error(SW::INS_NOT_SUPPORTED);
            }
        };
        result.response
    }
}

impl CardTransport for SimulatedReader {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Response, TransportError> {
        Ok(self.process(apdu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;

    fn reader(kind: CardKind) -> SimulatedReader {
        let mut manager = SessionManager::new();
        let session = manager.create_session("Reader card", kind).unwrap();
        let mut reader = SimulatedReader::new(session);
        reader.power_on();
        reader
    }

    #[test]
    fn test_unpowered() {
        let mut reader = reader(CardKind::Small256);
        reader.process_apdu(&[0xFF, 0xA4, 0x00, 0x00, 0x01, 0x06]);
        reader.power_off();
        assert_eq!(reader.process_apdu(&[0xFF, 0xA4, 0x00, 0x00, 0x01, 0x06]), vec![0x69, 0x85]);
        assert!(!reader.session().lock().is_selected());
    }

    #[test]
    fn test_malformed_and_wrong_class() {
        let mut reader = reader(CardKind::Small256);
        assert_eq!(reader.process_apdu(&[0xFF, 0xB0]), vec![0x67, 0x00]);
        assert_eq!(reader.process_apdu(&[0x00, 0xB0, 0x00, 0x00, 0x10]), vec![0x6E, 0x00]);
        assert_eq!(reader.process_apdu(&[0xFF, 0x84, 0x00, 0x00, 0x08]), vec![0x6D, 0x00]);
    }

    #[test]
    fn test_select_and_read() {
        let mut reader = reader(CardKind::Small256);
        assert_eq!(
            reader.process_apdu(&[0xFF, 0xA4, 0x00, 0x00, 0x01, 0x06]),
            vec![0x3B, 0x04, 0x92, 0x23, 0x10, 0x91, 0x90, 0x00]
        );
        assert_eq!(reader.process_apdu(&[0xFF, 0xA4, 0x00, 0x00, 0x01, 0x05]), vec![0x6A, 0x80]);

        let out = reader.process_apdu(&[0xFF, 0xB0, 0x00, 0x00, 0x04]);
        assert_eq!(out, vec![0xA2, 0x13, 0x10, 0x91, 0x90, 0x00]);
        assert!(reader.session().lock().is_selected());
    }

    #[test]
    fn test_psc_and_write() {
        let mut reader = reader(CardKind::Small256);
        reader.process_apdu(&[0xFF, 0xA4, 0x00, 0x00, 0x01, 0x06]);

        // write before PSC
        assert_eq!(reader.process_apdu(&[0xFF, 0xD0, 0x00, 0x20, 0x01, 0x41]), vec![0x69, 0x85]);
        assert_eq!(
            reader.process_apdu(&[0xFF, 0x20, 0x00, 0x00, 0x03, 0xFF, 0xFF, 0xFF]),
            vec![0x90, 0x07]
        );
        assert_eq!(reader.process_apdu(&[0xFF, 0xD0, 0x00, 0x20, 0x01, 0x41]), vec![0x90, 0x00]);
        assert_eq!(reader.process_apdu(&[0xFF, 0xB0, 0x00, 0x20, 0x01]), vec![0x41, 0x90, 0x00]);
        assert_eq!(
            reader.process_apdu(&[0xFF, 0xB1, 0x00, 0x00, 0x04]),
            vec![0x07, 0x00, 0x00, 0x00, 0x90, 0x07]
        );
    }

    #[test]
    fn test_small_card_high_address_byte() {
        let mut reader = reader(CardKind::Small256);
        reader.process_apdu(&[0xFF, 0xA4, 0x00, 0x00, 0x01, 0x06]);
        reader.process_apdu(&[0xFF, 0x20, 0x00, 0x00, 0x03, 0xFF, 0xFF, 0xFF]);

        assert_eq!(reader.process_apdu(&[0xFF, 0xD0, 0x01, 0x20, 0x01, 0x41]), vec![0x6A, 0x86]);
        assert_eq!(reader.process_apdu(&[0xFF, 0xB0, 0x01, 0x20, 0x01]), vec![0x6A, 0x86]);
        assert_eq!(reader.session().lock().memory().read(0x20, 1), vec![0xFF]);
    }

    #[test]
    fn test_large_change_psc_via_write() {
        let mut reader = reader(CardKind::Large1K);
        reader.process_apdu(&[0xFF, 0xA4, 0x00, 0x00, 0x01, 0x05]);
        reader.process_apdu(&[0xFF, 0x20, 0x00, 0x00, 0x02, 0xFF, 0xFF]);

        assert_eq!(reader.process_apdu(&[0xFF, 0xD0, 0x03, 0xFE, 0x02, 0x12, 0x34]), vec![0x90, 0x00]);
        let session = reader.session().lock();
        assert!(session.psc_ever_changed());
        assert_eq!(session.current_psc_display(), vec![0x12, 0x34]);
    }

    #[test]
    fn test_change_psc_ins_only_on_small() {
        let mut reader = reader(CardKind::Large1K);
        assert_eq!(
            reader.process_apdu(&[0xFF, 0xD2, 0x00, 0x01, 0x02, 0x12, 0x34]),
            vec![0x6D, 0x00]
        );
    }

    #[test]
    fn test_transmit() {
        let mut reader = reader(CardKind::Large1K);
        let response = reader.transmit(&[0xFF, 0xB2, 0x00, 0x00, 0x80]).unwrap();
        assert!(response.is_okay());
        assert_eq!(response.data.len(), 128);
    }
}
