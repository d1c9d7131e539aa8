//! Card families and their fixed layout tables
//!
//! Everything that differs between the 256-byte and the 1K card lives
//! here as an exhaustive match, so adding a family forces every table to
//! be filled in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Memory-card family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardKind {
    /// SLE5542: 256 bytes, 3-byte PSC held in an internal register
    Small256,
    /// SLE5528: 1024 bytes, 2-byte PSC stored at the top of memory
    Large1K,
}

/// Error-counter ladder for the 256-byte card (index = attempts consumed)
const LADDER_SMALL: &[u8] = &[0x07, 0x03, 0x01, 0x00];

/// Error-counter ladder for the 1K card, one bit cleared per failure
const LADDER_LARGE: &[u8] = &[0xFF, 0x7F, 0x7E, 0x7C, 0x78, 0x70, 0x60, 0x40, 0x00];

const HEADER_ROW0_SMALL: [u8; 16] = [
    0xA2, 0x13, 0x10, 0x91, 0xFF, 0xFF, 0x81, 0x15,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

const HEADER_ROW0_LARGE: [u8; 16] = [
    0x92, 0x23, 0x10, 0x91, 0xFF, 0xFF, 0x81, 0x13,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// Second header row (application identifier), shared by both families
const HEADER_ROW1: [u8; 16] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xD2, 0x76, 0x00,
    0x00, 0x04, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// Header cells that can never be rewritten
const FACTORY_READONLY: &[u16] = &[
    0x00, 0x01, 0x02, 0x03, 0x06, 0x07, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A,
];

impl CardKind {
    /// Addressable memory size in bytes
    pub fn size(self) -> usize {
        match self {
            CardKind::Small256 => 256,
            CardKind::Large1K => 1024,
        }
    }

    /// PSC length in bytes
    pub fn psc_length(self) -> usize {
        match self {
            CardKind::Small256 => 3,
            CardKind::Large1K => 2,
        }
    }

    /// PSC the card leaves the factory with
    pub fn default_psc(self) -> Vec<u8> {
        vec![0xFF; self.psc_length()]
    }

    /// First memory address of the PSC, None when the PSC is internal
    pub fn psc_address(self) -> Option<u16> {
        match self {
            CardKind::Small256 => None,
            CardKind::Large1K => Some(0x3FE),
        }
    }

    /// Memory address mirroring the error counter, None when not mirrored
    pub fn error_counter_address(self) -> Option<u16> {
        match self {
            CardKind::Small256 => None,
            CardKind::Large1K => Some(0x3FD),
        }
    }

    /// Error-counter ladder, fresh value first, blocked value last
    pub fn ladder(self) -> &'static [u8] {
        match self {
            CardKind::Small256 => LADDER_SMALL,
            CardKind::Large1K => LADDER_LARGE,
        }
    }

    /// Factory header rows written over the erased memory at 0x00
    pub fn factory_header(self) -> Vec<u8> {
        let row0 = match self {
            CardKind::Small256 => HEADER_ROW0_SMALL,
            CardKind::Large1K => HEADER_ROW0_LARGE,
        };
        let mut header = row0.to_vec();
        header.extend_from_slice(&HEADER_ROW1);
        header
    }

    /// Addresses fixed at manufacture
    pub fn factory_readonly(self) -> Vec<u16> {
        let mut cells = FACTORY_READONLY.to_vec();
        if let Some(addr) = self.error_counter_address() {
            cells.push(addr);
        }
        cells
    }

    /// Inclusive address range compared against the factory image
    pub fn user_area(self) -> (u16, u16) {
        match self {
            CardKind::Small256 => (0x20, 0xEF),
            CardKind::Large1K => (0x20, 0x3FC),
        }
    }

    /// Number of addresses covered by READ PROTECTION BITS
    pub fn protection_bits(self) -> usize {
        match self {
            CardKind::Small256 => 32,
            CardKind::Large1K => 1024,
        }
    }

    /// Highest address (exclusive) WRITE PROTECT may touch
    pub fn protectable_limit(self) -> usize {
        match self {
            CardKind::Small256 => 0x20,
            CardKind::Large1K => self.size(),
        }
    }

    /// Card-type byte sent in SELECT CARD TYPE
    pub fn select_code(self) -> u8 {
        match self {
            CardKind::Small256 => 0x06,
            CardKind::Large1K => 0x05,
        }
    }

    /// Length of the READ ERROR COUNTER response body (counter + padding)
    pub fn error_counter_response_len(self) -> usize {
        match self {
            CardKind::Small256 => 4,
            CardKind::Large1K => 3,
        }
    }

    /// Split an address into the APDU's P1/P2 bytes
    ///
    /// The 256-byte card uses a single address byte with P1 = 00.
    pub fn address_bytes(self, address: u16) -> (u8, u8) {
        match self {
            CardKind::Small256 => (0x00, address as u8),
            CardKind::Large1K => ((address >> 8) as u8, address as u8),
        }
    }

    /// Whether `address` fits the APDU's address bytes
    ///
    /// The 256-byte card has no high address byte, so 0x100 and above
    /// cannot be sent to it.
    pub fn encodes_address(self, address: u16) -> bool {
        match self {
            CardKind::Small256 => address <= 0xFF,
            CardKind::Large1K => true,
        }
    }

    /// Reverse of [`CardKind::address_bytes`]
    pub fn address_from(self, p1: u8, p2: u8) -> u16 {
        match self {
            CardKind::Small256 => p2 as u16,
            CardKind::Large1K => ((p1 as u16) << 8) | (p2 as u16),
        }
    }

    /// Family identified by its SELECT card-type byte
    pub fn from_select_code(code: u8) -> Option<Self> {
        match code {
            0x06 => Some(CardKind::Small256),
            0x05 => Some(CardKind::Large1K),
            _ => None,
        }
    }

    /// Smallest family whose memory holds a dump of `len` bytes
    pub fn for_dump_len(len: usize) -> Option<Self> {
        if len <= CardKind::Small256.size() {
            Some(CardKind::Small256)
        } else if len <= CardKind::Large1K.size() {
            Some(CardKind::Large1K)
        } else {
            None
        }
    }

    /// Chip name
    pub fn chip(self) -> &'static str {
        match self {
            CardKind::Small256 => "SLE5542",
            CardKind::Large1K => "SLE5528",
        }
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardKind::Small256 => write!(f, "SLE5542 (256B)"),
            CardKind::Large1K => write!(f, "SLE5528 (1KB)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(CardKind::Small256.size(), 256);
        assert_eq!(CardKind::Large1K.size(), 1024);
        assert_eq!(CardKind::Small256.psc_length(), 3);
        assert_eq!(CardKind::Large1K.psc_length(), 2);
    }

    #[test]
    fn test_psc_location() {
        assert_eq!(CardKind::Small256.psc_address(), None);
        assert_eq!(CardKind::Large1K.psc_address(), Some(0x3FE));
        assert_eq!(CardKind::Large1K.error_counter_address(), Some(0x3FD));
    }

    #[test]
    fn test_ladders_end_blocked() {
        for kind in [CardKind::Small256, CardKind::Large1K] {
            assert_eq!(*kind.ladder().last().unwrap(), 0x00);
        }
        assert_eq!(CardKind::Small256.ladder().len(), 4);
        assert_eq!(CardKind::Large1K.ladder().len(), 9);
    }

    #[test]
    fn test_factory_header() {
        let header = CardKind::Small256.factory_header();
        assert_eq!(header.len(), 32);
        assert_eq!(&header[..4], &[0xA2, 0x13, 0x10, 0x91]);
        assert_eq!(&header[0x15..0x1B], &[0xD2, 0x76, 0x00, 0x00, 0x04, 0x00]);
        assert_eq!(CardKind::Large1K.factory_header()[0], 0x92);
    }

    #[test]
    fn test_readonly_includes_counter_on_large() {
        assert!(!CardKind::Small256.factory_readonly().contains(&0x3FD));
        assert!(CardKind::Large1K.factory_readonly().contains(&0x3FD));
    }

    #[test]
    fn test_address_bytes() {
        assert_eq!(CardKind::Small256.address_bytes(0x20), (0x00, 0x20));
        assert_eq!(CardKind::Large1K.address_bytes(0x3FE), (0x03, 0xFE));
        assert_eq!(CardKind::Large1K.address_from(0x03, 0xFE), 0x3FE);
        assert_eq!(CardKind::Small256.address_from(0x03, 0xFE), 0xFE);
    }

    #[test]
    fn test_encodes_address() {
        assert!(CardKind::Small256.encodes_address(0xFF));
        assert!(!CardKind::Small256.encodes_address(0x100));
        assert!(CardKind::Large1K.encodes_address(0x3FF));
    }

    #[test]
    fn test_select_code() {
        for kind in [CardKind::Small256, CardKind::Large1K] {
            assert_eq!(CardKind::from_select_code(kind.select_code()), Some(kind));
        }
        assert_eq!(CardKind::from_select_code(0x01), None);
    }

    #[test]
    fn test_for_dump_len() {
        assert_eq!(CardKind::for_dump_len(200), Some(CardKind::Small256));
        assert_eq!(CardKind::for_dump_len(256), Some(CardKind::Small256));
        assert_eq!(CardKind::for_dump_len(257), Some(CardKind::Large1K));
        assert_eq!(CardKind::for_dump_len(1025), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(CardKind::Small256.to_string(), "SLE5542 (256B)");
        assert_eq!(CardKind::Large1K.to_string(), "SLE5528 (1KB)");
    }
}
