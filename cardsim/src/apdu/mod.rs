//! APDU (Application Protocol Data Unit) handling
//!
//! Memory cards of the SLE5542/SLE5528 families are driven through the
//! reader's pseudo-APDUs (class byte `FF`). Only short APDUs are used:
//! the largest transfer is 256 bytes.
//!
//! # Example
//! ```ignore
//! use cardsim::apdu::{parse_apdu, APDU, ins};
//!
//! // READ MEMORY, 16 bytes from 0x20 on a 256-byte card
//! let raw = &[0xFF, 0xB0, 0x00, 0x20, 0x10];
//! let apdu = parse_apdu(raw).unwrap();
//! assert_eq!(apdu.ins, ins::READ_MEMORY);
//! assert_eq!(apdu.le, Some(16));
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Class byte used by all memory-card pseudo-APDUs
pub const CLA_MEMORY_CARD: u8 = 0xFF;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,
}

/// A memory-card APDU command
///
/// - `cla`: Class byte (always `FF` for memory-card commands)
/// - `ins`: Instruction byte (the command to execute)
/// - `p1`, `p2`: Parameter bytes (address bytes for memory commands)
/// - `data`: Command data (may be empty)
/// - `le`: Expected response length (None if not specified)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new memory-card APDU with just the header
    pub fn new(ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla: CLA_MEMORY_CARD,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Create a new memory-card APDU carrying command data
    pub fn with_data(ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::new(ins, p1, p2)
        }
    }

    /// Create a new memory-card APDU expecting `le` response bytes
    pub fn with_le(ins: u8, p1: u8, p2: u8, le: u32) -> Self {
        Self {
            le: Some(le),
            ..Self::new(ins, p1, p2)
        }
    }

    /// Encode as short-format bytes: CLA INS P1 P2 [Lc Data] [Le]
    ///
    /// Le = 256 is encoded as `00`. Data longer than 255 bytes cannot be
    /// expressed in a short APDU; callers check the length first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.data.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(le) = self.le {
            out.push(if le >= 256 { 0x00 } else { le as u8 });
        }
        out
    }
}

/// Parse raw bytes into an APDU (short format only)
///
/// - Case 1: CLA INS P1 P2
/// - Case 2: CLA INS P1 P2 Le
/// - Case 3: CLA INS P1 P2 Lc Data
/// - Case 4: CLA INS P1 P2 Lc Data Le
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    if data.len() < 4 {
        return Err(APDUError::TooShort(data.len()));
    }

    let mut apdu = APDU {
        cla: data[0],
        ins: data[1],
        p1: data[2],
        p2: data[3],
        data: Vec::new(),
        le: None,
    };

    let remaining = &data[4..];
    if remaining.is_empty() {
        return Ok(apdu);
    }

    let first_byte = remaining[0];

    // Case 2: Only Le - Le=0 means 256
    if remaining.len() == 1 {
        apdu.le = Some(if first_byte == 0 { 256 } else { first_byte as u32 });
        return Ok(apdu);
    }

    let lc = first_byte as usize;
    if lc == 0 {
        return Err(APDUError::InvalidLength);
    }

    if remaining.len() == 1 + lc {
        apdu.data = remaining[1..].to_vec();
        return Ok(apdu);
    }

    if remaining.len() == 1 + lc + 1 {
        let le_byte = remaining[1 + lc];
        apdu.data = remaining[1..1 + lc].to_vec();
        apdu.le = Some(if le_byte == 0 { 256 } else { le_byte as u32 });
        return Ok(apdu);
    }

    Err(APDUError::InvalidLength)
}

/// Memory-card instruction bytes
pub mod ins {
    pub const SELECT_CARD_TYPE: u8 = 0xA4;
    pub const READ_MEMORY: u8 = 0xB0;
    pub const READ_ERROR_COUNTER: u8 = 0xB1;
    pub const READ_PROTECTION_BITS: u8 = 0xB2;
    pub const PRESENT_PSC: u8 = 0x20;
    pub const WRITE_MEMORY: u8 = 0xD0;
    pub const WRITE_PROTECTION: u8 = 0xD1;
    pub const CHANGE_PSC: u8 = 0xD2;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case1_no_data_no_le() {
        let apdu = parse_apdu(&[0xFF, 0xB1, 0x00, 0x00]).unwrap();
        assert_eq!(apdu.cla, 0xFF);
        assert_eq!(apdu.ins, ins::READ_ERROR_COUNTER);
        assert!(apdu.data.is_empty());
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_case2_le_only() {
        let apdu = parse_apdu(&[0xFF, 0xB0, 0x00, 0x20, 0x00]).unwrap();
        assert_eq!(apdu.ins, ins::READ_MEMORY);
        assert_eq!(apdu.p2, 0x20);
        assert_eq!(apdu.le, Some(256)); // 0x00 means 256
    }

    #[test]
    fn test_case3_lc_data() {
        let apdu = parse_apdu(&[0xFF, 0x20, 0x00, 0x00, 0x03, 0xFF, 0xFF, 0xFF]).unwrap();
        assert_eq!(apdu.ins, ins::PRESENT_PSC);
        assert_eq!(apdu.data, vec![0xFF, 0xFF, 0xFF]);
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_case4_lc_data_le() {
        let apdu = parse_apdu(&[0xFF, 0xA4, 0x00, 0x00, 0x01, 0x06, 0x00]).unwrap();
        assert_eq!(apdu.data, vec![0x06]);
        assert_eq!(apdu.le, Some(256));
    }

    #[test]
    fn test_invalid_length() {
        assert_eq!(
            parse_apdu(&[0xFF, 0xD0, 0x00, 0x20, 0x04, 0x01]),
            Err(APDUError::InvalidLength)
        );
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            parse_apdu(&[0xFF, 0xA4, 0x00]),
            Err(APDUError::TooShort(3))
        ));
    }

    #[test]
    fn test_to_bytes_matches_parse() {
        let apdu = APDU::with_data(ins::WRITE_MEMORY, 0x03, 0xFE, vec![0x12, 0x34]);
        let raw = apdu.to_bytes();
        assert_eq!(raw, vec![0xFF, 0xD0, 0x03, 0xFE, 0x02, 0x12, 0x34]);
        assert_eq!(parse_apdu(&raw).unwrap(), apdu);
    }

    #[test]
    fn test_le_256_encoded_as_zero() {
        let apdu = APDU::with_le(ins::READ_MEMORY, 0x00, 0x00, 256);
        assert_eq!(apdu.to_bytes(), vec![0xFF, 0xB0, 0x00, 0x00, 0x00]);
    }
}
