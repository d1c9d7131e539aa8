//! Status Word (SW) constants for memory-card responses
//!
//! The reader answers every pseudo-APDU with SW1/SW2. PSC-related commands
//! are the exception to plain `90 00`: SW2 carries the error counter.

/// Status Word constants
pub struct SW;

impl SW {
    // Success
    pub const SUCCESS: u16 = 0x9000;

    // Checking errors
    pub const WRONG_LENGTH: u16 = 0x6700;
    /// Returned by CHANGE PSC when the new code has the wrong length
    pub const WRITE_PROTECTION_ERROR: u16 = 0x6982;
    /// Card permanently blocked (error counter exhausted)
    pub const CARD_BLOCKED: u16 = 0x6983;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
    pub const WRONG_DATA: u16 = 0x6A80;
    pub const INCORRECT_P1_P2: u16 = 0x6A86;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    /// Create a PSC status word (90xx): SW2 is the current error counter
    #[inline]
    pub fn psc_status(counter: u8) -> u16 {
        0x9000 | (counter as u16)
    }

    /// Check if a status word reports a blocked card
    #[inline]
    pub fn is_blocked(sw: u16) -> bool {
        sw == Self::CARD_BLOCKED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psc_status() {
        assert_eq!(SW::psc_status(0x07), 0x9007);
        assert_eq!(SW::psc_status(0xFF), 0x90FF);
        assert_eq!(SW::psc_status(0x00), 0x9000);
    }

    #[test]
    fn test_is_blocked() {
        assert!(SW::is_blocked(0x6983));
        assert!(!SW::is_blocked(0x6982));
    }
}
