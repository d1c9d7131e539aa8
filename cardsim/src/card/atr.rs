//! Answer to SELECT CARD TYPE
//!
//! The reader resets the synchronous card and answers with a short
//! ATR-like block. Both families answer identically.

/// Response data returned by SELECT CARD TYPE
pub const SELECT_RESPONSE: &[u8] = &[
    0x3B, // TS: Direct convention
    0x04, // T0: no interface bytes, 4 historical bytes
    0x92, 0x23, 0x10, 0x91, // Historical bytes: synchronous card header
];
