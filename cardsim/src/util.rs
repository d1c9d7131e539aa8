//! Hex and ASCII helpers shared by the command layer and the log

/// Format bytes as spaced upper-case hex ("FF 20 00")
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex text; whitespace between digits is ignored
pub fn parse_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
}

/// Printable ASCII rendering, '.' for everything else
pub fn to_ascii(data: &[u8]) -> String {
    data.iter()
        .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xFF, 0x20, 0x00]), "FF 20 00");
        assert_eq!(format_hex(&[]), "");
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("FF FF FF").unwrap(), vec![0xFF, 0xFF, 0xFF]);
        assert_eq!(parse_hex("12ab").unwrap(), vec![0x12, 0xAB]);
        assert_eq!(parse_hex(" 0a\t0B ").unwrap(), vec![0x0A, 0x0B]);
        assert!(parse_hex("F").is_err());
        assert!(parse_hex("ZZ").is_err());
    }

    #[test]
    fn test_to_ascii() {
        assert_eq!(to_ascii(&[0x41, 0x42, 0x00, 0x7F]), "AB..");
    }
}
