//! Hex parsing and formatting for ids and payloads

use crate::error::{Error, Result};

/// Parse a vendor or product id written as `0x` followed by 1-4 hex digits
pub fn parse_hex_id(id: &str) -> Result<u16> {
    let digits = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| Error::hex(id, "must start with '0x' (e.g., '0x1234')"))?;

    if digits.is_empty() || digits.len() > 4 {
        return Err(Error::hex(id, "hex part must be 1-4 digits"));
    }

    u16::from_str_radix(digits, 16).map_err(|_| Error::hex(id, "not a valid hex number"))
}

/// Parse a byte payload such as `"deadbeef"`, `"de ad be ef"` or `"0xdead"`
pub fn parse_hex_bytes(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<char> = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();

    if digits.len() % 2 != 0 {
        return Err(Error::hex(input, "odd number of hex digits"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16)
                .map_err(|_| Error::hex(input, format!("'{}' is not a hex byte", byte)))
        })
        .collect()
}

/// Space-separated lowercase hex
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_id_valid() {
        assert_eq!(parse_hex_id("0x1234").unwrap(), 0x1234);
        assert_eq!(parse_hex_id("0XABCD").unwrap(), 0xabcd);
        assert_eq!(parse_hex_id("0x1").unwrap(), 1);
    }

    #[test]
    fn test_parse_hex_id_invalid() {
        assert!(parse_hex_id("1234").is_err());
        assert!(parse_hex_id("0x").is_err());
        assert!(parse_hex_id("0x12345").is_err());
        assert!(parse_hex_id("0xGHIJ").is_err());
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_hex_bytes("de ad:be ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_hex_bytes("0x0102").unwrap(), vec![1, 2]);
        assert!(parse_hex_bytes("").unwrap().is_empty());
        assert!(parse_hex_bytes("abc").is_err());
        assert!(parse_hex_bytes("zz").is_err());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x01, 0xab, 0xff]), "01 ab ff");
        assert_eq!(format_hex(&[]), "");
    }
}
