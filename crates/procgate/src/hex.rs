//! Parsing and printing of addresses and byte strings.

use std::fmt::Write;

/// Parse `0x`-prefixed hex or plain decimal.
pub fn parse_address(s: &str) -> Result<u64, String>
{
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

/// Parse hex bytes, with or without whitespace between them.
pub fn parse_bytes(s: &str) -> Result<Vec<u8>, String>
{
    let digits: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() {
        return Err("no bytes given".to_string());
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{s}'"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text: String = pair.iter().collect();
            u8::from_str_radix(&text, 16).map_err(|_| format!("invalid hex byte '{text}'"))
        })
        .collect()
}

/// Classic hex dump, 16 bytes per line, labelled with target addresses.
#[allow(dead_code)]
pub fn dump(base: u64, bytes: &[u8]) -> String
{
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:016x}  ", base.wrapping_add(line as u64 * 16));
        for index in 0..16 {
            match chunk.get(index) {
                Some(byte) => {
                    let _ = write!(out, "{byte:02x} ");
                }
                None => out.push_str("   "),
            }
        }
        out.push(' ');
        out.extend(
            chunk
                .iter()
                .map(|&byte| if byte.is_ascii_graphic() || byte == b' ' { byte as char } else { '.' }),
        );
        out.push('\n');
    }
    out
}
