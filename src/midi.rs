//! MIDI message encoding
//!
//! Patch activation only ever emits Program Change messages, so this module
//! covers exactly that plus a hex formatter for frame logging.

/// Encode a Program Change message.
///
/// `channel` is 1-based (1-16) as it appears in patch configuration; the wire
/// status byte carries it 0-based. `program` is masked to the 7-bit range.
pub fn program_change(channel: u8, program: u8) -> [u8; 2] {
    let status = 0xC0 | (channel.wrapping_sub(1) & 0x0F);
    [status, program & 0x7F]
}

/// Format raw bytes as a spaced hex string for debug logging.
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
