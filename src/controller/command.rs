//! Canonical commands and wire decoding
//!
//! All three remote surfaces normalize to [`Command`] before anything touches
//! the state controller. UDP and BLE share the binary opcode scheme; HTTP
//! form tokens carry 1-based patch numbers and are translated here.

/// A decoded remote instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    BankUp,
    BankDown,
    /// 0-based patch index within the active bank.
    SelectPatch(usize),
}

/// Binary opcodes (shared by UDP and the BLE characteristic).
const OP_BANK_UP: u8 = 0x01;
const OP_BANK_DOWN: u8 = 0x02;
const OP_SELECT_PATCH: u8 = 0x03;

impl Command {
    /// Decode a binary frame. Undersized frames and unknown opcodes yield
    /// `None`; callers drop them silently.
    pub fn decode_frame(data: &[u8]) -> Option<Command> {
        match *data.first()? {
            OP_BANK_UP => Some(Command::BankUp),
            OP_BANK_DOWN => Some(Command::BankDown),
            OP_SELECT_PATCH => data.get(1).map(|&idx| Command::SelectPatch(idx as usize)),
            _ => None,
        }
    }

    /// Decode one `x-www-form-urlencoded` token (`bank=up`, `bank=down`,
    /// `patch=<1-based index>`).
    ///
    /// `patch=0` is rejected: the index is 1-based on this surface, and the
    /// underflow must not wrap to some other patch.
    pub fn parse_form_token(token: &str) -> Option<Command> {
        match token.trim() {
            "bank=up" => Some(Command::BankUp),
            "bank=down" => Some(Command::BankDown),
            token => {
                let number = token.strip_prefix("patch=")?;
                let index: usize = number.parse().ok()?;
                index.checked_sub(1).map(Command::SelectPatch)
            }
        }
    }
}

/// XOR of all bytes, used as the trailing checksum of the checksummed UDP
/// variant (both inbound frames and outbound telemetry).
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Validate and strip the trailing checksum of a frame. Returns the payload
/// on success, `None` for frames too short to carry a checksum or failing it.
pub fn strip_checksum(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 2 {
        return None;
    }
    let (payload, tail) = frame.split_at(frame.len() - 1);
    if tail[0] == xor_checksum(payload) {
        Some(payload)
    } else {
        None
    }
}
