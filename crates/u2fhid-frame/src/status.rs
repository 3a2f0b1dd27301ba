//! ISO 7816 status words appended to U2F application responses.
//!
//! The transport never interprets these; they are listed so handlers and
//! tools share one definition.

pub const SW_NO_ERROR: u16 = 0x9000;
pub const SW_WRONG_DATA: u16 = 0x6A80;
pub const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
pub const SW_COMMAND_NOT_ALLOWED: u16 = 0x6986;
pub const SW_INS_NOT_SUPPORTED: u16 = 0x6D00;
pub const SW_WRONG_LENGTH: u16 = 0x6700;
pub const SW_CLA_NOT_SUPPORTED: u16 = 0x6E00;

/// Split a response into body and trailing status word.
///
/// Returns `None` when the response is shorter than two bytes.
pub fn split_status(response: &[u8]) -> Option<(&[u8], u16)> {
    let split = response.len().checked_sub(2)?;
    let (body, sw) = response.split_at(split);
    Some((body, u16::from_be_bytes([sw[0], sw[1]])))
}

/// Human-readable name of a status word.
pub fn status_name(sw: u16) -> &'static str {
    match sw {
        SW_NO_ERROR => "SW_NO_ERROR",
        SW_WRONG_DATA => "SW_WRONG_DATA",
        SW_CONDITIONS_NOT_SATISFIED => "SW_CONDITIONS_NOT_SATISFIED",
        SW_COMMAND_NOT_ALLOWED => "SW_COMMAND_NOT_ALLOWED",
        SW_INS_NOT_SUPPORTED => "SW_INS_NOT_SUPPORTED",
        SW_WRONG_LENGTH => "SW_WRONG_LENGTH",
        SW_CLA_NOT_SUPPORTED => "SW_CLA_NOT_SUPPORTED",
        _ => "SW_UNKNOWN",
    }
}
