//! U2FHID command bytes and error codes.
//!
//! Command bytes always have the high bit set; on the wire that bit is what
//! marks a report as an Init frame.

/// Frame type mask for byte 4 of a report.
pub const TYPE_MASK: u8 = 0x80;
/// Init frame marker.
pub const TYPE_INIT: u8 = 0x80;

/// Echo data through the transport only.
pub const U2FHID_PING: u8 = TYPE_INIT | 0x01;
/// Encapsulated U2F message.
pub const U2FHID_MSG: u8 = TYPE_INIT | 0x03;
/// Exclusive channel lock.
pub const U2FHID_LOCK: u8 = TYPE_INIT | 0x04;
/// Channel allocation.
pub const U2FHID_INIT: u8 = TYPE_INIT | 0x06;
/// Device identification wink.
pub const U2FHID_WINK: u8 = TYPE_INIT | 0x08;
/// Protocol resync.
pub const U2FHID_SYNC: u8 = TYPE_INIT | 0x3C;
/// Error response.
pub const U2FHID_ERROR: u8 = TYPE_INIT | 0x3F;

/// First vendor-defined command byte.
pub const U2FHID_VENDOR_FIRST: u8 = TYPE_INIT | 0x40;
/// Last vendor-defined command byte.
pub const U2FHID_VENDOR_LAST: u8 = TYPE_INIT | 0x7F;

/// INIT request nonce size.
pub const INIT_NONCE_SIZE: usize = 8;
/// INIT response: nonce, channel id, 4 version bytes, capability flags.
pub const INIT_RESPONSE_SIZE: usize = INIT_NONCE_SIZE + 4 + 4 + 1;
/// Device supports WINK.
pub const CAPFLAG_WINK: u8 = 0x01;
/// Interface version reported in the INIT response.
pub const U2FHID_IF_VERSION: u8 = 2;

/// Decoded command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Ping,
    Msg,
    Lock,
    Init,
    Wink,
    Sync,
    Error,
    /// Vendor range `0xC0..=0xFF`, carrying the full command byte.
    Vendor(u8),
    /// Anything else, carrying the full command byte.
    Unknown(u8),
}

impl Command {
    /// Classify a command byte as found in byte 4 of an Init frame.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            U2FHID_PING => Command::Ping,
            U2FHID_MSG => Command::Msg,
            U2FHID_LOCK => Command::Lock,
            U2FHID_INIT => Command::Init,
            U2FHID_WINK => Command::Wink,
            U2FHID_SYNC => Command::Sync,
            U2FHID_ERROR => Command::Error,
            U2FHID_VENDOR_FIRST..=U2FHID_VENDOR_LAST => Command::Vendor(byte),
            other => Command::Unknown(other),
        }
    }

    /// The wire command byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Ping => U2FHID_PING,
            Command::Msg => U2FHID_MSG,
            Command::Lock => U2FHID_LOCK,
            Command::Init => U2FHID_INIT,
            Command::Wink => U2FHID_WINK,
            Command::Sync => U2FHID_SYNC,
            Command::Error => U2FHID_ERROR,
            Command::Vendor(byte) | Command::Unknown(byte) => byte,
        }
    }

    /// Human-readable command name.
    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Msg => "MSG",
            Command::Lock => "LOCK",
            Command::Init => "INIT",
            Command::Wink => "WINK",
            Command::Sync => "SYNC",
            Command::Error => "ERROR",
            Command::Vendor(_) => "VENDOR",
            Command::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        Command::from_byte(byte)
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> Self {
        cmd.to_byte()
    }
}

/// Low-level error codes carried in the body of an ERROR response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    None = 0x00,
    InvalidCmd = 0x01,
    InvalidPar = 0x02,
    InvalidLen = 0x03,
    InvalidSeq = 0x04,
    MsgTimeout = 0x05,
    ChannelBusy = 0x06,
    LockRequired = 0x0A,
    SyncFail = 0x0B,
    Other = 0x7F,
}

impl ErrorCode {
    /// The wire byte.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte. Unknown values return `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let code = match byte {
            0x00 => ErrorCode::None,
            0x01 => ErrorCode::InvalidCmd,
            0x02 => ErrorCode::InvalidPar,
            0x03 => ErrorCode::InvalidLen,
            0x04 => ErrorCode::InvalidSeq,
            0x05 => ErrorCode::MsgTimeout,
            0x06 => ErrorCode::ChannelBusy,
            0x0A => ErrorCode::LockRequired,
            0x0B => ErrorCode::SyncFail,
            0x7F => ErrorCode::Other,
            _ => return None,
        };
        Some(code)
    }

    /// Symbolic name as used in the protocol definition.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::None => "ERR_NONE",
            ErrorCode::InvalidCmd => "ERR_INVALID_CMD",
            ErrorCode::InvalidPar => "ERR_INVALID_PAR",
            ErrorCode::InvalidLen => "ERR_INVALID_LEN",
            ErrorCode::InvalidSeq => "ERR_INVALID_SEQ",
            ErrorCode::MsgTimeout => "ERR_MSG_TIMEOUT",
            ErrorCode::ChannelBusy => "ERR_CHANNEL_BUSY",
            ErrorCode::LockRequired => "ERR_LOCK_REQUIRED",
            ErrorCode::SyncFail => "ERR_SYNC_FAIL",
            ErrorCode::Other => "ERR_OTHER",
        }
    }
}
