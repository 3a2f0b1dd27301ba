use std::time::Duration;

use crate::command::ErrorCode;

/// Errors that can occur during report encoding/decoding and report I/O.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The input is not a full HID report.
    #[error("malformed report ({len} bytes, expected 64)")]
    Malformed { len: usize },

    /// The payload exceeds what the frame or message can carry.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A continuation sequence number with the high bit set.
    #[error("sequence number {0:#04x} out of range (max 0x7f)")]
    SequenceOutOfRange(u8),

    /// An I/O error occurred while reading or writing reports.
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended on a report boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// Outbound pacing was cancelled before the message was fully written.
    #[error("message transmission cancelled after {sent} of {total} frames")]
    Cancelled { sent: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Protocol violations detected while putting a message back together.
///
/// These never tear down the session; each maps to the one-byte code sent
/// back to the host in an ERROR response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    /// Declared message length above the protocol maximum.
    #[error("declared length {declared} exceeds maximum {max}")]
    InvalidLength { declared: usize, max: usize },

    /// Continuation frame out of order, or with no message in progress.
    #[error("unexpected sequence number {got} (expected {expected:?})")]
    InvalidSequence { expected: Option<u8>, got: u8 },

    /// No frame arrived within the transaction timeout.
    #[error("message timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

impl ReassemblyError {
    /// Wire error code reported to the host.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ReassemblyError::InvalidLength { .. } => ErrorCode::InvalidLen,
            ReassemblyError::InvalidSequence { .. } => ErrorCode::InvalidSeq,
            ReassemblyError::Timeout { .. } => ErrorCode::MsgTimeout,
        }
    }
}
