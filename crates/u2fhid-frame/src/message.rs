use bytes::Bytes;

use crate::channel::ChannelId;
use crate::command::{Command, ErrorCode, U2FHID_ERROR};
use crate::error::Result;
use crate::segment::{segment, Segmenter};

/// A complete U2FHID message: what reassembly produces and segmentation consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel the message travels on.
    pub channel: ChannelId,
    /// Full command byte, high bit set.
    pub command: u8,
    /// Message body.
    pub payload: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(channel: ChannelId, command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            command,
            payload: payload.into(),
        }
    }

    /// An ERROR response carrying a single error code byte.
    pub fn error(channel: ChannelId, code: ErrorCode) -> Self {
        Self::new(channel, U2FHID_ERROR, vec![code.as_byte()])
    }

    /// Decoded command.
    pub fn kind(&self) -> Command {
        Command::from_byte(self.command)
    }

    /// The error code, if this is a well-formed ERROR response.
    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.command != U2FHID_ERROR || self.payload.len() != 1 {
            return None;
        }
        ErrorCode::from_byte(self.payload[0])
    }

    /// Split this message into frames.
    pub fn segments(&self) -> Result<Segmenter> {
        segment(self.channel, self.command, self.payload.clone())
    }
}
