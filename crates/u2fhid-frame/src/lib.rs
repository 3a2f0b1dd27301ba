//! U2FHID report framing.
//!
//! Every HID report is exactly 64 bytes and starts with a 4-byte channel id:
//! - Init frames carry a command byte, a 2-byte big-endian message length and
//!   the first 57 bytes of the message
//! - Continuation frames carry a 7-bit sequence number and the next 59 bytes
//!
//! Messages of up to 7609 bytes are split into frames by [`segment`] and put
//! back together, one channel at a time, by [`Transaction`].

pub mod channel;
pub mod codec;
pub mod command;
pub mod error;
pub mod message;
pub mod reader;
pub mod reassembly;
pub mod segment;
pub mod status;
pub mod writer;

pub use channel::ChannelId;
pub use codec::{
    decode_frame, encode_frame, ContFrame, Frame, FrameConfig, InitFrame, Report, CONT_DATA_SIZE,
    DEFAULT_FRAME_INTERVAL, INIT_DATA_SIZE, MAX_MESSAGE_SIZE, MAX_SEQUENCE, REPORT_SIZE,
};
pub use command::{Command, ErrorCode};
pub use error::{FrameError, ReassemblyError, Result};
pub use message::Message;
pub use reader::ReportReader;
pub use reassembly::Transaction;
pub use segment::{frame_count, segment, Segmenter};
pub use writer::{CancelHandle, ReportWriter};
