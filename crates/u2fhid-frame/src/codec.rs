use std::time::Duration;

use bytes::{Buf, BufMut, Bytes};

use crate::channel::ChannelId;
use crate::command::{Command, TYPE_INIT, TYPE_MASK};
use crate::error::{FrameError, Result};

/// Size of one HID report.
pub const REPORT_SIZE: usize = 64;

/// Init header: channel (4) + command (1) + length (2) = 7 bytes.
pub const INIT_HEADER_SIZE: usize = 7;

/// Continuation header: channel (4) + sequence (1) = 5 bytes.
pub const CONT_HEADER_SIZE: usize = 5;

/// Payload bytes carried by an Init frame.
pub const INIT_DATA_SIZE: usize = REPORT_SIZE - INIT_HEADER_SIZE;

/// Payload bytes carried by a Continuation frame.
pub const CONT_DATA_SIZE: usize = REPORT_SIZE - CONT_HEADER_SIZE;

/// Highest continuation sequence number.
pub const MAX_SEQUENCE: u8 = 0x7F;

/// Largest message one Init plus 128 Continuation frames can carry: 7609 bytes.
pub const MAX_MESSAGE_SIZE: usize = INIT_DATA_SIZE + (MAX_SEQUENCE as usize + 1) * CONT_DATA_SIZE;

/// Default minimum gap between two outbound reports.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(2500);

/// One raw HID report.
pub type Report = [u8; REPORT_SIZE];

/// First frame of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFrame {
    channel: ChannelId,
    command: u8,
    length: u16,
    data: Bytes,
}

impl InitFrame {
    /// Build an Init frame. The command's high bit is always set.
    ///
    /// `data` may be shorter than [`INIT_DATA_SIZE`]; it is zero-padded on
    /// encode. `length` is the total message length and is not checked here.
    pub fn new(
        channel: ChannelId,
        command: u8,
        length: u16,
        data: impl Into<Bytes>,
    ) -> Result<Self> {
        let data = data.into();
        if data.len() > INIT_DATA_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: data.len(),
                max: INIT_DATA_SIZE,
            });
        }
        Ok(Self {
            channel,
            command: command | TYPE_INIT,
            length,
            data,
        })
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Full command byte, high bit set.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Declared total message length.
    pub fn length(&self) -> u16 {
        self.length
    }

    /// Frame payload, not trimmed to the declared length.
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Follow-up frame of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContFrame {
    channel: ChannelId,
    sequence: u8,
    data: Bytes,
}

impl ContFrame {
    /// Build a Continuation frame. `sequence` must be at most [`MAX_SEQUENCE`].
    pub fn new(channel: ChannelId, sequence: u8, data: impl Into<Bytes>) -> Result<Self> {
        if sequence > MAX_SEQUENCE {
            return Err(FrameError::SequenceOutOfRange(sequence));
        }
        let data = data.into();
        if data.len() > CONT_DATA_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: data.len(),
                max: CONT_DATA_SIZE,
            });
        }
        Ok(Self {
            channel,
            sequence,
            data,
        })
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// A decoded HID report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Init(InitFrame),
    Cont(ContFrame),
}

impl Frame {
    /// The channel this report is addressed to.
    pub fn channel(&self) -> ChannelId {
        match self {
            Frame::Init(init) => init.channel,
            Frame::Cont(cont) => cont.channel,
        }
    }

    /// Returns true for an Init frame.
    pub fn is_init(&self) -> bool {
        matches!(self, Frame::Init(_))
    }

    /// Frame payload as carried in the report.
    pub fn data(&self) -> &Bytes {
        match self {
            Frame::Init(init) => &init.data,
            Frame::Cont(cont) => &cont.data,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Init(init) => Command::from_byte(init.command).name(),
            Frame::Cont(_) => "CONT",
        }
    }
}

/// Encode a frame into one zero-padded HID report.
///
/// Wire format:
/// ```text
///         ┌────────────┬──────────────┬─────────────┬──────────────────┐
/// Init    │ CID (4B BE)│ CMD | 0x80   │ BCNT (2B BE)│ DATA (57B)       │
///         ├────────────┼──────────────┼─────────────┴──────────────────┤
/// Cont    │ CID (4B BE)│ SEQ (0..7F)  │ DATA (59B)                     │
///         └────────────┴──────────────┴────────────────────────────────┘
/// ```
pub fn encode_frame(frame: &Frame) -> Report {
    let mut report = [0u8; REPORT_SIZE];
    let mut dst = &mut report[..];
    match frame {
        Frame::Init(init) => {
            dst.put_u32(init.channel.get());
            dst.put_u8(init.command);
            dst.put_u16(init.length);
            dst.put_slice(&init.data);
        }
        Frame::Cont(cont) => {
            dst.put_u32(cont.channel.get());
            dst.put_u8(cont.sequence);
            dst.put_slice(&cont.data);
        }
    }
    report
}

/// Decode one HID report.
///
/// Purely structural: the only failure is an input that is not exactly
/// [`REPORT_SIZE`] bytes long. Init payloads keep all 57 bytes; trimming to
/// the declared length happens during reassembly.
pub fn decode_frame(report: &[u8]) -> Result<Frame> {
    if report.len() != REPORT_SIZE {
        return Err(FrameError::Malformed { len: report.len() });
    }

    let mut src = report;
    let channel = ChannelId::new(src.get_u32());
    let type_byte = src.get_u8();

    if type_byte & TYPE_MASK == TYPE_INIT {
        let length = src.get_u16();
        Ok(Frame::Init(InitFrame {
            channel,
            command: type_byte,
            length,
            data: Bytes::copy_from_slice(src),
        }))
    } else {
        Ok(Frame::Cont(ContFrame {
            channel,
            sequence: type_byte,
            data: Bytes::copy_from_slice(src),
        }))
    }
}

/// Configuration for report I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Read timeout for blocking operations. The device loop uses it as its
    /// housekeeping tick.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
    /// Minimum gap between two reports of the same outbound message.
    pub frame_interval: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{U2FHID_INIT, U2FHID_PING};

    fn cid() -> ChannelId {
        ChannelId::new(0x0102_0304)
    }

    #[test]
    fn protocol_sizes() {
        assert_eq!(INIT_DATA_SIZE, 57);
        assert_eq!(CONT_DATA_SIZE, 59);
        assert_eq!(MAX_MESSAGE_SIZE, 7609);
    }

    #[test]
    fn init_frame_layout() {
        let frame = Frame::Init(InitFrame::new(cid(), U2FHID_PING, 0x0102, vec![0xAA; 3]).unwrap());
        let report = encode_frame(&frame);

        assert_eq!(&report[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(report[4], 0x81);
        assert_eq!(&report[5..7], &[0x01, 0x02]);
        assert_eq!(&report[7..10], &[0xAA; 3]);
        assert!(report[10..].iter().all(|b| *b == 0));
    }

    #[test]
    fn cont_frame_layout() {
        let frame = Frame::Cont(ContFrame::new(cid(), 5, vec![0xBB; 59]).unwrap());
        let report = encode_frame(&frame);

        assert_eq!(&report[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(report[4], 5);
        assert_eq!(&report[5..], &[0xBB; 59][..]);
    }

    #[test]
    fn init_constructor_sets_type_bit() {
        let init = InitFrame::new(cid(), 0x06, 8, Bytes::new()).unwrap();
        assert_eq!(init.command(), U2FHID_INIT);
    }

    #[test]
    fn decode_high_bit_selects_kind() {
        let mut report = [0u8; REPORT_SIZE];
        report[..4].copy_from_slice(&[0xFF; 4]);
        report[4] = 0x86;
        report[5] = 0x00;
        report[6] = 0x08;
        report[7..15].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let Frame::Init(init) = decode_frame(&report).unwrap() else {
            panic!("expected init frame");
        };
        assert!(init.channel().is_broadcast());
        assert_eq!(init.command(), U2FHID_INIT);
        assert_eq!(init.length(), 8);
        assert_eq!(init.data().len(), INIT_DATA_SIZE);
        assert_eq!(&init.data()[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);

        report[4] = 0x7F;
        let Frame::Cont(cont) = decode_frame(&report).unwrap() else {
            panic!("expected continuation frame");
        };
        assert_eq!(cont.sequence(), 0x7F);
        assert_eq!(cont.data().len(), CONT_DATA_SIZE);
    }

    #[test]
    fn decode_rejects_wrong_size() {
        assert!(matches!(
            decode_frame(&[0u8; 63]),
            Err(FrameError::Malformed { len: 63 })
        ));
        assert!(matches!(
            decode_frame(&[0u8; 65]),
            Err(FrameError::Malformed { len: 65 })
        ));
        assert!(matches!(
            decode_frame(&[]),
            Err(FrameError::Malformed { len: 0 })
        ));
    }

    #[test]
    fn decode_reencodes_identically() {
        let mut report = [0u8; REPORT_SIZE];
        for (i, b) in report.iter_mut().enumerate() {
            *b = i as u8;
        }
        report[4] = 0x83;
        let frame = decode_frame(&report).unwrap();
        assert_eq!(encode_frame(&frame), report);
    }

    #[test]
    fn oversized_frame_payloads_rejected() {
        assert!(matches!(
            InitFrame::new(cid(), U2FHID_PING, 58, vec![0; 58]),
            Err(FrameError::PayloadTooLarge { size: 58, max: 57 })
        ));
        assert!(matches!(
            ContFrame::new(cid(), 0, vec![0; 60]),
            Err(FrameError::PayloadTooLarge { size: 60, max: 59 })
        ));
    }

    #[test]
    fn sequence_high_bit_rejected() {
        assert!(matches!(
            ContFrame::new(cid(), 0x80, Bytes::new()),
            Err(FrameError::SequenceOutOfRange(0x80))
        ));
    }

    #[test]
    fn frame_kind_labels() {
        let init = Frame::Init(InitFrame::new(cid(), U2FHID_PING, 0, Bytes::new()).unwrap());
        let cont = Frame::Cont(ContFrame::new(cid(), 0, Bytes::new()).unwrap());
        assert_eq!(init.kind(), "PING");
        assert_eq!(cont.kind(), "CONT");
        assert!(init.is_init());
        assert_eq!(cont.channel(), cid());
    }
}
