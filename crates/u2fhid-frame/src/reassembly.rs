//! Per-channel message reassembly.
//!
//! A [`Transaction`] exists only while a message is `Receiving`. It is created
//! from the Init frame, fed Continuation frames in order, and turned into a
//! [`Message`] once the declared length has arrived. Any error discards it;
//! the owner drops the transaction and the channel is back to idle.

use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::channel::ChannelId;
use crate::codec::{ContFrame, InitFrame, MAX_MESSAGE_SIZE};
use crate::error::ReassemblyError;
use crate::message::Message;

/// In-progress reassembly state for one channel.
#[derive(Debug)]
pub struct Transaction {
    channel: ChannelId,
    command: u8,
    declared: usize,
    buf: BytesMut,
    next_sequence: u8,
    last_frame: Instant,
}

impl Transaction {
    /// Begin a message from its Init frame.
    ///
    /// Copies at most `min(57, declared)` bytes; a message of 57 bytes or
    /// fewer is complete immediately.
    pub fn start(frame: &InitFrame, now: Instant) -> Result<Self, ReassemblyError> {
        let declared = usize::from(frame.length());
        if declared > MAX_MESSAGE_SIZE {
            return Err(ReassemblyError::InvalidLength {
                declared,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(declared);
        let take = declared.min(frame.data().len());
        buf.extend_from_slice(&frame.data()[..take]);

        Ok(Self {
            channel: frame.channel(),
            command: frame.command(),
            declared,
            buf,
            next_sequence: 0,
            last_frame: now,
        })
    }

    /// Append a Continuation frame.
    ///
    /// The sequence number must be exactly the next expected one. A frame
    /// arriving after the message is already complete is out of sequence too.
    pub fn push(&mut self, frame: &ContFrame, now: Instant) -> Result<(), ReassemblyError> {
        debug_assert_eq!(frame.channel(), self.channel);

        if self.is_complete() || frame.sequence() != self.next_sequence {
            return Err(ReassemblyError::InvalidSequence {
                expected: (!self.is_complete()).then_some(self.next_sequence),
                got: frame.sequence(),
            });
        }

        let take = self.remaining().min(frame.data().len());
        self.buf.extend_from_slice(&frame.data()[..take]);
        self.next_sequence += 1;
        self.last_frame = now;
        Ok(())
    }

    /// Fail with [`ReassemblyError::Timeout`] if no frame arrived for longer
    /// than `timeout`.
    pub fn check_timeout(&self, now: Instant, timeout: Duration) -> Result<(), ReassemblyError> {
        let elapsed = now.saturating_duration_since(self.last_frame);
        if elapsed > timeout {
            return Err(ReassemblyError::Timeout { elapsed });
        }
        Ok(())
    }

    /// All declared bytes have arrived.
    pub fn is_complete(&self) -> bool {
        self.buf.len() == self.declared
    }

    /// Finish the transaction.
    ///
    /// Returns `Err(self)` if bytes are still outstanding, so a partial
    /// message can never escape.
    pub fn into_message(self) -> Result<Message, Self> {
        if !self.is_complete() {
            return Err(self);
        }
        Ok(Message::new(self.channel, self.command, self.buf.freeze()))
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Full command byte of the message being received.
    pub fn command(&self) -> u8 {
        self.command
    }

    pub fn declared_len(&self) -> usize {
        self.declared
    }

    pub fn received(&self) -> usize {
        self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.declared - self.buf.len()
    }

    pub fn expected_sequence(&self) -> u8 {
        self.next_sequence
    }

    pub fn last_frame(&self) -> Instant {
        self.last_frame
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use proptest::prelude::*;

    use super::*;
    use crate::codec::{decode_frame, encode_frame, Frame};
    use crate::command::{U2FHID_MSG, U2FHID_PING};
    use crate::segment::{frame_count, segment};

    fn cid() -> ChannelId {
        ChannelId::new(0x0000_0042)
    }

    /// Feed encoded-then-decoded frames through one transaction.
    fn reassemble(frames: impl IntoIterator<Item = Frame>) -> Result<Message, ReassemblyError> {
        let now = Instant::now();
        let mut txn: Option<Transaction> = None;
        for frame in frames {
            match decode_frame(&encode_frame(&frame)).unwrap() {
                Frame::Init(init) => txn = Some(Transaction::start(&init, now)?),
                Frame::Cont(cont) => txn
                    .as_mut()
                    .expect("continuation before init")
                    .push(&cont, now)?,
            }
        }
        Ok(txn
            .expect("no frames")
            .into_message()
            .expect("message incomplete"))
    }

    #[test]
    fn single_frame_message_is_complete_at_start() {
        let init = InitFrame::new(cid(), U2FHID_PING, 5, vec![1, 2, 3, 4, 5]).unwrap();
        let txn = Transaction::start(&init, Instant::now()).unwrap();
        assert!(txn.is_complete());
        let msg = txn.into_message().unwrap();
        assert_eq!(msg.payload.as_ref(), &[1, 2, 3, 4, 5]);
        assert_eq!(msg.command, U2FHID_PING);
    }

    #[test]
    fn init_payload_trimmed_to_declared_length() {
        let init = InitFrame::new(cid(), U2FHID_PING, 3, vec![9u8; 57]).unwrap();
        let msg = Transaction::start(&init, Instant::now())
            .unwrap()
            .into_message()
            .unwrap();
        assert_eq!(msg.payload.as_ref(), &[9, 9, 9]);
    }

    #[test]
    fn declared_length_over_maximum_rejected() {
        let init = InitFrame::new(cid(), U2FHID_MSG, 7610, Bytes::new()).unwrap();
        let err = Transaction::start(&init, Instant::now()).unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::InvalidLength {
                declared: 7610,
                max: 7609
            }
        );
        assert_eq!(err.error_code(), crate::ErrorCode::InvalidLen);
    }

    #[test]
    fn wrong_sequence_rejected() {
        let now = Instant::now();
        let init = InitFrame::new(cid(), U2FHID_MSG, 100, vec![0u8; 57]).unwrap();
        let mut txn = Transaction::start(&init, now).unwrap();

        let skipped = ContFrame::new(cid(), 1, vec![0u8; 43]).unwrap();
        let err = txn.push(&skipped, now).unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::InvalidSequence {
                expected: Some(0),
                got: 1
            }
        );
        assert_eq!(err.error_code(), crate::ErrorCode::InvalidSeq);
    }

    #[test]
    fn frame_after_completion_rejected() {
        let now = Instant::now();
        let init = InitFrame::new(cid(), U2FHID_MSG, 60, vec![0u8; 57]).unwrap();
        let mut txn = Transaction::start(&init, now).unwrap();
        txn.push(&ContFrame::new(cid(), 0, vec![1u8; 59]).unwrap(), now)
            .unwrap();
        assert!(txn.is_complete());
        assert_eq!(txn.received(), 60);

        let err = txn
            .push(&ContFrame::new(cid(), 1, vec![1u8; 59]).unwrap(), now)
            .unwrap_err();
        assert!(matches!(
            err,
            ReassemblyError::InvalidSequence { expected: None, .. }
        ));
    }

    #[test]
    fn incomplete_message_is_not_released() {
        let init = InitFrame::new(cid(), U2FHID_MSG, 200, vec![0u8; 57]).unwrap();
        let txn = Transaction::start(&init, Instant::now()).unwrap();
        let txn = txn.into_message().unwrap_err();
        assert_eq!(txn.received(), 57);
        assert_eq!(txn.declared_len(), 200);
        assert_eq!(txn.expected_sequence(), 0);
    }

    #[test]
    fn timeout_measured_from_last_frame() {
        let start = Instant::now();
        let timeout = Duration::from_millis(3000);
        let init = InitFrame::new(cid(), U2FHID_MSG, 200, vec![0u8; 57]).unwrap();
        let mut txn = Transaction::start(&init, start).unwrap();

        let later = start + Duration::from_millis(2500);
        txn.push(&ContFrame::new(cid(), 0, vec![0u8; 59]).unwrap(), later)
            .unwrap();
        assert_eq!(txn.last_frame(), later);

        assert!(txn.check_timeout(start + Duration::from_millis(5000), timeout).is_ok());
        let err = txn
            .check_timeout(start + Duration::from_millis(5501), timeout)
            .unwrap_err();
        assert_eq!(err.error_code(), crate::ErrorCode::MsgTimeout);
    }

    #[test]
    fn interleaved_channels_stay_isolated() {
        let a = ChannelId::new(0xA);
        let b = ChannelId::new(0xB);
        let payload_a: Vec<u8> = (0..200).map(|i| i as u8).collect();
        let payload_b: Vec<u8> = (0..150).map(|i| 255 - i as u8).collect();

        let frames_a: Vec<Frame> = segment(a, U2FHID_MSG, payload_a.clone()).unwrap().collect();
        let frames_b: Vec<Frame> = segment(b, U2FHID_PING, payload_b.clone())
            .unwrap()
            .collect();

        let now = Instant::now();
        let mut txn_a: Option<Transaction> = None;
        let mut txn_b: Option<Transaction> = None;
        let mut wire = Vec::new();
        let mut ia = frames_a.into_iter();
        let mut ib = frames_b.into_iter();
        loop {
            match (ib.next(), ia.next()) {
                (None, None) => break,
                (fb, fa) => wire.extend(fb.into_iter().chain(fa)),
            }
        }

        for frame in wire {
            let slot = if frame.channel() == a { &mut txn_a } else { &mut txn_b };
            match frame {
                Frame::Init(init) => *slot = Some(Transaction::start(&init, now).unwrap()),
                Frame::Cont(cont) => slot.as_mut().unwrap().push(&cont, now).unwrap(),
            }
        }

        let msg_a = txn_a.unwrap().into_message().unwrap();
        let msg_b = txn_b.unwrap().into_message().unwrap();
        assert_eq!(msg_a.payload.as_ref(), payload_a.as_slice());
        assert_eq!(msg_b.payload.as_ref(), payload_b.as_slice());
        assert_eq!(msg_b.channel, b);
    }

    #[test]
    fn round_trip_boundaries() {
        for len in [0, 1, 56, 57, 58, 115, 116, 117, 7550, 7551, 7608, 7609] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let frames: Vec<Frame> = segment(cid(), U2FHID_MSG, payload.clone()).unwrap().collect();
            assert_eq!(frames.len(), frame_count(len), "len {len}");
            let msg = reassemble(frames).unwrap();
            assert_eq!(msg.payload.as_ref(), payload.as_slice(), "len {len}");
        }
    }

    proptest! {
        /// Property: segmentation followed by reassembly reproduces the payload.
        #[test]
        fn prop_segment_reassemble_roundtrip(
            payload in proptest::collection::vec(any::<u8>(), 0..=MAX_MESSAGE_SIZE),
            command in 0x80u8..=0xFFu8,
        ) {
            let frames: Vec<Frame> = segment(cid(), command, payload.clone()).unwrap().collect();
            prop_assert_eq!(frames.len(), frame_count(payload.len()));

            let msg = reassemble(frames).unwrap();
            prop_assert_eq!(msg.command, command);
            prop_assert_eq!(msg.channel, cid());
            prop_assert_eq!(msg.payload.as_ref(), payload.as_slice());
        }

        /// Property: any sequence number other than the expected one is rejected.
        #[test]
        fn prop_wrong_sequence_always_rejected(got in 1u8..=0x7F) {
            let init = InitFrame::new(cid(), U2FHID_MSG, 7609, vec![0u8; 57]).unwrap();
            let mut txn = Transaction::start(&init, Instant::now()).unwrap();
            let cont = ContFrame::new(cid(), got, vec![0u8; 59]).unwrap();
            let err = txn.push(&cont, Instant::now()).unwrap_err();
            prop_assert_eq!(err.error_code(), crate::ErrorCode::InvalidSeq);
        }
    }
}
