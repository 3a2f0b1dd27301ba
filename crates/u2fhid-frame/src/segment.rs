//! Outbound message segmentation.
//!
//! A [`Segmenter`] is a one-shot iterator: it yields the Init frame, then the
//! Continuation frames in sequence order, and is spent afterwards. Resending
//! a message means segmenting it again.
//!
//! The segmenter declares how far apart frames must be put on the wire but
//! never waits itself; [`crate::ReportWriter`] honors the interval.

use std::time::Duration;

use bytes::Bytes;

use crate::channel::ChannelId;
use crate::codec::{
    ContFrame, Frame, InitFrame, CONT_DATA_SIZE, DEFAULT_FRAME_INTERVAL, INIT_DATA_SIZE,
    MAX_MESSAGE_SIZE,
};
use crate::error::{FrameError, Result};

/// Number of frames needed for a message of `len` bytes.
pub fn frame_count(len: usize) -> usize {
    1 + len.saturating_sub(INIT_DATA_SIZE).div_ceil(CONT_DATA_SIZE)
}

/// Split `payload` into frames for `channel`.
///
/// Fails before producing anything if the payload exceeds [`MAX_MESSAGE_SIZE`].
pub fn segment(channel: ChannelId, command: u8, payload: impl Into<Bytes>) -> Result<Segmenter> {
    let payload = payload.into();
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(Segmenter {
        channel,
        command,
        payload,
        offset: 0,
        next_sequence: 0,
        started: false,
        interval: DEFAULT_FRAME_INTERVAL,
    })
}

/// Lazy frame sequence for one outbound message.
#[derive(Debug)]
pub struct Segmenter {
    channel: ChannelId,
    command: u8,
    payload: Bytes,
    offset: usize,
    next_sequence: u8,
    started: bool,
    interval: Duration,
}

impl Segmenter {
    /// Override the declared inter-frame interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Minimum gap the caller must leave between two emitted frames.
    pub fn min_interval(&self) -> Duration {
        self.interval
    }

    /// Total frames this message produces.
    pub fn total_frames(&self) -> usize {
        frame_count(self.payload.len())
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    fn remaining_frames(&self) -> usize {
        if !self.started {
            return self.total_frames();
        }
        (self.payload.len() - self.offset).div_ceil(CONT_DATA_SIZE)
    }
}

impl Iterator for Segmenter {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if !self.started {
            self.started = true;
            let take = self.payload.len().min(INIT_DATA_SIZE);
            self.offset = take;
            // Length fits: payload.len() <= MAX_MESSAGE_SIZE < u16::MAX.
            let init = InitFrame::new(
                self.channel,
                self.command,
                self.payload.len() as u16,
                self.payload.slice(..take),
            )
            .ok()?;
            return Some(Frame::Init(init));
        }

        if self.offset >= self.payload.len() {
            return None;
        }

        let end = (self.offset + CONT_DATA_SIZE).min(self.payload.len());
        let cont = ContFrame::new(
            self.channel,
            self.next_sequence,
            self.payload.slice(self.offset..end),
        )
        .ok()?;
        self.offset = end;
        self.next_sequence += 1;
        Some(Frame::Cont(cont))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining_frames();
        (n, Some(n))
    }
}

impl ExactSizeIterator for Segmenter {}
