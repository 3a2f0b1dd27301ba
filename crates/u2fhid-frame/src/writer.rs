use std::io::{ErrorKind, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use u2fhid_transport::HidStream;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::reader::transport_to_frame_error;

/// Shared flag that aborts paced transmission.
///
/// Clone it into whatever notices a transport reset; the writer checks it
/// before every frame.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop any transmission in progress and all later ones until [`reset`](Self::reset).
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Allow transmission again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Writes HID reports to any `Write` stream, pacing multi-frame messages.
pub struct ReportWriter<T> {
    inner: T,
    config: FrameConfig,
    cancel: CancelHandle,
}

impl<T: Write> ReportWriter<T> {
    /// Create a new report writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new report writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            cancel: CancelHandle::new(),
        }
    }

    /// Write a single frame as one 64-byte report (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let report = encode_frame(frame);

        let mut offset = 0usize;
        while offset < report.len() {
            match self.inner.write(&report[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Segment and write a whole message.
    ///
    /// Sleeps for the configured frame interval between frames, never after
    /// the last one. Returns the number of frames written.
    pub fn send_message(&mut self, message: &Message) -> Result<usize> {
        let pacing = self.config.frame_interval;
        let frames = message.segments()?.with_interval(pacing);
        let total = frames.len();
        let interval = frames.min_interval();

        for (sent, frame) in frames.enumerate() {
            if self.cancel.is_cancelled() {
                tracing::debug!(channel = %message.channel, sent, total, "transmission cancelled");
                return Err(FrameError::Cancelled { sent, total });
            }
            if sent > 0 && !interval.is_zero() {
                std::thread::sleep(interval);
            }
            self.write_frame(&frame)?;
        }

        tracing::debug!(
            channel = %message.channel,
            command = format_args!("{:#04x}", message.command),
            len = message.payload.len(),
            frames = total,
            "message sent"
        );
        Ok(total)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Handle that cancels paced transmission on this writer.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current report writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl ReportWriter<HidStream> {
    /// Create a report writer for `HidStream` and apply write timeout from config.
    pub fn with_config_stream(inner: HidStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
