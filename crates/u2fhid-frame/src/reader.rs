use std::io::{ErrorKind, Read};

use u2fhid_transport::HidStream;

use crate::codec::{decode_frame, Frame, FrameConfig, Report, REPORT_SIZE};
use crate::error::{FrameError, Result};

/// Reads whole HID reports from any `Read` stream.
///
/// A read that times out part-way through a report keeps the bytes it has
/// already seen; the next call resumes the same report.
pub struct ReportReader<T> {
    inner: T,
    buf: Report,
    filled: usize,
    config: FrameConfig,
}

impl<T: Read> ReportReader<T> {
    /// Create a new report reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new report reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: [0u8; REPORT_SIZE],
            filled: 0,
            config,
        }
    }

    /// Read the next raw report (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` on EOF at a report
    /// boundary and `Err(FrameError::Malformed)` on EOF inside a report.
    /// Timeouts surface as `FrameError::Io` with `WouldBlock`/`TimedOut`.
    pub fn read_report(&mut self) -> Result<Report> {
        while self.filled < REPORT_SIZE {
            let read = match self.inner.read(&mut self.buf[self.filled..]) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                let len = std::mem::take(&mut self.filled);
                return Err(if len == 0 {
                    FrameError::ConnectionClosed
                } else {
                    FrameError::Malformed { len }
                });
            }

            self.filled += read;
        }

        self.filled = 0;
        Ok(self.buf)
    }

    /// Read and decode the next report (blocking).
    pub fn read_frame(&mut self) -> Result<Frame> {
        let report = self.read_report()?;
        decode_frame(&report)
    }

    /// Bytes of a partially received report.
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current report reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl ReportReader<HidStream> {
    /// Create a report reader for `HidStream` and apply read timeout from config.
    pub fn with_config_stream(inner: HidStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: u2fhid_transport::TransportError) -> FrameError {
    FrameError::Io(err.into_io())
}
