use std::path::Path;
use std::sync::atomic::AtomicBool;

use u2fhid_frame::{CancelHandle, FrameConfig, ReportReader, ReportWriter};
use u2fhid_transport::{HidStream, UnixDomainSocket};

use crate::clock::Clock;
use crate::device::U2fHidDevice;
use crate::error::Result;
use crate::handler::CommandHandler;
use crate::server::{serve, ServeStats};

/// Accepts host connections carrying raw 64-byte reports.
pub struct DeviceListener {
    socket: UnixDomainSocket,
    frame_config: FrameConfig,
}

impl DeviceListener {
    /// Bind to a Unix domain socket path.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let socket = UnixDomainSocket::bind(path)?;
        Ok(Self {
            socket,
            frame_config: FrameConfig::default(),
        })
    }

    /// Override timeouts and pacing for accepted connections.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Accept the next host connection.
    pub fn accept(&self) -> Result<HostConnection> {
        let stream = self.socket.accept()?;
        let reader_stream = stream.try_clone()?;

        let reader = ReportReader::with_config_stream(reader_stream, self.frame_config.clone())?;
        let writer = ReportWriter::with_config_stream(stream, self.frame_config.clone())?;
        Ok(HostConnection { reader, writer })
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}

/// One connected host.
pub struct HostConnection {
    reader: ReportReader<HidStream>,
    writer: ReportWriter<HidStream>,
}

impl HostConnection {
    /// Serve this host until it disconnects or `running` is cleared.
    pub fn serve<H: CommandHandler, C: Clock>(
        &mut self,
        device: &mut U2fHidDevice<H, C>,
        running: &AtomicBool,
    ) -> Result<ServeStats> {
        serve(&mut self.reader, &mut self.writer, device, running)
    }

    /// Handle that aborts paced output on this connection.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.writer.cancel_handle()
    }
}
