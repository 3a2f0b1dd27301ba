use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};
use u2fhid_frame::{FrameError, Message, ReportReader, ReportWriter};

use crate::clock::Clock;
use crate::device::U2fHidDevice;
use crate::error::Result;
use crate::handler::CommandHandler;

/// Counters for one serve session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub reports_in: u64,
    pub messages_out: u64,
    pub timeouts_swept: u64,
}

/// Run the sequential processing path until the host disconnects or
/// `running` is cleared.
///
/// Each report is processed to completion, and its responses written with
/// pacing, before the next one is read. A read timeout is the tick for the
/// idle-transaction sweep, so configure `read_timeout` on the reader for
/// `running` to be observed promptly.
///
/// Transport errors reset the device (session loss) and are returned.
pub fn serve<R, W, H, C>(
    reader: &mut ReportReader<R>,
    writer: &mut ReportWriter<W>,
    device: &mut U2fHidDevice<H, C>,
    running: &AtomicBool,
) -> Result<ServeStats>
where
    R: Read,
    W: Write,
    H: CommandHandler,
    C: Clock,
{
    let mut stats = ServeStats::default();

    while running.load(Ordering::SeqCst) {
        let responses = match reader.read_frame() {
            Ok(frame) => {
                stats.reports_in += 1;
                device.process_frame(frame)
            }
            Err(FrameError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                let expired = device.expire_transactions();
                stats.timeouts_swept += expired.len() as u64;
                expired
            }
            Err(FrameError::ConnectionClosed) => {
                info!(?stats, "host disconnected");
                device.reset();
                return Ok(stats);
            }
            Err(err) => {
                device.reset();
                return Err(err.into());
            }
        };

        if let Err(err) = send_all(writer, &responses) {
            device.reset();
            return Err(err.into());
        }
        stats.messages_out += responses.len() as u64;
    }

    debug!(?stats, "serve loop stopped");
    Ok(stats)
}

fn send_all<W: Write>(
    writer: &mut ReportWriter<W>,
    responses: &[Message],
) -> u2fhid_frame::Result<()> {
    for response in responses {
        writer.send_message(response)?;
    }
    Ok(())
}
