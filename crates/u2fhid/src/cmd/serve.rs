use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use u2fhid_device::{
    CommandHandler, DeviceConfig, DeviceListener, DeviceVersion, HandlerError, U2fHidDevice,
};
use u2fhid_frame::status::{SW_INS_NOT_SUPPORTED, SW_NO_ERROR, SW_WRONG_LENGTH};
use u2fhid_frame::{ChannelId, FrameConfig};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{device_error, CliError, CliResult, INTERNAL, SUCCESS};

/// U2F_VERSION instruction byte.
const INS_VERSION: u8 = 0x03;
const VERSION_STRING: &[u8] = b"U2F_V2";

/// Answers only U2F_VERSION. Enough to exercise the transport end to end.
#[derive(Debug, Default)]
pub struct VersionOnlyHandler {
    wink: bool,
}

impl CommandHandler for VersionOnlyHandler {
    fn handle_msg(&mut self, channel: ChannelId, request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        // CLA INS P1 P2 at minimum.
        let Some(&ins) = request.get(1).filter(|_| request.len() >= 4) else {
            return Ok(SW_WRONG_LENGTH.to_be_bytes().to_vec());
        };
        tracing::debug!(%channel, ins = format_args!("{ins:#04x}"), "apdu");

        if ins != INS_VERSION {
            return Ok(SW_INS_NOT_SUPPORTED.to_be_bytes().to_vec());
        }
        let mut response = VERSION_STRING.to_vec();
        response.extend_from_slice(&SW_NO_ERROR.to_be_bytes());
        Ok(response)
    }

    fn supports_wink(&self) -> bool {
        self.wink
    }

    fn wink(&mut self, channel: ChannelId) -> Result<(), HandlerError> {
        tracing::info!(%channel, "*wink*");
        Ok(())
    }
}

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let frame_config = FrameConfig {
        read_timeout: Some(parse_duration(&args.poll)?),
        write_timeout: Some(Duration::from_secs(5)),
        frame_interval: Duration::from_micros(args.frame_interval_us),
    };
    let config = DeviceConfig {
        transaction_timeout: parse_duration(&args.transaction_timeout)?,
        max_channels: args.max_channels,
        version: package_version(),
        ..DeviceConfig::default()
    };

    let listener = DeviceListener::bind(&args.path)
        .map_err(|err| device_error("bind failed", err))?
        .with_frame_config(frame_config);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut device = U2fHidDevice::new(VersionOnlyHandler { wink: args.wink }, config);
    tracing::info!(path = %listener.path().display(), "virtual device listening");

    while running.load(Ordering::SeqCst) {
        let mut conn = listener
            .accept()
            .map_err(|err| device_error("accept failed", err))?;
        tracing::info!("host connected");

        match conn.serve(&mut device, &running) {
            Ok(stats) => tracing::info!(
                reports = stats.reports_in,
                responses = stats.messages_out,
                "host session ended"
            ),
            Err(err) => tracing::warn!(error = %err, "host session lost"),
        }

        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

fn package_version() -> DeviceVersion {
    let part = |s: &str| s.parse::<u8>().unwrap_or(0);
    DeviceVersion::new(
        part(env!("CARGO_PKG_VERSION_MAJOR")),
        part(env!("CARGO_PKG_VERSION_MINOR")),
        part(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
