use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use u2fhid_frame::{ChannelId, Command as U2fCommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod segment;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a virtual U2FHID device on a Unix socket.
    Serve(ServeArgs),
    /// Decode one 64-byte report given as hex.
    Decode(DecodeArgs),
    /// Split a message into reports and print them.
    Segment(SegmentArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Segment(args) => segment::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Housekeeping tick: how often idle transactions are checked (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub poll: String,
    /// Transaction timeout between frames of one message.
    #[arg(long, default_value = "3000ms")]
    pub transaction_timeout: String,
    /// Minimum gap between outbound reports, in microseconds.
    #[arg(long, default_value_t = 2500)]
    pub frame_interval_us: u64,
    /// Maximum number of live channels.
    #[arg(long, default_value_t = u2fhid_device::config::DEFAULT_MAX_CHANNELS)]
    pub max_channels: usize,
    /// Advertise and accept WINK.
    #[arg(long)]
    pub wink: bool,
    /// Exit after the first host disconnects.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Report bytes as hex; spaces and colons are ignored.
    pub report: String,
}

#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// Command name (ping, msg, lock, init, wink, sync, error) or byte (e.g. 0x83).
    #[arg(long, short = 'c', value_parser = parse_command)]
    pub command: u8,
    /// Channel id (e.g. 0xffffffff).
    #[arg(long, default_value = "0xffffffff", value_parser = parse_channel)]
    pub channel: ChannelId,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub(crate) fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned).map_err(|err| CliError::new(USAGE, format!("invalid hex: {err}")))
}

fn parse_byte(input: &str) -> Result<u8, String> {
    let parsed = match input.strip_prefix("0x").or(input.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid byte {input:?}: {err}"))
}

fn parse_command(input: &str) -> Result<u8, String> {
    let named = match input.to_ascii_lowercase().as_str() {
        "ping" => Some(U2fCommand::Ping),
        "msg" => Some(U2fCommand::Msg),
        "lock" => Some(U2fCommand::Lock),
        "init" => Some(U2fCommand::Init),
        "wink" => Some(U2fCommand::Wink),
        "sync" => Some(U2fCommand::Sync),
        "error" => Some(U2fCommand::Error),
        _ => None,
    };
    match named {
        Some(command) => Ok(command.to_byte()),
        None => parse_byte(input),
    }
}

fn parse_channel(input: &str) -> Result<ChannelId, String> {
    let parsed = match input.strip_prefix("0x").or(input.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed
        .map(ChannelId::new)
        .map_err(|err| format!("invalid channel id {input:?}: {err}"))
}
