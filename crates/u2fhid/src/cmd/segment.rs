use std::fs;

use u2fhid_frame::{segment, Frame};

use crate::cmd::{parse_hex, SegmentArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_frames, OutputFormat};

pub fn run(args: SegmentArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let frames: Vec<Frame> = segment(args.channel, args.command, payload)
        .map_err(|err| frame_error("segment failed", err))?
        .collect();
    tracing::debug!(frames = frames.len(), channel = %args.channel, "segmented");
    print_frames(&frames, format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &SegmentArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
