use u2fhid_frame::decode_frame;

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frames, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let report = parse_hex(&args.report)?;
    let frame = decode_frame(&report).map_err(|err| frame_error("decode failed", err))?;
    print_frames(&[frame], format);
    Ok(SUCCESS)
}
