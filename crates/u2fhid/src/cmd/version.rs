use serde::Serialize;
use u2fhid_frame::command::U2FHID_IF_VERSION;
use u2fhid_frame::MAX_MESSAGE_SIZE;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    os: &'static str,
    arch: &'static str,
    rustc: &'static str,
    git_hash: &'static str,
    interface_version: u8,
    max_message_size: usize,
}

pub fn run(args: VersionArgs, format: OutputFormat) -> CliResult<i32> {
    if !args.extended {
        println!("u2fhid {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let out = VersionOutput {
        name: "u2fhid",
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("U2FHID_BUILD_TARGET").unwrap_or("unknown"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        rustc: option_env!("RUSTC_VERSION").unwrap_or("unknown"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        interface_version: U2FHID_IF_VERSION,
        max_message_size: MAX_MESSAGE_SIZE,
    };

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        ),
        _ => {
            println!("name: {}", out.name);
            println!("version: {}", out.version);
            println!("target: {}", out.target);
            println!("target_os: {}", out.os);
            println!("target_arch: {}", out.arch);
            println!("rustc: {}", out.rustc);
            println!("git_hash: {}", out.git_hash);
            println!("interface_version: {}", out.interface_version);
            println!("max_message_size: {}", out.max_message_size);
        }
    }

    Ok(SUCCESS)
}
