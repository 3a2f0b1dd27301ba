use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use u2fhid_frame::command::U2FHID_MSG;
use u2fhid_frame::status::{split_status, status_name};
use u2fhid_frame::{encode_frame, Frame};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One frame as shown to the user.
#[derive(Debug, Serialize)]
pub struct FrameOutput {
    pub index: usize,
    pub kind: &'static str,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u8>,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl FrameOutput {
    pub fn new(index: usize, frame: &Frame) -> Self {
        let (command, length, sequence, data) = match frame {
            Frame::Init(init) => {
                let shown = usize::from(init.length()).min(init.data().len());
                (
                    Some(format!("{:#04x} {}", init.command(), frame.kind())),
                    Some(init.length()),
                    None,
                    &init.data()[..shown],
                )
            }
            Frame::Cont(cont) => (None, None, Some(cont.sequence()), &cont.data()[..]),
        };

        // Only a complete single-frame MSG can be read as a response APDU.
        let status = match frame {
            Frame::Init(init)
                if init.command() == U2FHID_MSG && usize::from(init.length()) == data.len() =>
            {
                split_status(data).map(|(_, sw)| format!("{sw:#06x} {}", status_name(sw)))
            }
            _ => None,
        };

        Self {
            index,
            kind: if frame.is_init() { "init" } else { "cont" },
            channel: frame.channel().to_string(),
            command,
            length,
            sequence,
            data: hex::encode(data),
            status,
        }
    }
}

pub fn print_frames(frames: &[Frame], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for (index, frame) in frames.iter().enumerate() {
                let out = FrameOutput::new(index, frame);
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "CHANNEL", "FRAME", "LEN/SEQ", "DATA"]);
            for (index, frame) in frames.iter().enumerate() {
                let out = FrameOutput::new(index, frame);
                let position = match (out.length, out.sequence) {
                    (Some(len), _) => format!("len={len}"),
                    (_, Some(seq)) => format!("seq={seq}"),
                    _ => String::new(),
                };
                table.add_row(vec![
                    out.index.to_string(),
                    out.channel,
                    out.command.unwrap_or_else(|| "CONT".to_string()),
                    position,
                    preview(&out.data),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (index, frame) in frames.iter().enumerate() {
                let out = FrameOutput::new(index, frame);
                match (out.command, out.length, out.sequence) {
                    (Some(command), Some(len), _) => println!(
                        "[{index}] {} INIT cmd={command} len={len} data={}",
                        out.channel,
                        preview(&out.data)
                    ),
                    (_, _, Some(seq)) => println!(
                        "[{index}] {} CONT seq={seq} data={}",
                        out.channel,
                        preview(&out.data)
                    ),
                    _ => {}
                }
                if let Some(status) = out.status {
                    println!("    status={status}");
                }
            }
        }
        OutputFormat::Raw => {
            let mut bytes = Vec::with_capacity(frames.len() * u2fhid_frame::REPORT_SIZE);
            for frame in frames {
                bytes.extend_from_slice(&encode_frame(frame));
            }
            print_raw(&bytes);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn preview(hex: &str) -> String {
    const MAX: usize = 48;
    if hex.len() <= MAX {
        return hex.to_string();
    }
    format!("{}… ({} bytes)", &hex[..MAX], hex.len() / 2)
}
