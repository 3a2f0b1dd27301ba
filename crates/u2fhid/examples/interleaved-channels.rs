//! Two hosts interleaving frames on one device, without any socket.
//!
//! Run with:
//!   cargo run --example interleaved-channels
//!
//! Reports are fed straight into the device, alternating between two
//! channels frame by frame. Each channel's message is reassembled on its own.

use u2fhid::device::{CommandHandler, DeviceConfig, HandlerError, U2fHidDevice};
use u2fhid::frame::command::{U2FHID_INIT, U2FHID_MSG};
use u2fhid::frame::{encode_frame, segment, ChannelId, Frame, Message};

struct Length;

impl CommandHandler for Length {
    fn handle_msg(&mut self, channel: ChannelId, request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        Ok(format!("{channel} sent {} bytes", request.len()).into_bytes())
    }
}

fn allocate(
    device: &mut U2fHidDevice<Length>,
    nonce: u8,
) -> Result<ChannelId, Box<dyn std::error::Error>> {
    let init = segment(ChannelId::BROADCAST, U2FHID_INIT, vec![nonce; 8])?
        .next()
        .ok_or("no init frame")?;
    let replies = device.process_report(&encode_frame(&init))?;
    let reply = replies.first().ok_or("no INIT reply")?;
    let raw: [u8; 4] = reply
        .payload
        .get(8..12)
        .ok_or("short INIT reply")?
        .try_into()?;
    Ok(ChannelId::from_be_bytes(raw))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut device = U2fHidDevice::new(Length, DeviceConfig::default()).with_seed(7);

    let alice = allocate(&mut device, 0xA1)?;
    let bob = allocate(&mut device, 0xB0)?;
    eprintln!("channels: alice={alice} bob={bob}");

    let a: Vec<Frame> = segment(alice, U2FHID_MSG, vec![b'a'; 300])?.collect();
    let b: Vec<Frame> = segment(bob, U2FHID_MSG, vec![b'b'; 120])?.collect();

    let mut replies: Vec<Message> = Vec::new();
    for i in 0..a.len().max(b.len()) {
        for frames in [&a, &b] {
            if let Some(frame) = frames.get(i) {
                replies.extend(device.process_report(&encode_frame(frame))?);
            }
        }
    }

    for reply in &replies {
        eprintln!(
            "{} -> {}",
            reply.channel,
            String::from_utf8_lossy(&reply.payload)
        );
    }
    Ok(())
}
