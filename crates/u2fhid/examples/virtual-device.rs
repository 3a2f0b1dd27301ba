//! Virtual device on a Unix socket, driven by a host thread in the same process.
//!
//! Run with:
//!   cargo run --example virtual-device
//!
//! The host allocates a channel, pings it, and sends one MSG. The device's
//! handler upper-cases whatever it receives.

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::fs;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Instant;

    use u2fhid::device::{CommandHandler, DeviceConfig, DeviceListener, HandlerError, U2fHidDevice};
    use u2fhid::frame::command::{U2FHID_INIT, U2FHID_MSG, U2FHID_PING};
    use u2fhid::frame::{
        ChannelId, Frame, FrameConfig, Message, ReportReader, ReportWriter, Transaction,
    };
    use u2fhid::transport::UnixDomainSocket;

    struct Shout;

    impl CommandHandler for Shout {
        fn handle_msg(
            &mut self,
            _channel: ChannelId,
            request: &[u8],
        ) -> Result<Vec<u8>, HandlerError> {
            Ok(request.to_ascii_uppercase())
        }
    }

    fn recv(
        reader: &mut ReportReader<u2fhid::transport::HidStream>,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        let mut txn: Option<Transaction> = None;
        loop {
            match reader.read_frame()? {
                Frame::Init(init) => txn = Some(Transaction::start(&init, Instant::now())?),
                Frame::Cont(cont) => match txn.as_mut() {
                    Some(t) => t.push(&cont, Instant::now())?,
                    None => return Err("continuation without init".into()),
                },
            }
            if let Some(t) = txn.take() {
                match t.into_message() {
                    Ok(message) => return Ok(message),
                    Err(pending) => txn = Some(pending),
                }
            }
        }
    }

    let sock_dir = std::env::temp_dir().join(format!("u2fhid-virtual-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("device.sock");
    let _ = fs::remove_file(&sock_path);

    let listener = DeviceListener::bind(&sock_path)?.with_frame_config(FrameConfig::default());
    eprintln!("Device listening on {}", sock_path.display());

    let device_thread = thread::spawn(move || -> Result<(), String> {
        let mut device = U2fHidDevice::new(Shout, DeviceConfig::default());
        let running = AtomicBool::new(true);
        let mut conn = listener.accept().map_err(|e| e.to_string())?;
        let stats = conn.serve(&mut device, &running).map_err(|e| e.to_string())?;
        eprintln!(
            "[device] session ended: {} reports in, {} messages out",
            stats.reports_in, stats.messages_out
        );
        Ok(())
    });

    let stream = UnixDomainSocket::connect(&sock_path)?;
    let mut reader = ReportReader::new(stream.try_clone()?);
    let mut writer = ReportWriter::new(stream);

    let nonce = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];
    writer.send_message(&Message::new(ChannelId::BROADCAST, U2FHID_INIT, nonce.to_vec()))?;
    let init = recv(&mut reader)?;
    let cid = ChannelId::from_be_bytes([
        init.payload[8],
        init.payload[9],
        init.payload[10],
        init.payload[11],
    ]);
    eprintln!(
        "[host] allocated {cid}, device version {}.{}.{}",
        init.payload[13], init.payload[14], init.payload[15]
    );

    let ping: Vec<u8> = (0..150u8).collect();
    writer.send_message(&Message::new(cid, U2FHID_PING, ping.clone()))?;
    let echoed = recv(&mut reader)?;
    eprintln!(
        "[host] ping of {} bytes echoed intact: {}",
        ping.len(),
        echoed.payload.as_ref() == &ping[..]
    );

    writer.send_message(&Message::new(cid, U2FHID_MSG, b"hello, key".to_vec()))?;
    let reply = recv(&mut reader)?;
    let text = String::from_utf8_lossy(&reply.payload);
    eprintln!("[host] msg reply: {text}");

    drop(writer);
    drop(reader);
    device_thread
        .join()
        .map_err(|_| "device thread panicked")??;

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("virtual-device needs Unix domain sockets");
}
