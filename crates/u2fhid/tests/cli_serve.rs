#![cfg(all(unix, feature = "cli"))]

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use u2fhid_frame::command::{U2FHID_INIT, U2FHID_MSG, U2FHID_PING};
use u2fhid_frame::{
    decode_frame, encode_frame, segment, ChannelId, ErrorCode, Frame, Message, Transaction,
    REPORT_SIZE,
};
use u2fhid_transport::{HidStream, UnixDomainSocket};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/u2fcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn spawn_device(sock_path: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_u2fhid"))
        .arg("--log-level")
        .arg("error")
        .arg("serve")
        .arg(sock_path)
        .arg("--poll")
        .arg("20ms")
        .arg("--frame-interval-us")
        .arg("0")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve command should start")
}

fn wait_for_connect(path: &Path, timeout: Duration) -> io::Result<HidStream> {
    let start = Instant::now();
    loop {
        match UnixDomainSocket::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                if start.elapsed() >= timeout {
                    return Err(io::Error::other(format!("connect timeout: {err}")));
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn send(host: &mut HidStream, channel: ChannelId, command: u8, payload: &[u8]) {
    for frame in segment(channel, command, payload.to_vec()).expect("payload fits") {
        host.write_all(&encode_frame(&frame)).expect("report should write");
    }
}

fn recv(host: &mut HidStream) -> Message {
    let now = Instant::now();
    let mut txn: Option<Transaction> = None;
    loop {
        let mut report = [0u8; REPORT_SIZE];
        host.read_exact(&mut report).expect("report should arrive");
        match decode_frame(&report).expect("device sends whole reports") {
            Frame::Init(init) => txn = Some(Transaction::start(&init, now).expect("valid init")),
            Frame::Cont(cont) => txn
                .as_mut()
                .expect("init before continuation")
                .push(&cont, now)
                .expect("continuation in sequence"),
        }
        if txn.as_ref().is_some_and(Transaction::is_complete) {
            return txn
                .take()
                .expect("transaction present")
                .into_message()
                .expect("message complete");
        }
    }
}

fn allocate(host: &mut HidStream, nonce: [u8; 8]) -> ChannelId {
    send(host, ChannelId::BROADCAST, U2FHID_INIT, &nonce);
    let resp = recv(host);
    assert_eq!(resp.channel, ChannelId::BROADCAST);
    assert_eq!(resp.command, U2FHID_INIT);
    assert_eq!(resp.payload.len(), 17);
    assert_eq!(&resp.payload[..8], &nonce);
    assert_eq!(resp.payload[12], 2, "interface version");
    let raw: [u8; 4] = resp.payload[8..12].try_into().expect("four id bytes");
    ChannelId::from_be_bytes(raw)
}

#[test]
fn serve_allocates_and_echoes_over_socket() {
    let dir = unique_temp_dir("serve");
    let sock_path = dir.join("device.sock");
    let mut child = spawn_device(&sock_path);

    let mut host =
        wait_for_connect(&sock_path, Duration::from_secs(3)).expect("host should connect");
    host.set_read_timeout(Some(Duration::from_secs(3)))
        .expect("read timeout should apply");

    let cid = allocate(&mut host, [1, 2, 3, 4, 5, 6, 7, 8]);
    assert!(cid.is_allocatable());

    let payload: Vec<u8> = (0..200u8).collect();
    send(&mut host, cid, U2FHID_PING, &payload);
    let echoed = recv(&mut host);
    assert_eq!(echoed.channel, cid);
    assert_eq!(echoed.command, U2FHID_PING);
    assert_eq!(echoed.payload.as_ref(), &payload[..]);

    send(&mut host, cid, U2FHID_MSG, &[0x00, 0x03, 0x00, 0x00]);
    let version = recv(&mut host);
    assert_eq!(version.command, U2FHID_MSG);
    assert_eq!(version.payload.as_ref(), b"U2F_V2\x90\x00");

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_reports_protocol_errors_and_keeps_going() {
    let dir = unique_temp_dir("errors");
    let sock_path = dir.join("device.sock");
    let mut child = spawn_device(&sock_path);

    let mut host =
        wait_for_connect(&sock_path, Duration::from_secs(3)).expect("host should connect");
    host.set_read_timeout(Some(Duration::from_secs(3)))
        .expect("read timeout should apply");

    send(&mut host, ChannelId::new(0x0BAD_0BAD), U2FHID_PING, b"hi");
    let resp = recv(&mut host);
    assert_eq!(resp.channel, ChannelId::new(0x0BAD_0BAD));
    assert_eq!(resp.error_code(), Some(ErrorCode::Other));

    let cid = allocate(&mut host, [8; 8]);
    let frames: Vec<Frame> = segment(cid, U2FHID_PING, vec![0u8; 200])
        .expect("payload fits")
        .collect();
    host.write_all(&encode_frame(&frames[0])).expect("init should write");
    host.write_all(&encode_frame(&frames[2])).expect("cont should write");
    let resp = recv(&mut host);
    assert_eq!(resp.channel, cid);
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidSeq));

    send(&mut host, cid, U2FHID_PING, b"still alive");
    assert_eq!(recv(&mut host).payload.as_ref(), b"still alive");

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_times_out_stalled_message() {
    let dir = unique_temp_dir("timeout");
    let sock_path = dir.join("device.sock");
    let mut child = Command::new(env!("CARGO_BIN_EXE_u2fhid"))
        .arg("--log-level")
        .arg("error")
        .arg("serve")
        .arg(&sock_path)
        .arg("--poll")
        .arg("20ms")
        .arg("--transaction-timeout")
        .arg("200ms")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve command should start");

    let mut host =
        wait_for_connect(&sock_path, Duration::from_secs(3)).expect("host should connect");
    host.set_read_timeout(Some(Duration::from_secs(3)))
        .expect("read timeout should apply");

    let cid = allocate(&mut host, [3; 8]);
    let first = segment(cid, U2FHID_PING, vec![0u8; 100])
        .expect("payload fits")
        .next()
        .expect("init frame");
    host.write_all(&encode_frame(&first)).expect("init should write");

    let resp = recv(&mut host);
    assert_eq!(resp.channel, cid);
    assert_eq!(resp.error_code(), Some(ErrorCode::MsgTimeout));

    let _ = child.kill();
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(&dir);
}
