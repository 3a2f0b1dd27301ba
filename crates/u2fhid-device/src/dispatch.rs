//! Command dispatch for completed messages.

use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{info, warn};
use u2fhid_frame::command::{
    CAPFLAG_WINK, INIT_NONCE_SIZE, INIT_RESPONSE_SIZE, U2FHID_IF_VERSION, U2FHID_INIT,
    U2FHID_LOCK, U2FHID_MSG, U2FHID_PING, U2FHID_SYNC, U2FHID_WINK,
};
use u2fhid_frame::{ChannelId, Command, ErrorCode, Message, MAX_MESSAGE_SIZE};

use crate::config::DeviceConfig;
use crate::handler::CommandHandler;
use crate::registry::ChannelRegistry;

/// Everything a command may touch while it runs.
pub(crate) struct Dispatch<'a, H> {
    pub registry: &'a mut ChannelRegistry,
    pub handler: &'a mut H,
    pub config: &'a DeviceConfig,
    pub now: Instant,
}

/// Capability flags advertised for `handler`.
pub(crate) fn capabilities<H: CommandHandler>(handler: &H) -> u8 {
    if handler.supports_wink() {
        CAPFLAG_WINK
    } else {
        0
    }
}

impl<H: CommandHandler> Dispatch<'_, H> {
    /// Produce the single response for a complete message.
    pub(crate) fn run(self, message: Message) -> Message {
        let channel = message.channel;
        let command = message.kind();
        match self.execute(command, channel, &message.payload) {
            Ok(response) => response,
            Err(code) => {
                warn!(%channel, command = command.name(), error = code.name(), "command rejected");
                Message::error(channel, code)
            }
        }
    }

    fn execute(
        self,
        command: Command,
        channel: ChannelId,
        payload: &Bytes,
    ) -> Result<Message, ErrorCode> {
        match command {
            Command::Ping => Ok(Message::new(channel, U2FHID_PING, payload.clone())),
            Command::Msg => self.msg(channel, payload),
            Command::Lock => self.lock(channel, payload),
            Command::Init => self.init(channel, payload),
            Command::Wink => self.wink(channel, payload),
            Command::Sync => sync(channel, payload),
            Command::Vendor(byte) => self.vendor(channel, byte, payload),
            Command::Error | Command::Unknown(_) => Err(ErrorCode::InvalidCmd),
        }
    }

    fn init(self, channel: ChannelId, nonce: &Bytes) -> Result<Message, ErrorCode> {
        if !channel.is_broadcast() {
            return Err(ErrorCode::InvalidCmd);
        }
        if nonce.len() != INIT_NONCE_SIZE {
            return Err(ErrorCode::InvalidLen);
        }

        let allocated = match self.registry.allocate(self.now) {
            Ok(allocated) => allocated,
            Err(err) => {
                warn!(error = %err, "channel allocation failed");
                return Err(ErrorCode::Other);
            }
        };

        let version = self.config.version;
        let mut body = BytesMut::with_capacity(INIT_RESPONSE_SIZE);
        body.put_slice(nonce);
        body.put_u32(allocated.get());
        body.put_u8(U2FHID_IF_VERSION);
        body.put_u8(version.major);
        body.put_u8(version.minor);
        body.put_u8(version.build);
        body.put_u8(capabilities(self.handler));

        Ok(Message::new(channel, U2FHID_INIT, body.freeze()))
    }

    fn msg(self, channel: ChannelId, request: &Bytes) -> Result<Message, ErrorCode> {
        let response = match self.handler.handle_msg(channel, request) {
            Ok(response) => response,
            Err(err) => {
                warn!(%channel, error = %err, "message handler failed");
                return Err(ErrorCode::Other);
            }
        };
        respond(channel, U2FHID_MSG, response)
    }

    fn lock(self, channel: ChannelId, payload: &Bytes) -> Result<Message, ErrorCode> {
        let [seconds] = payload.as_ref() else {
            return Err(ErrorCode::InvalidLen);
        };
        let duration = Duration::from_secs(u64::from(*seconds));
        if duration > self.config.max_lock_duration {
            return Err(ErrorCode::InvalidPar);
        }

        if duration.is_zero() {
            self.registry.release_lock(channel);
        } else {
            self.registry.set_lock(channel, duration, self.now);
        }
        Ok(Message::new(channel, U2FHID_LOCK, Bytes::new()))
    }

    fn wink(self, channel: ChannelId, payload: &Bytes) -> Result<Message, ErrorCode> {
        if !payload.is_empty() {
            return Err(ErrorCode::InvalidLen);
        }
        if !self.handler.supports_wink() {
            return Err(ErrorCode::InvalidCmd);
        }
        if let Err(err) = self.handler.wink(channel) {
            warn!(%channel, error = %err, "wink failed");
            return Err(ErrorCode::Other);
        }
        info!(%channel, "wink");
        Ok(Message::new(channel, U2FHID_WINK, Bytes::new()))
    }

    fn vendor(
        self,
        channel: ChannelId,
        command: u8,
        payload: &Bytes,
    ) -> Result<Message, ErrorCode> {
        match self.handler.handle_vendor(channel, command, payload) {
            None => Err(ErrorCode::InvalidCmd),
            Some(Err(err)) => {
                warn!(
                    %channel,
                    command = format_args!("{command:#04x}"),
                    error = %err,
                    "vendor handler failed"
                );
                Err(ErrorCode::Other)
            }
            Some(Ok(response)) => respond(channel, command, response),
        }
    }
}

fn sync(channel: ChannelId, payload: &Bytes) -> Result<Message, ErrorCode> {
    if payload.len() != 1 {
        return Err(ErrorCode::SyncFail);
    }
    Ok(Message::new(channel, U2FHID_SYNC, payload.clone()))
}

fn respond(channel: ChannelId, command: u8, body: Vec<u8>) -> Result<Message, ErrorCode> {
    if body.len() > MAX_MESSAGE_SIZE {
        warn!(%channel, len = body.len(), "response exceeds maximum message size");
        return Err(ErrorCode::Other);
    }
    Ok(Message::new(channel, command, body))
}
