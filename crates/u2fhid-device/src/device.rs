//! The device-side U2FHID state machine.
//!
//! Every inbound report goes through [`U2fHidDevice::process_frame`] in
//! arrival order. It returns the responses to send, in order; most frames
//! produce none, a completed message produces exactly one, and detected
//! timeouts add `ERR_MSG_TIMEOUT` responses in front of it.
//!
//! Each arrival also sweeps the other channels for stalled transactions, so
//! steady traffic on one channel cannot keep another's partial message alive.

use std::time::Instant;

use tracing::{debug, warn};
use u2fhid_frame::command::U2FHID_INIT;
use u2fhid_frame::{
    decode_frame, ChannelId, ContFrame, ErrorCode, Frame, InitFrame, Message, ReassemblyError,
    Transaction,
};

use crate::clock::{Clock, SystemClock};
use crate::config::DeviceConfig;
use crate::dispatch::{capabilities, Dispatch};
use crate::error::Result;
use crate::handler::CommandHandler;
use crate::registry::{ChannelRegistry, ChannelState};

/// A virtual U2FHID device: channel registry, reassembly and dispatch.
pub struct U2fHidDevice<H, C = SystemClock> {
    registry: ChannelRegistry,
    handler: H,
    clock: C,
    config: DeviceConfig,
}

impl<H: CommandHandler> U2fHidDevice<H> {
    /// Create a device on the system clock.
    pub fn new(handler: H, config: DeviceConfig) -> Self {
        Self::with_clock(handler, config, SystemClock)
    }
}

impl<H: CommandHandler, C: Clock> U2fHidDevice<H, C> {
    /// Create a device on an explicit clock.
    pub fn with_clock(handler: H, config: DeviceConfig, clock: C) -> Self {
        let registry = ChannelRegistry::new(config.max_channels, config.allocation_retries);
        Self {
            registry,
            handler,
            clock,
            config,
        }
    }

    /// Replace the registry with one whose channel ids follow `seed`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.registry = ChannelRegistry::with_seed(
            self.config.max_channels,
            self.config.allocation_retries,
            seed,
        );
        self
    }

    /// Decode and process one raw report.
    ///
    /// Fails only if `report` is not a whole report.
    pub fn process_report(&mut self, report: &[u8]) -> Result<Vec<Message>> {
        let frame = decode_frame(report)?;
        Ok(self.process_frame(frame))
    }

    /// Process one decoded frame and return the responses to send.
    pub fn process_frame(&mut self, frame: Frame) -> Vec<Message> {
        let now = self.clock.now();
        let channel = frame.channel();
        debug!(%channel, kind = frame.kind(), "frame received");

        // The arriving channel's own timeout is handled in `route`.
        let mut responses = self.sweep(now, Some(channel));
        responses.extend(self.route(frame, now));
        responses
    }

    /// Abort every transaction that has been idle past the timeout.
    ///
    /// Returns one `ERR_MSG_TIMEOUT` per aborted transaction.
    pub fn expire_transactions(&mut self) -> Vec<Message> {
        let now = self.clock.now();
        self.sweep(now, None)
    }

    fn sweep(&mut self, now: Instant, skip: Option<ChannelId>) -> Vec<Message> {
        let timeout = self.config.transaction_timeout;

        let mut responses = Vec::new();
        for state in self.registry.channels_mut() {
            if Some(state.id()) == skip {
                continue;
            }
            if let Some(err) = state
                .transaction()
                .and_then(|txn| txn.check_timeout(now, timeout).err())
            {
                state.take_transaction();
                responses.push(reject(state.id(), &err));
            }
        }
        responses
    }

    fn route(&mut self, frame: Frame, now: Instant) -> Vec<Message> {
        let channel = frame.channel();
        if let Some(holder) = self.registry.lock_holder(now) {
            if holder != channel {
                warn!(%channel, %holder, "channel busy, frame dropped");
                return Vec::new();
            }
        }

        if channel.is_broadcast() {
            return self.process_broadcast(frame, now);
        }

        let timeout = self.config.transaction_timeout;
        let Some(state) = self.registry.lookup(channel) else {
            warn!(%channel, "frame for unknown channel");
            return vec![Message::error(channel, ErrorCode::Other)];
        };

        let mut responses = Vec::new();
        if let Some(err) = state
            .transaction()
            .and_then(|txn| txn.check_timeout(now, timeout).err())
        {
            state.take_transaction();
            responses.push(reject(channel, &err));
            if !frame.is_init() {
                return responses;
            }
        }
        state.touch(now);

        let complete = match frame {
            Frame::Init(init) => start(state, &init, now),
            Frame::Cont(cont) => extend(state, &cont, now),
        };

        match complete {
            Ok(Some(message)) => responses.push(self.dispatch(message)),
            Ok(None) => {}
            Err(err) => responses.push(reject(channel, &err)),
        }
        responses
    }

    /// Forget all channels and the lock.
    pub fn reset(&mut self) {
        debug!(live = self.registry.len(), "device reset");
        self.registry.clear();
    }

    /// Capability flags reported by INIT.
    pub fn capabilities(&self) -> u8 {
        capabilities(&self.handler)
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ChannelRegistry {
        &mut self.registry
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Broadcast carries only single-frame INIT requests.
    fn process_broadcast(&mut self, frame: Frame, now: Instant) -> Vec<Message> {
        let channel = ChannelId::BROADCAST;
        let init = match frame {
            Frame::Init(init) if init.command() == U2FHID_INIT => init,
            Frame::Init(init) => {
                warn!(
                    command = format_args!("{:#04x}", init.command()),
                    "non-INIT command on broadcast channel"
                );
                return vec![Message::error(channel, ErrorCode::InvalidCmd)];
            }
            Frame::Cont(cont) => {
                warn!(
                    sequence = cont.sequence(),
                    "continuation on broadcast channel"
                );
                return vec![Message::error(channel, ErrorCode::InvalidSeq)];
            }
        };

        let message = match Transaction::start(&init, now).map(Transaction::into_message) {
            Ok(Ok(message)) => message,
            Ok(Err(_partial)) => return vec![Message::error(channel, ErrorCode::InvalidLen)],
            Err(err) => return vec![reject(channel, &err)],
        };
        vec![self.dispatch(message)]
    }

    fn dispatch(&mut self, message: Message) -> Message {
        debug!(
            channel = %message.channel,
            command = message.kind().name(),
            len = message.payload.len(),
            "message complete"
        );
        Dispatch {
            registry: &mut self.registry,
            handler: &mut self.handler,
            config: &self.config,
            now: self.clock.now(),
        }
        .run(message)
    }
}

impl<H, C> std::fmt::Debug for U2fHidDevice<H, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("U2fHidDevice")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Begin a message. A message already in progress is dropped silently.
fn start(
    state: &mut ChannelState,
    init: &InitFrame,
    now: Instant,
) -> std::result::Result<Option<Message>, ReassemblyError> {
    let txn = Transaction::start(init, now).inspect_err(|_| {
        state.take_transaction();
    })?;
    if let Some(previous) = state.begin(txn) {
        debug!(
            channel = %state.id(),
            received = previous.received(),
            declared = previous.declared_len(),
            "transaction restarted"
        );
    }
    Ok(finish(state))
}

fn extend(
    state: &mut ChannelState,
    cont: &ContFrame,
    now: Instant,
) -> std::result::Result<Option<Message>, ReassemblyError> {
    let Some(txn) = state.transaction_mut() else {
        return Err(ReassemblyError::InvalidSequence {
            expected: None,
            got: cont.sequence(),
        });
    };
    if let Err(err) = txn.push(cont, now) {
        state.take_transaction();
        return Err(err);
    }
    Ok(finish(state))
}

fn finish(state: &mut ChannelState) -> Option<Message> {
    if !state.transaction()?.is_complete() {
        return None;
    }
    state.take_transaction()?.into_message().ok()
}

fn reject(channel: ChannelId, err: &ReassemblyError) -> Message {
    let code = err.error_code();
    warn!(%channel, error = %err, code = code.name(), "reassembly failed");
    Message::error(channel, code)
}
