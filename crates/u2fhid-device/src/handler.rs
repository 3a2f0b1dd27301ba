use u2fhid_frame::ChannelId;

use crate::error::HandlerError;

/// Application side of the device.
///
/// The transport core handles PING, INIT, LOCK and SYNC itself; everything
/// that needs application knowledge comes through here.
pub trait CommandHandler {
    /// Handle an encapsulated U2F request (MSG).
    ///
    /// The response bytes, status word included, go back to the host
    /// unchanged. An `Err` is reported as `ERR_OTHER`.
    fn handle_msg(&mut self, channel: ChannelId, request: &[u8]) -> Result<Vec<u8>, HandlerError>;

    /// Whether WINK is available; sets `CAPFLAG_WINK` in the INIT response.
    fn supports_wink(&self) -> bool {
        false
    }

    /// Perform a user-visible identification action.
    fn wink(&mut self, _channel: ChannelId) -> Result<(), HandlerError> {
        Err(HandlerError::Unsupported)
    }

    /// Handle a vendor command (`0xC0..=0xFF`).
    ///
    /// `None` declines the command.
    fn handle_vendor(
        &mut self,
        _channel: ChannelId,
        _command: u8,
        _payload: &[u8],
    ) -> Option<Result<Vec<u8>, HandlerError>> {
        None
    }
}

impl<H: CommandHandler + ?Sized> CommandHandler for Box<H> {
    fn handle_msg(&mut self, channel: ChannelId, request: &[u8]) -> Result<Vec<u8>, HandlerError> {
        (**self).handle_msg(channel, request)
    }

    fn supports_wink(&self) -> bool {
        (**self).supports_wink()
    }

    fn wink(&mut self, channel: ChannelId) -> Result<(), HandlerError> {
        (**self).wink(channel)
    }

    fn handle_vendor(
        &mut self,
        channel: ChannelId,
        command: u8,
        payload: &[u8],
    ) -> Option<Result<Vec<u8>, HandlerError>> {
        (**self).handle_vendor(channel, command, payload)
    }
}
