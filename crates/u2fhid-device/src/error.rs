/// Errors that can occur in device operations.
///
/// Protocol violations by the host are not errors here: they are answered
/// with ERROR responses. What remains is transport failure and the few
/// local conditions the dispatcher turns into `ERR_OTHER`.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] u2fhid_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] u2fhid_frame::FrameError),

    /// No channel id could be allocated.
    #[error("channel allocation exhausted ({live} live channels)")]
    AllocationExhausted { live: usize },
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Failure reported by a [`CommandHandler`](crate::CommandHandler).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The handler does not implement this command.
    #[error("command not supported")]
    Unsupported,

    /// The handler could not produce a response.
    #[error("handler failed: {0}")]
    Failed(String),
}
