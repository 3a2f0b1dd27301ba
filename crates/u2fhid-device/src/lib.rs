//! Device side of the U2FHID transport.
//!
//! Owns the channel registry, runs per-channel reassembly, dispatches
//! complete messages and answers protocol violations with ERROR responses.
//! Application commands plug in through [`CommandHandler`].

pub mod clock;
pub mod config;
pub mod device;
mod dispatch;
pub mod error;
pub mod handler;
#[cfg(unix)]
pub mod listener;
pub mod registry;
pub mod server;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DeviceConfig, DeviceVersion};
pub use device::U2fHidDevice;
pub use error::{DeviceError, HandlerError, Result};
pub use handler::CommandHandler;
#[cfg(unix)]
pub use listener::{DeviceListener, HostConnection};
pub use registry::{ChannelRegistry, ChannelState};
pub use server::{serve, ServeStats};
