//! Report stream transport for U2FHID devices.
//!
//! A HID interface moves fixed-size reports in both directions. This crate
//! exposes that as a plain byte stream so the framing layer can sit on top of
//! any carrier:
//! - Unix domain sockets (virtual devices, test harnesses, UHID bridges)
//!
//! This is the lowest layer of u2fhid. Everything else builds on top of
//! the [`HidStream`] type provided here.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::HidStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
