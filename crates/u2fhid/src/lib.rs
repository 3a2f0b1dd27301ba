//! U2FHID transport framing and channel arbitration.
//!
//! The U2FHID layer moves U2F messages over fixed 64-byte HID reports. It
//! multiplexes independent host conversations over one device with 32-bit
//! channel ids, splits messages into numbered frames and puts them back
//! together, and turns every protocol violation into a one-byte ERROR reply.
//!
//! # Crate Structure
//!
//! - [`transport`]: raw report stream over a Unix domain socket
//! - [`frame`]: report codec, segmentation and per-channel reassembly
//! - [`device`]: channel registry, command dispatch and serve loop (behind `device` feature)

/// Re-export transport types.
pub mod transport {
    pub use u2fhid_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use u2fhid_frame::*;
}

/// Re-export device types (requires `device` feature).
#[cfg(feature = "device")]
pub mod device {
    pub use u2fhid_device::*;
}
