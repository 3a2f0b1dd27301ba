//! Channel identifiers.
//!
//! Channel `0xFFFFFFFF` is the broadcast channel, used only to allocate new
//! channels with INIT. Channel `0` is reserved and never handed out. Every
//! other id is opaque and assigned by the device.

use std::fmt;

/// 32-bit U2FHID channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Broadcast channel for INIT allocation.
    pub const BROADCAST: ChannelId = ChannelId(0xFFFF_FFFF);

    /// Reserved, never allocated.
    pub const RESERVED: ChannelId = ChannelId(0);

    /// Wrap a raw channel id.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw 32-bit value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns true for the broadcast channel.
    pub const fn is_broadcast(self) -> bool {
        self.0 == Self::BROADCAST.0
    }

    /// Returns true if the id may be handed out to a host.
    pub const fn is_allocatable(self) -> bool {
        self.0 != Self::BROADCAST.0 && self.0 != Self::RESERVED.0
    }

    /// Big-endian wire representation.
    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Parse from the big-endian wire representation.
    pub const fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }
}

impl From<u32> for ChannelId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<ChannelId> for u32 {
    fn from(cid: ChannelId) -> Self {
        cid.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
