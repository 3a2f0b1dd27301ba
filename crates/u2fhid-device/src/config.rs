use std::time::Duration;

/// Longest gap allowed between two frames of one message.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(3000);

/// Longest lock a channel may request with LOCK.
pub const DEFAULT_MAX_LOCK_DURATION: Duration = Duration::from_secs(10);

/// Default number of live channels.
pub const DEFAULT_MAX_CHANNELS: usize = 32;

/// Default number of random candidates drawn per allocation.
pub const DEFAULT_ALLOCATION_RETRIES: u32 = 8;

/// Device version reported in the INIT response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
}

impl DeviceVersion {
    pub const fn new(major: u8, minor: u8, build: u8) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }
}

/// Device behavior configuration.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Reassembly timeout between frames of one message.
    pub transaction_timeout: Duration,
    /// Upper bound for a LOCK request.
    pub max_lock_duration: Duration,
    /// Registry capacity.
    pub max_channels: usize,
    /// Random candidates tried before allocation gives up.
    pub allocation_retries: u32,
    /// Version bytes for the INIT response.
    pub version: DeviceVersion,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            max_lock_duration: DEFAULT_MAX_LOCK_DURATION,
            max_channels: DEFAULT_MAX_CHANNELS,
            allocation_retries: DEFAULT_ALLOCATION_RETRIES,
            version: DeviceVersion::default(),
        }
    }
}
