//! Channel registry.
//!
//! A fixed-capacity map from channel id to per-channel state. Channels never
//! reference each other; the only cross-channel state is the lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info};
use u2fhid_frame::{ChannelId, Transaction};

use crate::error::{DeviceError, Result};

/// State of one allocated channel.
#[derive(Debug)]
pub struct ChannelState {
    id: ChannelId,
    transaction: Option<Transaction>,
    last_active: Instant,
}

impl ChannelState {
    fn new(id: ChannelId, now: Instant) -> Self {
        Self {
            id,
            transaction: None,
            last_active: now,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// The message being received, if any.
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    pub fn transaction_mut(&mut self) -> Option<&mut Transaction> {
        self.transaction.as_mut()
    }

    /// Start receiving a new message, dropping any previous one.
    pub fn begin(&mut self, transaction: Transaction) -> Option<Transaction> {
        self.transaction.replace(transaction)
    }

    /// Take the transaction out, leaving the channel idle.
    pub fn take_transaction(&mut self) -> Option<Transaction> {
        self.transaction.take()
    }

    /// Returns true while a message is being received.
    pub fn is_receiving(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelLock {
    holder: ChannelId,
    expires: Instant,
}

/// Allocated channels plus the channel lock.
pub struct ChannelRegistry {
    channels: HashMap<ChannelId, ChannelState>,
    capacity: usize,
    retries: u32,
    lock: Option<ChannelLock>,
    rng: Box<dyn RngCore + Send>,
}

impl ChannelRegistry {
    /// Create an empty registry seeded from the OS.
    pub fn new(capacity: usize, retries: u32) -> Self {
        Self::with_rng(capacity, retries, StdRng::from_os_rng())
    }

    /// Create an empty registry with a fixed seed, for reproducible ids.
    pub fn with_seed(capacity: usize, retries: u32, seed: u64) -> Self {
        Self::with_rng(capacity, retries, StdRng::seed_from_u64(seed))
    }

    /// Create an empty registry drawing channel ids from `rng`.
    pub fn with_rng(capacity: usize, retries: u32, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            channels: HashMap::with_capacity(capacity),
            capacity,
            retries: retries.max(1),
            lock: None,
            rng: Box::new(rng),
        }
    }

    /// Allocate a fresh channel id.
    ///
    /// Candidates are drawn at random and rejected if they are broadcast,
    /// zero or already live. When the registry is full, the idle channel that
    /// has been quiet the longest is evicted first.
    pub fn allocate(&mut self, now: Instant) -> Result<ChannelId> {
        if self.channels.len() >= self.capacity {
            self.evict_idle(now)?;
        }

        for attempt in 0..self.retries {
            let candidate = ChannelId::new(self.rng.next_u32());
            if !candidate.is_allocatable() || self.channels.contains_key(&candidate) {
                debug!(%candidate, attempt, "rejected channel id candidate");
                continue;
            }
            let state = ChannelState::new(candidate, now);
            self.channels.insert(candidate, state);
            info!(channel = %candidate, live = self.channels.len(), "channel allocated");
            return Ok(candidate);
        }

        Err(DeviceError::AllocationExhausted {
            live: self.channels.len(),
        })
    }

    fn evict_idle(&mut self, now: Instant) -> Result<()> {
        let holder = self.lock_holder(now);
        let victim = self
            .channels
            .values()
            .filter(|state| !state.is_receiving() && Some(state.id) != holder)
            .min_by_key(|state| state.last_active)
            .map(|state| state.id);

        match victim {
            Some(id) => {
                self.channels.remove(&id);
                info!(channel = %id, "evicted idle channel");
                Ok(())
            }
            None => Err(DeviceError::AllocationExhausted {
                live: self.channels.len(),
            }),
        }
    }

    /// State of a live channel.
    pub fn lookup(&mut self, id: ChannelId) -> Option<&mut ChannelState> {
        self.channels.get_mut(&id)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    /// Forget a channel, releasing its lock if it holds one.
    pub fn revoke(&mut self, id: ChannelId) -> Option<ChannelState> {
        if self.lock.is_some_and(|lock| lock.holder == id) {
            self.lock = None;
        }
        self.channels.remove(&id)
    }

    /// Drop every channel and the lock.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.lock = None;
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live channels in no particular order.
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut ChannelState> {
        self.channels.values_mut()
    }

    /// Channel currently holding the lock. An expired lock is cleared here.
    pub fn lock_holder(&mut self, now: Instant) -> Option<ChannelId> {
        match self.lock {
            Some(lock) if now < lock.expires => Some(lock.holder),
            Some(lock) => {
                info!(channel = %lock.holder, "channel lock expired");
                self.lock = None;
                None
            }
            None => None,
        }
    }

    /// Set or refresh the lock for `holder`.
    pub fn set_lock(&mut self, holder: ChannelId, duration: Duration, now: Instant) {
        self.lock = Some(ChannelLock {
            holder,
            expires: now + duration,
        });
        info!(channel = %holder, ?duration, "channel lock set");
    }

    /// Release the lock if `holder` owns it.
    pub fn release_lock(&mut self, holder: ChannelId) {
        if self.lock.is_some_and(|lock| lock.holder == holder) {
            self.lock = None;
            info!(channel = %holder, "channel lock released");
        }
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("live", &self.channels.len())
            .field("capacity", &self.capacity)
            .field("lock", &self.lock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};

    use u2fhid_frame::InitFrame;

    use super::*;

    fn registry(capacity: usize) -> ChannelRegistry {
        ChannelRegistry::with_seed(capacity, 8, 0x5EED)
    }

    /// Hands out a fixed list of candidate ids, then zeros.
    struct Scripted(VecDeque<u32>);

    impl Scripted {
        fn new(ids: &[u32]) -> Self {
            Self(ids.iter().copied().collect())
        }
    }

    impl RngCore for Scripted {
        fn next_u32(&mut self) -> u32 {
            self.0.pop_front().unwrap_or(0)
        }

        fn next_u64(&mut self) -> u64 {
            u64::from(self.next_u32())
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(4) {
                let bytes = self.next_u32().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }
    }

    fn receiving(now: Instant, id: ChannelId) -> Transaction {
        let init = InitFrame::new(id, 0x83, 100, vec![0u8; 57]).expect("valid init frame");
        Transaction::start(&init, now).expect("valid transaction")
    }

    #[test]
    fn allocated_ids_are_distinct_and_allocatable() {
        let now = Instant::now();
        let mut reg = registry(64);
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let id = reg.allocate(now).expect("allocation should succeed");
            assert!(id.is_allocatable());
            assert!(seen.insert(id), "duplicate id {id}");
        }
        assert_eq!(reg.len(), 64);
    }

    #[test]
    fn broadcast_zero_and_live_candidates_are_skipped() {
        let now = Instant::now();
        let live = 0x0101_0101;
        let fresh = 0x0202_0202;
        let mut reg = ChannelRegistry::with_rng(
            4,
            8,
            Scripted::new(&[live, 0xFFFF_FFFF, 0, live, fresh]),
        );

        assert_eq!(
            reg.allocate(now).expect("first allocation"),
            ChannelId::new(live)
        );
        assert_eq!(
            reg.allocate(now).expect("fourth candidate is usable"),
            ChannelId::new(fresh)
        );
        assert_eq!(reg.len(), 2);
        assert!(!reg.contains(ChannelId::BROADCAST));
        assert!(!reg.contains(ChannelId::RESERVED));
    }

    #[test]
    fn retries_run_out_on_unusable_candidates() {
        let now = Instant::now();
        let script = Scripted::new(&[0xFFFF_FFFF, 0, 0x0303_0303]);
        let mut reg = ChannelRegistry::with_rng(4, 2, script);

        let err = reg.allocate(now).expect_err("both draws are unusable");
        assert!(matches!(err, DeviceError::AllocationExhausted { live: 0 }));
        assert!(reg.is_empty());

        // The next call draws again rather than reusing a rejected candidate.
        let next = reg.allocate(now).expect("allocate");
        assert_eq!(next, ChannelId::new(0x0303_0303));
    }

    #[test]
    fn same_seed_same_ids() {
        let now = Instant::now();
        let a = registry(4).allocate(now).expect("allocate");
        let b = registry(4).allocate(now).expect("allocate");
        assert_eq!(a, b);
    }

    #[test]
    fn lookup_and_revoke() {
        let now = Instant::now();
        let mut reg = registry(4);
        let id = reg.allocate(now).expect("allocate");

        assert_eq!(reg.lookup(id).map(|s| s.id()), Some(id));
        assert!(reg.lookup(ChannelId::BROADCAST).is_none());

        assert!(reg.revoke(id).is_some());
        assert!(reg.lookup(id).is_none());
        assert!(reg.revoke(id).is_none());
    }

    #[test]
    fn full_registry_evicts_oldest_idle_channel() {
        let start = Instant::now();
        let mut reg = registry(2);
        let oldest = reg.allocate(start).expect("allocate");
        let newer = reg
            .allocate(start + Duration::from_secs(1))
            .expect("allocate");

        let third = reg
            .allocate(start + Duration::from_secs(2))
            .expect("allocate with eviction");
        assert_eq!(reg.len(), 2);
        assert!(!reg.contains(oldest));
        assert!(reg.contains(newer));
        assert!(reg.contains(third));
    }

    #[test]
    fn busy_and_locked_channels_are_not_evicted() {
        let start = Instant::now();
        let mut reg = registry(2);
        let locked = reg.allocate(start).expect("allocate");
        let busy = reg
            .allocate(start + Duration::from_secs(1))
            .expect("allocate");

        reg.set_lock(locked, Duration::from_secs(10), start);
        let txn = receiving(start, busy);
        reg.lookup(busy).expect("live channel").begin(txn);

        let err = reg
            .allocate(start + Duration::from_secs(2))
            .expect_err("nothing is evictable");
        assert!(matches!(err, DeviceError::AllocationExhausted { live: 2 }));

        // Once the lock lapses its holder is fair game.
        let later = start + Duration::from_secs(11);
        let fresh = reg.allocate(later).expect("allocate after lock expiry");
        assert!(!reg.contains(locked));
        assert!(reg.contains(fresh));
    }

    #[test]
    fn lock_expires_lazily() {
        let start = Instant::now();
        let mut reg = registry(4);
        let id = reg.allocate(start).expect("allocate");

        reg.set_lock(id, Duration::from_secs(3), start);
        assert_eq!(reg.lock_holder(start + Duration::from_secs(2)), Some(id));
        assert_eq!(reg.lock_holder(start + Duration::from_secs(3)), None);
        assert_eq!(reg.lock_holder(start), None, "expired lock stays cleared");
    }

    #[test]
    fn release_only_by_holder() {
        let now = Instant::now();
        let mut reg = registry(4);
        let holder = reg.allocate(now).expect("allocate");
        let other = reg.allocate(now).expect("allocate");

        reg.set_lock(holder, Duration::from_secs(5), now);
        reg.release_lock(other);
        assert_eq!(reg.lock_holder(now), Some(holder));

        reg.release_lock(holder);
        assert_eq!(reg.lock_holder(now), None);
    }

    #[test]
    fn revoking_holder_releases_lock() {
        let now = Instant::now();
        let mut reg = registry(4);
        let holder = reg.allocate(now).expect("allocate");
        reg.set_lock(holder, Duration::from_secs(5), now);
        reg.revoke(holder);
        assert_eq!(reg.lock_holder(now), None);
    }

    #[test]
    fn clear_drops_everything() {
        let now = Instant::now();
        let mut reg = registry(4);
        let id = reg.allocate(now).expect("allocate");
        reg.set_lock(id, Duration::from_secs(5), now);

        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.lock_holder(now), None);
    }
}
