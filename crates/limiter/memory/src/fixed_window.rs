use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use weir_limiter::clock::{Clock, SystemClock};
use weir_limiter::error::LimiterError;
use weir_limiter::key::LimitKey;
use weir_limiter::limiter::RateLimiter;

/// Counter state for one logical key.
#[derive(Debug, Clone)]
struct WindowSlot {
    window_start: u64,
    window_secs: u64,
    count: u64,
}

/// In-memory fixed-window [`RateLimiter`] backed by a [`DashMap`].
///
/// Windows are aligned to the epoch (`now - now % per_seconds`) so every
/// process agrees on boundaries. Correctness requires all callers to share
/// one instance; hand out clones of an `Arc`. Per-key atomicity comes from
/// the map's entry guards.
///
/// Slots for ended windows are dropped lazily: rotation on the next touch,
/// or in bulk via [`MemoryFixedWindow::prune`].
#[derive(Debug)]
pub struct MemoryFixedWindow {
    slots: DashMap<String, WindowSlot>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryFixedWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFixedWindow {
    /// Create a backend on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a backend on the given clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
        }
    }

    fn now_secs(&self) -> u64 {
        self.clock.now_millis() / 1_000
    }

    /// Drop every slot whose window has already ended.
    ///
    /// Hosts call this on their own cadence to bound the map; the engine
    /// never spawns background work.
    pub fn prune(&self) {
        let now = self.now_secs();
        self.slots
            .retain(|_, slot| now < slot.window_start + slot.window_secs);
    }

    /// Number of live tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl RateLimiter for MemoryFixedWindow {
    async fn allow(
        &self,
        key: &LimitKey,
        quota: u64,
        per_seconds: u64,
    ) -> Result<bool, LimiterError> {
        let per = per_seconds.max(1);
        let now = self.now_secs();
        let window_start = now - (now % per);

        // The entry guard serializes concurrent callers on this key.
        let mut slot = self
            .slots
            .entry(key.canonical())
            .or_insert_with(|| WindowSlot {
                window_start,
                window_secs: per,
                count: 0,
            });

        if slot.window_start != window_start || slot.window_secs != per {
            slot.window_start = window_start;
            slot.window_secs = per;
            slot.count = 1;
            return Ok(true);
        }

        slot.count += 1;
        Ok(slot.count <= quota)
    }

    async fn retry_after(
        &self,
        key: &LimitKey,
        _quota: u64,
        per_seconds: u64,
    ) -> Result<Duration, LimiterError> {
        let per = per_seconds.max(1);
        let now = self.now_secs();

        match self.slots.get(&key.canonical()) {
            Some(slot) => {
                let boundary = slot.window_start + per;
                Ok(Duration::from_secs(boundary.saturating_sub(now)))
            }
            None => Ok(Duration::ZERO),
        }
    }
}
