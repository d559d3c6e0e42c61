use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracking gate enforcement outcomes.
///
/// All counters use relaxed ordering for maximum throughput. For a
/// consistent point-in-time view, call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct GateMetrics {
    /// Calls that passed the limit check.
    pub allowed: AtomicU64,
    /// Calls rejected because a limit was exhausted.
    pub blocked: AtomicU64,
    /// Calls that skipped the check entirely (dark-launched flag off).
    pub bypassed: AtomicU64,
    /// Backend failures absorbed by failing open.
    pub degraded: AtomicU64,
}

impl GateMetrics {
    /// Increment the allowed counter.
    pub fn increment_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the blocked counter.
    pub fn increment_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the bypassed counter.
    pub fn increment_bypassed(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the degraded counter.
    pub fn increment_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allowed: self.allowed.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`GateMetrics`] at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Calls that passed the limit check.
    pub allowed: u64,
    /// Calls rejected because a limit was exhausted.
    pub blocked: u64,
    /// Calls that skipped the check entirely.
    pub bypassed: u64,
    /// Backend failures absorbed by failing open.
    pub degraded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = GateMetrics::default();
        let snap = m.snapshot();
        assert_eq!(snap.allowed, 0);
        assert_eq!(snap.blocked, 0);
        assert_eq!(snap.bypassed, 0);
        assert_eq!(snap.degraded, 0);
    }

    #[test]
    fn increment_and_snapshot() {
        let m = GateMetrics::default();
        m.increment_allowed();
        m.increment_allowed();
        m.increment_blocked();
        m.increment_bypassed();
        m.increment_degraded();

        let snap = m.snapshot();
        assert_eq!(snap.allowed, 2);
        assert_eq!(snap.blocked, 1);
        assert_eq!(snap.bypassed, 1);
        assert_eq!(snap.degraded, 1);
    }
}
