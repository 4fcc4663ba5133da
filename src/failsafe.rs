// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Failsafe Monitor

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

use crate::controller::SignalController;
use crate::types::FailsafeMode;

// ─── Clocks ──────────────────────────────────────────────────────────────────

/// Time source for staleness checks and emitted timestamps.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary origin. Never goes backwards.
    fn elapsed(&self) -> Duration;
    fn wall_time(&self) -> DateTime<Utc>;
}

/// Real time. Not available on wasm32, where `Instant` is unsupported.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(not(target_arch = "wasm32"))]
impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Clock for MonotonicClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-advanced clock for tests, headless runs and the wasm surface. Wall
/// time is `epoch + elapsed`.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicU64,
    epoch: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicU64::new(0),
            epoch,
        }
    }

    /// 2026-01-05 00:00 UTC, a Monday.
    pub fn starting_monday() -> Self {
        Self::new(Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).single().unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }

    fn wall_time(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::zero());
        self.epoch + elapsed
    }
}

// ─── FailsafeMonitor ─────────────────────────────────────────────────────────

/// Per-intersection staleness tracker.
///
/// The mode is a pure function of elapsed time since the last successful
/// tick: nothing is cached, so a fresh `record_tick` immediately restores
/// `AiActive`.
pub struct FailsafeMonitor {
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    last_seen: HashMap<String, Duration>,
}

impl FailsafeMonitor {
    pub fn new(clock: Arc<dyn Clock>, stale_seconds: u64) -> Self {
        Self {
            clock,
            stale_after: Duration::from_secs(stale_seconds),
            last_seen: HashMap::new(),
        }
    }

    /// Stamp a successful step for `intersection_id`.
    pub fn record_tick(&mut self, intersection_id: &str) {
        let now = self.clock.elapsed();
        self.last_seen.insert(intersection_id.to_string(), now);
    }

    /// Mode without side effects.
    pub fn mode(&self, intersection_id: &str) -> FailsafeMode {
        match self.last_seen.get(intersection_id) {
            Some(&seen) if self.clock.elapsed().saturating_sub(seen) <= self.stale_after => {
                FailsafeMode::AiActive
            }
            _ => FailsafeMode::LocalFallback,
        }
    }

    /// Evaluate staleness and revert `controller` to baseline when stale or
    /// never recorded. Safe to call repeatedly.
    pub fn check(&self, intersection_id: &str, controller: &mut SignalController) -> FailsafeMode {
        let mode = self.mode(intersection_id);
        if mode == FailsafeMode::LocalFallback {
            if !controller.is_at_baseline() {
                warn!(
                    intersection = %intersection_id,
                    stale_seconds = self.stale_after.as_secs(),
                    "sensor stale, reverting to baseline plan"
                );
            }
            controller.revert_baseline();
        }
        mode
    }

    pub fn last_seen(&self, intersection_id: &str) -> Option<Duration> {
        self.last_seen.get(intersection_id).copied()
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::types::Approach;

    fn setup() -> (Arc<ManualClock>, FailsafeMonitor, SignalController) {
        let clock = Arc::new(ManualClock::starting_monday());
        let monitor = FailsafeMonitor::new(clock.clone(), 60);
        let timing = TimingConfig::default();
        let ctrl = SignalController::new(&timing, timing.baseline_greens).unwrap();
        (clock, monitor, ctrl)
    }

    #[test]
    fn never_recorded_falls_back() {
        let (_clock, monitor, mut ctrl) = setup();
        ctrl.apply_adjustment(Approach::N, -10);
        assert_eq!(monitor.check("X", &mut ctrl), FailsafeMode::LocalFallback);
        assert_eq!(ctrl.plan(), ctrl.baseline_plan());
    }

    #[test]
    fn fresh_tick_is_active_and_keeps_plan() {
        let (clock, mut monitor, mut ctrl) = setup();
        monitor.record_tick("A");
        ctrl.apply_adjustment(Approach::N, -10);
        clock.advance(Duration::from_secs(60));
        assert_eq!(monitor.check("A", &mut ctrl), FailsafeMode::AiActive);
        assert!(!ctrl.is_at_baseline());
    }

    #[test]
    fn stale_tick_reverts() {
        let (clock, mut monitor, mut ctrl) = setup();
        monitor.record_tick("A");
        ctrl.apply_adjustment(Approach::N, -10);
        clock.advance(Duration::from_secs(61));
        assert_eq!(monitor.check("A", &mut ctrl), FailsafeMode::LocalFallback);
        assert!(ctrl.is_at_baseline());
        // Recovery is immediate once a tick lands.
        monitor.record_tick("A");
        assert_eq!(monitor.mode("A"), FailsafeMode::AiActive);
    }

    #[test]
    fn repeated_checks_are_idempotent() {
        let (clock, mut monitor, mut ctrl) = setup();
        monitor.record_tick("A");
        clock.advance(Duration::from_secs(120));
        let first = monitor.check("A", &mut ctrl);
        let plan = ctrl.plan();
        for _ in 0..5 {
            assert_eq!(monitor.check("A", &mut ctrl), first);
            assert_eq!(ctrl.plan(), plan);
        }
    }

    #[test]
    fn manual_clock_wall_time_advances() {
        let clock = ManualClock::starting_monday();
        let start = clock.wall_time();
        clock.advance(Duration::from_secs(90));
        assert_eq!((clock.wall_time() - start).num_seconds(), 90);
    }
}
