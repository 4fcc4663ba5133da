// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Tick Driver

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{info, warn};

use crate::registry::IntersectionRegistry;

/// Fixed-interval background loop over one registry.
///
/// Stop is cooperative: the loop only checks the stop channel between ticks,
/// so an in-flight tick always finishes.
pub struct TickDriver {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<u64>>,
}

impl TickDriver {
    /// Start ticking every `interval`. With `max_ticks` the loop ends on its
    /// own after that many ticks.
    pub fn spawn(
        registry: Arc<IntersectionRegistry>,
        interval: Duration,
        max_ticks: Option<u64>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("corridor-tick".to_string())
            .spawn(move || {
                registry.set_live(true);
                info!(interval_ms = interval.as_millis() as u64, "tick driver started");
                let mut ran = 0u64;
                loop {
                    let started = Instant::now();
                    match catch_unwind(AssertUnwindSafe(|| registry.tick())) {
                        Ok(report) => {
                            for (id, reason) in report.failures() {
                                warn!(intersection = %id, tick = report.tick, %reason, "tick reported failure");
                            }
                        }
                        Err(_) => {
                            warn!("tick panicked outside intersection isolation");
                            registry.mark_failed("Tick error: corridor pass panicked");
                        }
                    }
                    ran += 1;
                    if max_ticks.is_some_and(|max| ran >= max) {
                        break;
                    }
                    let wait = interval.saturating_sub(started.elapsed());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                registry.set_live(false);
                info!(ticks = ran, "tick driver stopped");
                ran
            })?;
        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Signal stop and wait for the loop to exit. Returns ticks run.
    pub fn stop(mut self) -> u64 {
        let _ = self.stop_tx.try_send(());
        self.join_inner()
    }

    /// Wait for a bounded driver to finish on its own.
    pub fn join(mut self) -> u64 {
        self.join_inner()
    }

    fn join_inner(&mut self) -> u64 {
        self.handle
            .take()
            .map(|h| h.join().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        self.join_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorridorConfig;
    use crate::failsafe::ManualClock;

    fn registry() -> Arc<IntersectionRegistry> {
        Arc::new(
            IntersectionRegistry::builder(CorridorConfig::default())
                .clock(Arc::new(ManualClock::starting_monday()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn bounded_driver_runs_exact_ticks() {
        let reg = registry();
        let driver = TickDriver::spawn(reg.clone(), Duration::from_millis(1), Some(5)).unwrap();
        assert_eq!(driver.join(), 5);
        assert_eq!(reg.tick_count(), 5);
        assert!(!reg.status().live);
    }

    #[test]
    fn stop_ends_unbounded_driver() {
        let reg = registry();
        let driver = TickDriver::spawn(reg.clone(), Duration::from_millis(5), None).unwrap();
        thread::sleep(Duration::from_millis(30));
        let ran = driver.stop();
        assert!(ran >= 1);
        assert_eq!(reg.tick_count(), ran);
    }
}
