// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Signal Controller

//! Fixed-cycle signal controller for a single intersection.
//!
//! The cycle length is held constant. Extending one approach takes the
//! surplus from the other three in proportion to their current green, and an
//! adjustment that cannot fit inside the safety envelope degrades to the
//! largest magnitude that does (possibly zero). The controller is the only
//! mutator of green timing.

use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::safety::{PlanViolations, SafetyEnvelope};
use crate::types::{Approach, ApproachMap, SignalPlan};

#[derive(Debug, Clone)]
pub struct SignalController {
    baseline: ApproachMap<u32>,
    current: ApproachMap<u32>,
    yellow_seconds: u32,
    cycle_seconds: u32,
    envelope: SafetyEnvelope,
}

impl SignalController {
    /// Build a controller around `baseline`.
    ///
    /// When the baseline greens plus clearance disagree with the configured
    /// cycle, the baseline-implied cycle is adopted and a warning is logged.
    pub fn new(timing: &TimingConfig, baseline: ApproachMap<u32>) -> Result<Self, PlanViolations> {
        let yellow_seconds = timing.clearance_seconds;
        let implied = baseline.total() + yellow_seconds * Approach::COUNT;
        let cycle_seconds = if implied != timing.cycle_seconds {
            warn!(
                configured = timing.cycle_seconds,
                implied, "baseline greens do not fill the configured cycle; adopting implied cycle"
            );
            implied
        } else {
            timing.cycle_seconds
        };
        let envelope = SafetyEnvelope::for_cycle(timing, cycle_seconds);
        envelope.validate_plan(&baseline)?;
        Ok(Self {
            baseline,
            current: baseline,
            yellow_seconds,
            cycle_seconds,
            envelope,
        })
    }

    /// Extend (`delta > 0`) or shorten (`delta < 0`) the green of `approach`.
    ///
    /// Searches magnitudes from `|delta|` (capped at the target's room to its
    /// bound) down to 1 and commits the first
    /// candidate plan that stays inside the envelope, conserves the cycle
    /// exactly and moves the target in the requested direction. If none
    /// qualifies the plan is left unchanged.
    pub fn apply_adjustment(&mut self, approach: Approach, delta: i32) -> SignalPlan {
        if delta == 0 {
            return self.plan();
        }
        let sign = i64::from(delta.signum());
        // No magnitude beyond the target's distance to its bound can fit.
        let current = i64::from(self.current[approach]);
        let room = if sign > 0 {
            i64::from(self.envelope.max_green_seconds) - current
        } else {
            current - i64::from(self.envelope.min_green_seconds)
        };
        let limit = i64::from(delta.unsigned_abs()).min(room.max(0));
        for magnitude in (1..=limit).rev() {
            if let Some(next) = self.candidate(approach, sign * magnitude) {
                let before = self.current[approach];
                self.current = next;
                info!(
                    %approach,
                    requested = delta,
                    applied = i64::from(next[approach]) - i64::from(before),
                    "green adjusted"
                );
                return self.plan();
            }
        }
        debug!(%approach, requested = delta, "no feasible adjustment");
        self.plan()
    }

    /// Full plan for a trial delta, or `None` when it breaks an invariant.
    fn candidate(&self, approach: Approach, delta: i64) -> Option<ApproachMap<u32>> {
        let env = &self.envelope;
        let target_before = i64::from(self.current[approach]);
        if !env.contains(target_before + delta) {
            return None;
        }

        let others_total: u32 = approach.others().map(|a| self.current[a]).sum();
        let weight = Decimal::from(others_total.max(1));
        let shift = Decimal::from(delta);

        let mut next = self.current;
        for other in approach.others() {
            let current = Decimal::from(self.current[other]);
            let raw = current - shift * current / weight;
            let rounded = raw
                .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
                .to_i64()?;
            if !env.contains(rounded) {
                return None;
            }
            next[other] = env.clamp_green_seconds(rounded);
        }

        // Whatever the others gave up (after rounding) lands on the target.
        let green_total = i64::from(self.green_total());
        let others_after: i64 = approach.others().map(|a| i64::from(next[a])).sum();
        let target_after = green_total - others_after;
        if !env.contains(target_after) {
            return None;
        }
        let moved = target_after - target_before;
        if moved == 0 || moved.signum() != delta.signum() || moved.abs() > delta.abs() {
            return None;
        }
        next[approach] = env.clamp_green_seconds(target_after);

        if next.total() != self.green_total() || env.validate_plan(&next).is_err() {
            return None;
        }
        Some(next)
    }

    /// Restore the baseline. Idempotent.
    pub fn revert_baseline(&mut self) -> SignalPlan {
        if self.current != self.baseline {
            info!("signal plan reverted to baseline");
        }
        self.current = self.baseline;
        self.plan()
    }

    pub fn plan(&self) -> SignalPlan {
        SignalPlan::from_greens(&self.current, self.yellow_seconds)
    }

    pub fn baseline_plan(&self) -> SignalPlan {
        SignalPlan::from_greens(&self.baseline, self.yellow_seconds)
    }

    pub fn current_green(&self, approach: Approach) -> u32 {
        self.current[approach]
    }

    pub fn greens(&self) -> ApproachMap<u32> {
        self.current
    }

    pub fn is_at_baseline(&self) -> bool {
        self.current == self.baseline
    }

    pub fn cycle_seconds(&self) -> u32 {
        self.cycle_seconds
    }

    pub fn envelope(&self) -> &SafetyEnvelope {
        &self.envelope
    }

    /// Σ green every valid plan of this controller must sum to.
    fn green_total(&self) -> u32 {
        self.cycle_seconds - self.yellow_seconds * Approach::COUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn controller() -> SignalController {
        let timing = TimingConfig::default();
        SignalController::new(&timing, timing.baseline_greens).unwrap()
    }

    fn assert_invariants(ctrl: &SignalController) {
        let plan = ctrl.plan();
        let greens = plan.greens();
        assert_eq!(
            greens.total() + plan.yellow_seconds() * 4,
            plan.cycle_seconds(),
            "cycle not conserved: {greens:?}"
        );
        for (approach, &green) in greens.iter() {
            assert!((20..=70).contains(&green), "{approach} out of bounds: {green}");
        }
    }

    #[test]
    fn extend_south_takes_from_others() {
        let mut ctrl = controller();
        let plan = ctrl.apply_adjustment(Approach::S, 20);
        let s = plan.green(Approach::S);
        assert!(s > 45 && s <= 65, "S should grow by at most 20, got {s}");
        assert!(plan.green(Approach::N) <= 45);
        assert!(plan.green(Approach::E) <= 20);
        assert!(plan.green(Approach::W) <= 20);
        assert_invariants(&ctrl);
    }

    #[test]
    fn shorten_mainline_feeds_minor_approaches() {
        let mut ctrl = controller();
        let plan = ctrl.apply_adjustment(Approach::N, -10);
        // 10s split over 20/45/20 rounds to 2/5/2; N only gives up what the
        // others actually absorbed.
        assert_eq!(plan.green(Approach::E), 22);
        assert_eq!(plan.green(Approach::S), 50);
        assert_eq!(plan.green(Approach::W), 22);
        assert_eq!(plan.green(Approach::N), 36);
        assert_invariants(&ctrl);
    }

    #[test]
    fn extreme_delta_matches_room_to_bound() {
        let mut huge = controller();
        let mut bounded = controller();
        assert_eq!(
            huge.apply_adjustment(Approach::S, i32::MAX),
            bounded.apply_adjustment(Approach::S, 70 - 45)
        );

        let mut huge = controller();
        let mut bounded = controller();
        assert_eq!(
            huge.apply_adjustment(Approach::N, i32::MIN),
            bounded.apply_adjustment(Approach::N, -(45 - 20))
        );
        assert_invariants(&huge);

        // Already at the minimum: nothing to search.
        let mut ctrl = controller();
        let before = ctrl.plan();
        assert_eq!(ctrl.apply_adjustment(Approach::E, i32::MIN), before);
    }

    #[test]
    fn zero_delta_is_noop() {
        let mut ctrl = controller();
        let before = ctrl.plan();
        assert_eq!(ctrl.apply_adjustment(Approach::E, 0), before);
    }

    #[test]
    fn infeasible_delta_degrades_to_noop() {
        let mut ctrl = controller();
        // E already sits at min green.
        let before = ctrl.plan();
        assert_eq!(ctrl.apply_adjustment(Approach::E, -15), before);
        assert!(ctrl.is_at_baseline());
    }

    #[test]
    fn revert_is_idempotent() {
        let mut ctrl = controller();
        ctrl.apply_adjustment(Approach::N, -10);
        let once = ctrl.revert_baseline();
        let twice = ctrl.revert_baseline();
        assert_eq!(once, twice);
        assert_eq!(once, ctrl.baseline_plan());
    }

    #[test]
    fn inconsistent_cycle_is_normalised() {
        let timing = TimingConfig {
            cycle_seconds: 90,
            ..TimingConfig::default()
        };
        let ctrl = SignalController::new(&timing, timing.baseline_greens).unwrap();
        assert_eq!(ctrl.cycle_seconds(), 150);
        assert_invariants(&ctrl);
    }

    #[test]
    fn baseline_outside_envelope_is_rejected() {
        let timing = TimingConfig::default();
        let err = SignalController::new(&timing, ApproachMap { n: 80, e: 20, s: 45, w: 20 });
        assert!(err.is_err());
    }

    #[test]
    fn random_adjustments_preserve_invariants() {
        let mut ctrl = controller();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for step in 0..2_000 {
            let approach = Approach::ALL[rng.gen_range(0..4)];
            let delta = rng.gen_range(-40..=40);
            let before = ctrl.current_green(approach);
            let plan = ctrl.apply_adjustment(approach, delta);
            let after = plan.green(approach);
            // Never moves against the request.
            if delta > 0 {
                assert!(after >= before);
            } else if delta < 0 {
                assert!(after <= before);
            }
            assert!((i64::from(after) - i64::from(before)).abs() <= i64::from(delta.unsigned_abs()));
            assert_invariants(&ctrl);
            if step % 97 == 0 {
                ctrl.revert_baseline();
                assert!(ctrl.is_at_baseline());
            }
        }
    }
}
