// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Safety Clamp

//! Stateless green-time bounds shared by the controller, the rule engine and
//! the manual override path. Nothing here holds state; every check is a pure
//! function of the envelope and its input.

use serde::{Deserialize, Serialize};

use crate::config::TimingConfig;
use crate::types::{Approach, ApproachMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanViolation {
    #[error("Approach {approach}: green {green}s is below minimum {min}s.")]
    BelowMinimum { approach: Approach, green: u32, min: u32 },
    #[error("Approach {approach}: green {green}s exceeds maximum {max}s.")]
    AboveMaximum { approach: Approach, green: u32, max: u32 },
    #[error("Total green {total}s exceeds budget of {budget}s.")]
    OverBudget { total: u32, budget: u32 },
}

/// Every violation found in one plan, in approach order then budget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("signal plan rejected: {}", join_violations(.0))]
pub struct PlanViolations(pub Vec<PlanViolation>);

fn join_violations(violations: &[PlanViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SafetyEnvelope {
    pub min_green_seconds: u32,
    pub max_green_seconds: u32,
    /// Upper bound on Σ green for one cycle.
    pub green_budget_seconds: u32,
}

impl SafetyEnvelope {
    pub fn for_cycle(timing: &TimingConfig, cycle_seconds: u32) -> Self {
        Self {
            min_green_seconds: timing.min_green_seconds,
            max_green_seconds: timing.max_green_seconds,
            green_budget_seconds: timing.green_budget(cycle_seconds),
        }
    }

    pub fn contains(&self, green: i64) -> bool {
        green >= i64::from(self.min_green_seconds) && green <= i64::from(self.max_green_seconds)
    }

    /// Clamp a proposed green to `[min, max]`. Accepts signed input so callers
    /// can clamp `current + delta` without an intermediate underflow.
    pub fn clamp_green_seconds(&self, value: i64) -> u32 {
        let clamped = value.clamp(
            i64::from(self.min_green_seconds),
            i64::from(self.max_green_seconds),
        );
        // Bounded by u32 limits above.
        clamped as u32
    }

    pub fn validate_plan(&self, greens: &ApproachMap<u32>) -> Result<(), PlanViolations> {
        let mut violations = Vec::new();
        for (approach, &green) in greens.iter() {
            if green < self.min_green_seconds {
                violations.push(PlanViolation::BelowMinimum {
                    approach,
                    green,
                    min: self.min_green_seconds,
                });
            }
            if green > self.max_green_seconds {
                violations.push(PlanViolation::AboveMaximum {
                    approach,
                    green,
                    max: self.max_green_seconds,
                });
            }
        }
        let total = greens.total();
        if total > self.green_budget_seconds {
            violations.push(PlanViolation::OverBudget {
                total,
                budget: self.green_budget_seconds,
            });
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(PlanViolations(violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> SafetyEnvelope {
        SafetyEnvelope::for_cycle(&TimingConfig::default(), 150)
    }

    #[test]
    fn clamp_respects_bounds() {
        let env = envelope();
        assert_eq!(env.clamp_green_seconds(-40), 20);
        assert_eq!(env.clamp_green_seconds(5), 20);
        assert_eq!(env.clamp_green_seconds(45), 45);
        assert_eq!(env.clamp_green_seconds(500), 70);
    }

    #[test]
    fn baseline_plan_is_valid() {
        let env = envelope();
        assert_eq!(env.green_budget_seconds, 145);
        assert!(env.validate_plan(&ApproachMap { n: 45, e: 20, s: 45, w: 20 }).is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let env = envelope();
        let err = env
            .validate_plan(&ApproachMap { n: 10, e: 70, s: 71, w: 20 })
            .unwrap_err();
        assert_eq!(
            err.0,
            vec![
                PlanViolation::BelowMinimum { approach: Approach::N, green: 10, min: 20 },
                PlanViolation::AboveMaximum { approach: Approach::S, green: 71, max: 70 },
                PlanViolation::OverBudget { total: 171, budget: 145 },
            ]
        );
        assert!(err.to_string().contains("Approach N: green 10s is below minimum 20s."));
    }
}
