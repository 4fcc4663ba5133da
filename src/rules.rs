// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Rule Engine

//! Congestion rules and the recommendation book.
//!
//! `evaluate` turns one intersection's metrics into at most one alert.
//! `generate` runs it across the corridor, keeps the most severe `top_n`,
//! and falls back to a single advisory for the busiest intersection when
//! nothing crosses the alert threshold. Every proposed green passes through
//! the same safety clamp as manual overrides.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RulesConfig;
use crate::safety::SafetyEnvelope;
use crate::types::*;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecommendationError {
    #[error("unknown recommendation '{0}'")]
    Unknown(String),
    #[error("recommendation '{id}' is already {status:?}")]
    NotPending {
        id: String,
        status: RecommendationStatus,
    },
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Everything the rules need about one intersection for one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInput {
    pub intersection_id: String,
    pub location_name: String,
    pub density_percent: f64,
    pub queue_per_approach: ApproachMap<u32>,
    pub current_greens: ApproachMap<u32>,
    pub departures_per_tick: u32,
    pub wait_time_minutes: f64,
    pub confidence_percent: u8,
}

impl RuleInput {
    pub fn total_queue(&self) -> u32 {
        self.queue_per_approach.total()
    }
}

// ---------------------------------------------------------------------------
// RuleEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: RulesConfig,
    envelope: SafetyEnvelope,
    minutes_per_tick: u32,
}

impl RuleEngine {
    pub fn new(config: RulesConfig, envelope: SafetyEnvelope, minutes_per_tick: u32) -> Self {
        Self {
            config,
            envelope,
            minutes_per_tick,
        }
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Alert for one intersection, or `None` below the density threshold.
    pub fn evaluate(&self, input: &RuleInput, created_at: DateTime<FixedOffset>) -> Option<Recommendation> {
        if input.density_percent < self.config.alert_threshold_percent {
            return None;
        }
        let total_queue = input.total_queue();
        let approach = self.select_target(&input.queue_per_approach);
        let current = input.current_greens[approach];
        let delta = self.proportional_delta(input.queue_per_approach[approach], total_queue);
        let recommended = self
            .envelope
            .clamp_green_seconds(i64::from(current) + i64::from(delta));
        let delay = self.predicted_delay(total_queue, input.departures_per_tick);

        Some(Recommendation {
            id: new_recommendation_id(),
            created_at,
            status: RecommendationStatus::Pending,
            priority: Priority::Alert,
            target_intersection: input.intersection_id.clone(),
            target_location: input.location_name.clone(),
            target_approach: approach,
            alert_title: format!("Critical Alert: {} Density", approach.display_name()),
            alert_description: format!(
                "Increase green duration for {} flow. Predicted +{} min delay if signal timing is not adjusted immediately.",
                approach.display_name().to_lowercase(),
                delay
            ),
            current_green_seconds: current,
            recommended_green_seconds: recommended,
            delta_seconds: recommended as i32 - current as i32,
            confidence_percent: input.confidence_percent.min(99),
            predicted_delay_minutes: delay,
            density_percent: input.density_percent,
            total_queue,
        })
    }

    /// Largest queue wins; the mainline approach wins ties, then the fixed
    /// approach order.
    pub fn select_target(&self, queue: &ApproachMap<u32>) -> Approach {
        let mainline = self.config.mainline_approach;
        let max_queue = queue.iter().map(|(_, &q)| q).max().unwrap_or(0);
        if queue[mainline] == max_queue {
            return mainline;
        }
        Approach::ALL
            .into_iter()
            .find(|a| queue[*a] == max_queue)
            .unwrap_or(mainline)
    }

    /// `round(max_delta × q / max(1, total))`, kept within `[1, max_delta]`.
    pub fn proportional_delta(&self, approach_queue: u32, total_queue: u32) -> u32 {
        let max_delta = self.config.max_delta_seconds;
        let raw = f64::from(max_delta) * f64::from(approach_queue) / f64::from(total_queue.max(1));
        (raw.round() as u32).clamp(1, max_delta.max(1))
    }

    /// Minutes of delay if nothing changes, rounded to one decimal.
    pub fn predicted_delay(&self, total_queue: u32, departures_per_tick: u32) -> f64 {
        let ticks = f64::from(total_queue) / f64::from(departures_per_tick.max(1));
        crate::metrics::round_to(ticks * f64::from(self.minutes_per_tick), 1)
    }

    /// Forward-looking nudge for an intersection below the alert threshold.
    pub fn advisory(&self, input: &RuleInput, created_at: DateTime<FixedOffset>) -> Recommendation {
        let approach = self.select_target(&input.queue_per_approach);
        let current = input.current_greens[approach];
        let delta = if input.density_percent < self.config.advisory_density_split_percent {
            self.config.advisory_low_delta_seconds
        } else {
            self.config.advisory_high_delta_seconds
        };
        let recommended = self
            .envelope
            .clamp_green_seconds(i64::from(current) + i64::from(delta));

        Recommendation {
            id: new_recommendation_id(),
            created_at,
            status: RecommendationStatus::Pending,
            priority: Priority::Advisory,
            target_intersection: input.intersection_id.clone(),
            target_location: input.location_name.clone(),
            target_approach: approach,
            alert_title: "Advisory: Traffic Flow Optimization".to_string(),
            alert_description: format!(
                "Flow is stable; a small green extension on approach {approach} keeps queues low."
            ),
            current_green_seconds: current,
            recommended_green_seconds: recommended,
            delta_seconds: recommended as i32 - current as i32,
            confidence_percent: input.confidence_percent.min(99),
            predicted_delay_minutes: crate::metrics::round_to(input.wait_time_minutes.max(1.0), 1),
            density_percent: input.density_percent,
            total_queue: input.total_queue(),
        }
    }

    /// Corridor-wide pass: alerts ranked by severity, or one advisory.
    ///
    /// The advisory goes to the least idle intersection, meaning the one with
    /// the highest density and, on a density tie, the longest total queue.
    pub fn generate(&self, inputs: &[RuleInput], created_at: DateTime<FixedOffset>) -> Vec<Recommendation> {
        let alerts: Vec<Recommendation> = inputs
            .iter()
            .filter_map(|input| self.evaluate(input, created_at))
            .collect();
        let top = rank_top(alerts, self.config.top_n);
        if !top.is_empty() || !self.config.advisory_enabled {
            return top;
        }
        busiest(inputs)
            .map(|input| vec![self.advisory(input, created_at)])
            .unwrap_or_default()
    }
}

/// Sort by `(density desc, total_queue desc)` and keep `n`. Stable, so equal
/// candidates keep input order.
pub fn rank_top(mut candidates: Vec<Recommendation>, n: usize) -> Vec<Recommendation> {
    candidates.sort_by(|a, b| severity_order(b.density_percent, b.total_queue, a.density_percent, a.total_queue));
    candidates.truncate(n);
    candidates
}

fn severity_order(da: f64, qa: u32, db: f64, qb: u32) -> Ordering {
    da.total_cmp(&db).then(qa.cmp(&qb))
}

/// Least idle input: highest density, then longest total queue. The first
/// wins exact ties.
fn busiest(inputs: &[RuleInput]) -> Option<&RuleInput> {
    inputs.iter().reduce(|best, next| {
        let ord = severity_order(
            next.density_percent,
            next.total_queue(),
            best.density_percent,
            best.total_queue(),
        );
        if ord == Ordering::Greater {
            next
        } else {
            best
        }
    })
}

/// `REC-` followed by eight upper-case hex digits.
pub fn new_recommendation_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("REC-{}", hex[..8].to_uppercase())
}

// ---------------------------------------------------------------------------
// RecommendationBook
// ---------------------------------------------------------------------------

/// Current recommendation set. Republished each tick; status changes only
/// through `apply` / `reject`, and only from `Pending`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationBook {
    items: Vec<Recommendation>,
}

impl RecommendationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, recommendations: Vec<Recommendation>) {
        self.items = recommendations;
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Recommendation> {
        self.items.iter().find(|r| r.id == id)
    }

    /// The recommendation if it can still be decided.
    pub fn pending(&self, id: &str) -> Result<&Recommendation, RecommendationError> {
        let rec = self
            .get(id)
            .ok_or_else(|| RecommendationError::Unknown(id.to_string()))?;
        if rec.status != RecommendationStatus::Pending {
            return Err(RecommendationError::NotPending {
                id: id.to_string(),
                status: rec.status,
            });
        }
        Ok(rec)
    }

    pub fn apply(&mut self, id: &str) -> Result<Recommendation, RecommendationError> {
        self.transition(id, RecommendationStatus::Applied)
    }

    pub fn reject(&mut self, id: &str) -> Result<Recommendation, RecommendationError> {
        self.transition(id, RecommendationStatus::Rejected)
    }

    fn transition(&mut self, id: &str, status: RecommendationStatus) -> Result<Recommendation, RecommendationError> {
        self.pending(id)?;
        let rec = self
            .items
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RecommendationError::Unknown(id.to_string()))?;
        rec.status = status;
        info!(recommendation = %id, ?status, "recommendation decided");
        Ok(rec.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use chrono::TimeZone;

    fn engine() -> RuleEngine {
        let envelope = SafetyEnvelope::for_cycle(&TimingConfig::default(), 150);
        RuleEngine::new(RulesConfig::default(), envelope, 1)
    }

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 2, 8, 15, 0)
            .unwrap()
    }

    fn input(id: &str, density: f64, queue: ApproachMap<u32>) -> RuleInput {
        RuleInput {
            intersection_id: id.to_string(),
            location_name: format!("{id} junction"),
            density_percent: density,
            queue_per_approach: queue,
            current_greens: ApproachMap { n: 45, e: 20, s: 45, w: 20 },
            departures_per_tick: 20,
            wait_time_minutes: 0.4,
            confidence_percent: 95,
        }
    }

    #[test]
    fn below_threshold_yields_nothing() {
        let rec = engine().evaluate(&input("A", 79.9, ApproachMap { n: 10, e: 5, s: 40, w: 5 }), now());
        assert!(rec.is_none());
    }

    #[test]
    fn congested_south_is_targeted() {
        let rec = engine()
            .evaluate(&input("A", 85.0, ApproachMap { n: 10, e: 5, s: 40, w: 5 }), now())
            .unwrap();
        assert_eq!(rec.target_approach, Approach::S);
        // round(20 × 40 / 60) = 13
        assert_eq!(rec.delta_seconds, 13);
        assert_eq!(rec.recommended_green_seconds, 58);
        assert!(rec.delta_seconds > 0 && rec.delta_seconds <= 20);
        assert!(rec.predicted_delay_minutes > 0.0);
        // 60 / 20 × 1
        assert_eq!(rec.predicted_delay_minutes, 3.0);
        assert_eq!(rec.alert_title, "Critical Alert: Southbound Density");
        assert_eq!(rec.priority, Priority::Alert);
        assert_eq!(rec.status, RecommendationStatus::Pending);
    }

    #[test]
    fn recommendations_stay_clamped_at_extremes() {
        let e = engine();
        let queues = [
            ApproachMap { n: 0, e: 0, s: 0, w: 0 },
            ApproachMap { n: 0, e: 3, s: 7, w: 0 },
            ApproachMap { n: 120, e: 120, s: 120, w: 120 },
        ];
        for density in [0.0, 100.0] {
            for queue in queues {
                for green in [20, 45, 65, 70] {
                    for departures in [0, 20] {
                        let mut inp = input("A", density, queue);
                        inp.current_greens = ApproachMap { n: green, e: green, s: green, w: green };
                        inp.departures_per_tick = departures;
                        let recs = e.generate(std::slice::from_ref(&inp), now());
                        assert_eq!(recs.len(), 1, "density {density} queue {queue:?}");
                        let rec = &recs[0];
                        let case = format!("density {density} queue {queue:?} green {green}");
                        assert_eq!(rec.current_green_seconds, green, "{case}");
                        assert_eq!(
                            rec.recommended_green_seconds as i32 - rec.current_green_seconds as i32,
                            rec.delta_seconds,
                            "{case}"
                        );
                        assert!((20..=70).contains(&rec.recommended_green_seconds), "{case}");
                        assert!(rec.delta_seconds >= 0 && rec.delta_seconds <= 20, "{case}");
                        if green == 70 {
                            assert_eq!(rec.delta_seconds, 0, "{case}");
                        }
                        assert!(rec.predicted_delay_minutes.is_finite(), "{case}");
                        let expected = if density >= 80.0 { Priority::Alert } else { Priority::Advisory };
                        assert_eq!(rec.priority, expected, "{case}");
                    }
                }
            }
        }
    }

    #[test]
    fn mainline_wins_ties() {
        let e = engine();
        assert_eq!(e.select_target(&ApproachMap { n: 30, e: 10, s: 30, w: 5 }), Approach::S);
        assert_eq!(e.select_target(&ApproachMap { n: 30, e: 30, s: 10, w: 5 }), Approach::N);
        assert_eq!(e.select_target(&ApproachMap { n: 0, e: 0, s: 0, w: 0 }), Approach::S);
    }

    #[test]
    fn delta_bounds() {
        let e = engine();
        assert_eq!(e.proportional_delta(0, 0), 1);
        assert_eq!(e.proportional_delta(1, 1000), 1);
        assert_eq!(e.proportional_delta(500, 500), 20);
    }

    #[test]
    fn recommendation_never_exceeds_max_green() {
        let mut inp = input("A", 100.0, ApproachMap { n: 0, e: 0, s: 120, w: 0 });
        inp.current_greens.s = 65;
        let rec = engine().evaluate(&inp, now()).unwrap();
        assert_eq!(rec.recommended_green_seconds, 70);
        assert_eq!(rec.delta_seconds, 5);

        inp.current_greens.s = 70;
        let rec = engine().evaluate(&inp, now()).unwrap();
        assert_eq!(rec.recommended_green_seconds, 70);
        assert_eq!(rec.delta_seconds, 0);
    }

    #[test]
    fn rank_keeps_most_severe() {
        let e = engine();
        let inputs = vec![
            input("A", 85.0, ApproachMap { n: 10, e: 5, s: 40, w: 5 }),
            input("B", 95.0, ApproachMap { n: 10, e: 5, s: 60, w: 5 }),
            input("C", 85.0, ApproachMap { n: 20, e: 5, s: 60, w: 5 }),
            input("D", 90.0, ApproachMap { n: 10, e: 5, s: 50, w: 5 }),
            input("E", 20.0, ApproachMap { n: 1, e: 1, s: 1, w: 1 }),
        ];
        let recs = e.generate(&inputs, now());
        let order: Vec<&str> = recs.iter().map(|r| r.target_intersection.as_str()).collect();
        assert_eq!(order, vec!["B", "D", "C"]);
    }

    #[test]
    fn advisory_goes_to_busiest_when_calm() {
        let e = engine();
        let inputs = vec![
            input("A", 30.0, ApproachMap { n: 10, e: 5, s: 20, w: 5 }),
            input("B", 72.0, ApproachMap { n: 30, e: 5, s: 20, w: 5 }),
        ];
        let recs = e.generate(&inputs, now());
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert_eq!(rec.priority, Priority::Advisory);
        assert_eq!(rec.target_intersection, "B");
        assert_eq!(rec.target_approach, Approach::N);
        assert_eq!(rec.delta_seconds, 8);
        assert_eq!(rec.predicted_delay_minutes, 1.0);
    }

    #[test]
    fn advisory_density_tie_goes_to_longer_queue() {
        let inputs = vec![
            input("A", 50.0, ApproachMap { n: 10, e: 5, s: 20, w: 5 }),
            input("B", 50.0, ApproachMap { n: 10, e: 5, s: 30, w: 5 }),
            input("C", 50.0, ApproachMap { n: 10, e: 5, s: 30, w: 5 }),
        ];
        let recs = engine().generate(&inputs, now());
        assert_eq!(recs[0].target_intersection, "B");
    }

    #[test]
    fn advisory_can_be_disabled() {
        let envelope = SafetyEnvelope::for_cycle(&TimingConfig::default(), 150);
        let config = RulesConfig {
            advisory_enabled: false,
            ..RulesConfig::default()
        };
        let e = RuleEngine::new(config, envelope, 1);
        assert!(e.generate(&[input("A", 10.0, ApproachMap::default())], now()).is_empty());
        assert!(e.generate(&[], now()).is_empty());
    }

    #[test]
    fn ids_have_expected_shape() {
        let id = new_recommendation_id();
        assert_eq!(id.len(), 12);
        assert!(id.starts_with("REC-"));
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn book_transitions_only_from_pending() {
        let mut book = RecommendationBook::new();
        let rec = engine()
            .evaluate(&input("A", 85.0, ApproachMap { n: 10, e: 5, s: 40, w: 5 }), now())
            .unwrap();
        let id = rec.id.clone();
        book.publish(vec![rec]);

        let applied = book.apply(&id).unwrap();
        assert_eq!(applied.status, RecommendationStatus::Applied);
        assert_eq!(
            book.reject(&id),
            Err(RecommendationError::NotPending {
                id: id.clone(),
                status: RecommendationStatus::Applied
            })
        );
        assert_eq!(
            book.apply("REC-00000000"),
            Err(RecommendationError::Unknown("REC-00000000".to_string()))
        );
    }
}
