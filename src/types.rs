// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Type Definitions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ─── Approach ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Approach {
    N = 0,
    E = 1,
    S = 2,
    W = 3,
}

impl Approach {
    /// Fixed evaluation order. Proportional redistribution and tie-breaks
    /// walk approaches in this order so results are deterministic.
    pub const ALL: [Approach; 4] = [Approach::N, Approach::E, Approach::S, Approach::W];

    pub const COUNT: u32 = 4;

    pub fn code(&self) -> &'static str {
        match self {
            Self::N => "N",
            Self::E => "E",
            Self::S => "S",
            Self::W => "W",
        }
    }

    /// Display name used in alert titles.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::N => "Northbound",
            Self::E => "Eastbound",
            Self::S => "Southbound",
            Self::W => "Westbound",
        }
    }

    pub fn others(self) -> impl Iterator<Item = Approach> {
        Self::ALL.into_iter().filter(move |a| *a != self)
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown approach '{0}', expected one of N, E, S, W")]
pub struct ParseApproachError(pub String);

impl FromStr for Approach {
    type Err = ParseApproachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" => Ok(Self::N),
            "E" => Ok(Self::E),
            "S" => Ok(Self::S),
            "W" => Ok(Self::W),
            _ => Err(ParseApproachError(s.to_string())),
        }
    }
}

// ─── ApproachMap ─────────────────────────────────────────────────────────────

/// One value per approach. Serializes as `{"N": .., "E": .., "S": .., "W": ..}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ApproachMap<T> {
    pub n: T,
    pub e: T,
    pub s: T,
    pub w: T,
}

impl<T> ApproachMap<T> {
    pub fn from_fn(mut f: impl FnMut(Approach) -> T) -> Self {
        Self {
            n: f(Approach::N),
            e: f(Approach::E),
            s: f(Approach::S),
            w: f(Approach::W),
        }
    }

    pub fn get(&self, approach: Approach) -> &T {
        match approach {
            Approach::N => &self.n,
            Approach::E => &self.e,
            Approach::S => &self.s,
            Approach::W => &self.w,
        }
    }

    pub fn get_mut(&mut self, approach: Approach) -> &mut T {
        match approach {
            Approach::N => &mut self.n,
            Approach::E => &mut self.e,
            Approach::S => &mut self.s,
            Approach::W => &mut self.w,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Approach, &T)> {
        Approach::ALL.into_iter().map(move |a| (a, self.get(a)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Approach, &T) -> U) -> ApproachMap<U> {
        ApproachMap::from_fn(|a| f(a, self.get(a)))
    }
}

impl ApproachMap<u32> {
    pub fn total(&self) -> u32 {
        self.n + self.e + self.s + self.w
    }
}

impl<T> std::ops::Index<Approach> for ApproachMap<T> {
    type Output = T;
    fn index(&self, approach: Approach) -> &T {
        self.get(approach)
    }
}

impl<T> std::ops::IndexMut<Approach> for ApproachMap<T> {
    fn index_mut(&mut self, approach: Approach) -> &mut T {
        self.get_mut(approach)
    }
}

// ─── Signal Plan ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseTiming {
    pub green_seconds: u32,
    pub yellow_seconds: u32,
    pub red_seconds: u32,
}

/// Full timing plan for one intersection.
///
/// Only green seconds and the shared yellow are inputs; red and the cycle
/// length are derived when the plan is built, so
/// `Σ green + 4 × yellow == cycle_seconds` holds for every constructed plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalPlan {
    phases: ApproachMap<PhaseTiming>,
    cycle_seconds: u32,
}

impl SignalPlan {
    pub fn from_greens(greens: &ApproachMap<u32>, yellow_seconds: u32) -> Self {
        let cycle_seconds = greens.total() + yellow_seconds * Approach::COUNT;
        let phases = greens.map(|_, &green_seconds| PhaseTiming {
            green_seconds,
            yellow_seconds,
            red_seconds: cycle_seconds.saturating_sub(green_seconds + yellow_seconds),
        });
        Self { phases, cycle_seconds }
    }

    pub fn phase(&self, approach: Approach) -> PhaseTiming {
        self.phases[approach]
    }

    pub fn green(&self, approach: Approach) -> u32 {
        self.phases[approach].green_seconds
    }

    pub fn greens(&self) -> ApproachMap<u32> {
        self.phases.map(|_, p| p.green_seconds)
    }

    pub fn yellow_seconds(&self) -> u32 {
        self.phases.n.yellow_seconds
    }

    pub fn cycle_seconds(&self) -> u32 {
        self.cycle_seconds
    }

    pub fn phases(&self) -> &ApproachMap<PhaseTiming> {
        &self.phases
    }
}

// ─── Weather & Forecast (collaborator contracts) ────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Weather {
    pub temperature_c: f64,
    pub condition: String,
}

/// Output of the forecast collaborator for one intersection and tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Forecast {
    pub predicted_volume_15m: u32,
    pub predicted_volume_2h: u32,
    pub predicted_volume_4h: u32,
    /// Always within [0, 99].
    pub confidence_percent: u8,
}

// ─── Metrics ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlowLabel {
    FreeFlow,
    ModerateFlow,
    SlowTraffic,
}

impl FlowLabel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FreeFlow => "Free Flow",
            Self::ModerateFlow => "Moderate Flow",
            Self::SlowTraffic => "Slow Traffic",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLabel {
    Smooth,
    Moderate,
    High,
    Critical,
}

/// Per-tick metrics for one intersection. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub tick: u64,
    pub timestamp: DateTime<FixedOffset>,
    /// Arrivals scaled to vehicles per cycle.
    pub current_volume: u32,
    pub queue_per_approach: ApproachMap<u32>,
    pub total_queue: u32,
    pub density_percent: f64,
    pub avg_speed_kmh: f64,
    pub wait_time_minutes: f64,
    pub flow_rate_cars_per_min: f64,
    pub arrivals: u32,
    pub departures: u32,
    pub weather: Weather,
    pub accidents_count: u32,
    pub flow_label: FlowLabel,
}

// ─── Timeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelinePoint {
    pub timestamp: DateTime<FixedOffset>,
    pub current_volume: u32,
    #[serde(default)]
    pub predicted_volume: Option<u32>,
    pub congestion_threshold: f64,
    pub congestion_detected: bool,
}

// ─── Recommendation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationStatus {
    Pending,
    Applied,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Density crossed the alert threshold.
    Alert,
    /// Forward-looking nudge emitted when nothing crossed the threshold.
    Advisory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub id: String,
    pub created_at: DateTime<FixedOffset>,
    pub status: RecommendationStatus,
    pub priority: Priority,
    pub target_intersection: String,
    pub target_location: String,
    pub target_approach: Approach,
    pub alert_title: String,
    pub alert_description: String,
    pub current_green_seconds: u32,
    pub recommended_green_seconds: u32,
    pub delta_seconds: i32,
    pub confidence_percent: u8,
    pub predicted_delay_minutes: f64,
    pub density_percent: f64,
    pub total_queue: u32,
}

// ─── Modes & Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailsafeMode {
    AiActive,
    LocalFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemStatus {
    pub operational: bool,
    pub mode: FailsafeMode,
    pub live: bool,
    pub message: String,
    pub last_update: DateTime<FixedOffset>,
}

// ─── Prediction view ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub model_name: String,
    pub current_volume: u32,
    pub predicted_volume_15m: u32,
    pub delta_volume: i64,
    pub congestion_risk_percent: f64,
    pub risk_label: RiskLabel,
    /// `HH:MM` of the simulated clock at the forecast horizon.
    pub peak_forecast_time: String,
    pub confidence_percent: u8,
    pub forecast: Forecast,
    /// One point per forecast horizon (15m, 2h, 4h), shortest first.
    pub horizons: Vec<HorizonPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorizonPoint {
    /// `"15m"`, `"2h"` or `"4h"`.
    pub label: String,
    pub horizon_minutes: u32,
    pub timestamp: DateTime<FixedOffset>,
    pub current_volume: u32,
    pub predicted_volume: u32,
    pub congestion_threshold: f64,
    pub congestion_detected: bool,
}

// ─── Decision log ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HumanAction {
    Applied,
    Rejected,
    ManualOverride,
    Reverted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionLogEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub intersection_id: String,
    pub location_name: String,
    pub recommendation_id: Option<String>,
    pub action: HumanAction,
    pub approach: Option<Approach>,
    pub requested_delta_seconds: i32,
    pub applied_delta_seconds: i32,
    pub outcome: String,
}

// ─── Intersection read model ─────────────────────────────────────────────────

/// Whole-unit view of one intersection, replaced atomically every tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntersectionState {
    pub intersection_id: String,
    pub location_name: String,
    pub city: String,
    pub plan: SignalPlan,
    pub baseline: SignalPlan,
    pub metrics: Option<MetricsSnapshot>,
    pub prediction: Option<Prediction>,
    pub mode: FailsafeMode,
    pub last_adjusted_at: Option<DateTime<FixedOffset>>,
}
