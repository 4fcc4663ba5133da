// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Configuration

//! JSON-loaded configuration for the whole corridor.
//!
//! Every section carries defaults matching the deployed Surabaya corridor, so
//! a config file only needs to name what it overrides. `validate` runs after
//! every load; a config that passes it can build every intersection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::types::{Approach, ApproachMap};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("min green must be at least 1s")]
    ZeroMinGreen,
    #[error("min green {min}s exceeds max green {max}s")]
    MinAboveMax { min: u32, max: u32 },
    #[error("baseline green for {approach} is {green}s, outside [{min}s, {max}s]")]
    BaselineOutOfBounds {
        approach: Approach,
        green: u32,
        min: u32,
        max: u32,
    },
    #[error("green budget {budget}s cannot hold four minimum greens of {min}s")]
    BudgetTooSmall { budget: u32, min: u32 },
    #[error("clearance {clearance}s leaves no green time in a {cycle}s cycle")]
    ClearanceTooLong { clearance: u32, cycle: u32 },
    #[error("minutes_per_tick must be nonzero")]
    ZeroMinutesPerTick,
    #[error("demand ramp_ticks must be nonzero")]
    ZeroRampTicks,
    #[error("timeline capacity must be nonzero")]
    ZeroTimelineCapacity,
    #[error("max queue per approach must be nonzero and at most the hard cap")]
    InvalidQueueBounds,
    #[error("jam speed {jam} km/h must be below free-flow speed {free} km/h")]
    InvalidSpeeds { free: f64, jam: f64 },
    #[error("utc offset of {0} minutes is out of range")]
    InvalidUtcOffset(i32),
    #[error("at least one intersection must be configured")]
    NoIntersections,
    #[error("duplicate intersection id '{0}'")]
    DuplicateIntersection(String),
    #[error("forecast mode is 'model' but no forecast model was supplied")]
    ModelUnavailable,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Cycle, clearance and green bounds shared by every intersection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub cycle_seconds: u32,
    /// Yellow per approach. The safety budget also subtracts it once.
    pub clearance_seconds: u32,
    pub min_green_seconds: u32,
    pub max_green_seconds: u32,
    pub baseline_greens: ApproachMap<u32>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_seconds: 150,
            clearance_seconds: 5,
            min_green_seconds: 20,
            max_green_seconds: 70,
            baseline_greens: ApproachMap { n: 45, e: 20, s: 45, w: 20 },
        }
    }
}

impl TimingConfig {
    /// Total green any plan may use: cycle minus clearance.
    pub fn green_budget(&self, cycle_seconds: u32) -> u32 {
        cycle_seconds.saturating_sub(self.clearance_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApproachConfig {
    pub lanes: ApproachMap<u32>,
    /// Vehicles per hour per lane under continuous green.
    pub saturation_flow_per_lane: f64,
}

impl Default for ApproachConfig {
    fn default() -> Self {
        Self {
            lanes: ApproachMap { n: 3, e: 2, s: 3, w: 2 },
            saturation_flow_per_lane: 1900.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemandConfig {
    /// Vehicles per tick at full peak.
    pub peak_arrivals: ApproachMap<f64>,
    pub off_peak_fraction: f64,
    pub ramp_ticks: u64,
    pub noise_fraction: f64,
    pub seed: u64,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            peak_arrivals: ApproachMap { n: 28.0, e: 14.0, s: 28.0, w: 14.0 },
            off_peak_fraction: 0.35,
            ramp_ticks: 120,
            noise_fraction: 0.12,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub minutes_per_tick: u32,
    /// Queue depth that counts as 100 % density, per approach.
    pub max_queue_per_approach: u32,
    pub queue_hard_cap: u32,
    pub free_flow_speed_kmh: f64,
    pub jam_speed_kmh: f64,
    pub timeline_capacity: usize,
    /// Offset applied to every emitted timestamp. Defaults to WIB (+07:00).
    pub utc_offset_minutes: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            minutes_per_tick: 1,
            max_queue_per_approach: 80,
            queue_hard_cap: 120,
            free_flow_speed_kmh: 60.0,
            jam_speed_kmh: 10.0,
            timeline_capacity: 600,
            utc_offset_minutes: 7 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RulesConfig {
    pub alert_threshold_percent: f64,
    pub max_delta_seconds: u32,
    pub top_n: usize,
    /// Preferred target when queues tie.
    pub mainline_approach: Approach,
    pub default_confidence_percent: u8,
    pub advisory_enabled: bool,
    pub advisory_density_split_percent: f64,
    pub advisory_low_delta_seconds: u32,
    pub advisory_high_delta_seconds: u32,
    /// Largest |delta| accepted from a manual override.
    pub max_manual_delta_seconds: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            alert_threshold_percent: 80.0,
            max_delta_seconds: 20,
            top_n: 3,
            mainline_approach: Approach::S,
            default_confidence_percent: 95,
            advisory_enabled: true,
            advisory_density_split_percent: 70.0,
            advisory_low_delta_seconds: 5,
            advisory_high_delta_seconds: 8,
            max_manual_delta_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FailsafeConfig {
    pub stale_seconds: u64,
}

impl Default for FailsafeConfig {
    fn default() -> Self {
        Self { stale_seconds: 60 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMode {
    /// An injected model produces the forecast.
    Model,
    /// Built-in statistical baseline over the volume history.
    Persistence,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMethod {
    Persistence,
    SeasonalNaive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecastConfig {
    pub mode: ForecastMode,
    pub baseline: BaselineMethod,
    /// Bounded volume history kept per intersection, in ticks.
    pub history_ticks: usize,
    pub seasonal_ticks: u64,
    pub horizon_15m_minutes: u32,
    pub horizon_2h_minutes: u32,
    pub horizon_4h_minutes: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            mode: ForecastMode::Persistence,
            baseline: BaselineMethod::Persistence,
            history_ticks: 7 * 24 * 60,
            seasonal_ticks: 10_080,
            horizon_15m_minutes: 15,
            horizon_2h_minutes: 120,
            horizon_4h_minutes: 240,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeatherConfig {
    pub refresh_seconds: u64,
    pub default_temperature_c: f64,
    pub default_condition: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            refresh_seconds: 600,
            default_temperature_c: 31.0,
            default_condition: "Rain".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    pub tick_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { tick_interval_ms: 2000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntersectionConfig {
    pub intersection_id: String,
    pub location_name: String,
    #[serde(default)]
    pub city: String,
    /// Demand seed override. Defaults to `demand.seed`.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Baseline override. Defaults to `timing.baseline_greens`.
    #[serde(default)]
    pub baseline_greens: Option<ApproachMap<u32>>,
}

// ---------------------------------------------------------------------------
// CorridorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorridorConfig {
    pub timing: TimingConfig,
    pub approaches: ApproachConfig,
    pub demand: DemandConfig,
    pub simulation: SimulationConfig,
    pub rules: RulesConfig,
    pub failsafe: FailsafeConfig,
    pub forecast: ForecastConfig,
    pub weather: WeatherConfig,
    pub driver: DriverConfig,
    pub intersections: Vec<IntersectionConfig>,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            approaches: ApproachConfig::default(),
            demand: DemandConfig::default(),
            simulation: SimulationConfig::default(),
            rules: RulesConfig::default(),
            failsafe: FailsafeConfig::default(),
            forecast: ForecastConfig::default(),
            weather: WeatherConfig::default(),
            driver: DriverConfig::default(),
            intersections: vec![IntersectionConfig {
                intersection_id: "SUR-4092".to_string(),
                location_name: "Jl. Soedirman, Surabaya".to_string(),
                city: "Surabaya".to_string(),
                seed: None,
                baseline_greens: None,
            }],
        }
    }
}

impl CorridorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        if t.min_green_seconds == 0 {
            return Err(ConfigError::ZeroMinGreen);
        }
        if t.min_green_seconds > t.max_green_seconds {
            return Err(ConfigError::MinAboveMax {
                min: t.min_green_seconds,
                max: t.max_green_seconds,
            });
        }
        if t.clearance_seconds >= t.cycle_seconds {
            return Err(ConfigError::ClearanceTooLong {
                clearance: t.clearance_seconds,
                cycle: t.cycle_seconds,
            });
        }
        let budget = t.green_budget(t.cycle_seconds);
        if t.min_green_seconds * Approach::COUNT > budget {
            return Err(ConfigError::BudgetTooSmall {
                budget,
                min: t.min_green_seconds,
            });
        }
        self.check_baseline(&t.baseline_greens)?;

        let sim = &self.simulation;
        if sim.minutes_per_tick == 0 {
            return Err(ConfigError::ZeroMinutesPerTick);
        }
        if sim.timeline_capacity == 0 {
            return Err(ConfigError::ZeroTimelineCapacity);
        }
        if sim.max_queue_per_approach == 0 || sim.max_queue_per_approach > sim.queue_hard_cap {
            return Err(ConfigError::InvalidQueueBounds);
        }
        if !(sim.jam_speed_kmh >= 0.0 && sim.jam_speed_kmh < sim.free_flow_speed_kmh) {
            return Err(ConfigError::InvalidSpeeds {
                free: sim.free_flow_speed_kmh,
                jam: sim.jam_speed_kmh,
            });
        }
        self.utc_offset()?;

        if self.demand.ramp_ticks == 0 {
            return Err(ConfigError::ZeroRampTicks);
        }

        if self.intersections.is_empty() {
            return Err(ConfigError::NoIntersections);
        }
        let mut seen = HashSet::new();
        for ix in &self.intersections {
            if !seen.insert(ix.intersection_id.as_str()) {
                return Err(ConfigError::DuplicateIntersection(ix.intersection_id.clone()));
            }
            if let Some(baseline) = &ix.baseline_greens {
                self.check_baseline(baseline)?;
            }
        }
        Ok(())
    }

    fn check_baseline(&self, greens: &ApproachMap<u32>) -> Result<(), ConfigError> {
        let (min, max) = (self.timing.min_green_seconds, self.timing.max_green_seconds);
        for (approach, &green) in greens.iter() {
            if green < min || green > max {
                return Err(ConfigError::BaselineOutOfBounds { approach, green, min, max });
            }
        }
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        let minutes = self.simulation.utc_offset_minutes;
        FixedOffset::east_opt(minutes * 60).ok_or(ConfigError::InvalidUtcOffset(minutes))
    }

    /// Horizon in ticks, never less than one tick.
    pub fn horizon_ticks(&self, minutes: u32) -> u64 {
        u64::from((minutes / self.simulation.minutes_per_tick.max(1)).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let config = CorridorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.utc_offset().unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(config.timing.green_budget(150), 145);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = CorridorConfig::from_json_str(
            r#"{ "rules": { "alert_threshold_percent": 75.0 }, "failsafe": { "stale_seconds": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.rules.alert_threshold_percent, 75.0);
        assert_eq!(config.rules.max_delta_seconds, 20);
        assert_eq!(config.failsafe.stale_seconds, 5);
        assert_eq!(config.intersections.len(), 1);
    }

    #[test]
    fn rejects_min_above_max() {
        let mut config = CorridorConfig::default();
        config.timing.min_green_seconds = 80;
        assert!(matches!(config.validate(), Err(ConfigError::MinAboveMax { min: 80, max: 70 })));
    }

    #[test]
    fn rejects_baseline_outside_bounds() {
        let mut config = CorridorConfig::default();
        config.timing.baseline_greens.e = 10;
        match config.validate() {
            Err(ConfigError::BaselineOutOfBounds { approach, green, .. }) => {
                assert_eq!(approach, Approach::E);
                assert_eq!(green, 10);
            }
            other => panic!("expected baseline error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_intersections() {
        let mut config = CorridorConfig::default();
        let dup = config.intersections[0].clone();
        config.intersections.push(dup);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateIntersection(id)) if id == "SUR-4092"));
    }

    #[test]
    fn rejects_unknown_mainline_approach() {
        let err = CorridorConfig::from_json_str(r#"{ "rules": { "mainline_approach": "X" } }"#);
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn horizon_ticks_scale_with_tick_length() {
        let mut config = CorridorConfig::default();
        assert_eq!(config.horizon_ticks(15), 15);
        config.simulation.minutes_per_tick = 5;
        assert_eq!(config.horizon_ticks(15), 3);
        assert_eq!(config.horizon_ticks(2), 1);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "driver": {{ "tick_interval_ms": 250 }} }}"#).unwrap();
        let config = CorridorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.driver.tick_interval_ms, 250);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        match CorridorConfig::from_json_file(&path) {
            Err(ConfigError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
