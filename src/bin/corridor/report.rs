// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Run Summary

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use corridor_engine::{
    ApproachMap, FailsafeMode, IntersectionRegistry, IntersectionState, SystemStatus, TickReport,
};
use corridor_engine::registry::StepOutcome;
use serde::Serialize;

// ─── Statistics ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        Self {
            mean,
            std_dev: variance.sqrt(),
            min: samples.iter().cloned().fold(f64::INFINITY, f64::min),
            max: samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }
}

// ─── Per-intersection accumulation ──────────────────────────────────────────

#[derive(Debug, Default)]
struct Samples {
    density: Vec<f64>,
    total_queue: Vec<f64>,
    wait_minutes: Vec<f64>,
    failed_ticks: u32,
    fallback_ticks: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntersectionSummary {
    pub intersection_id: String,
    pub location_name: String,
    pub density_percent: Stats,
    pub total_queue: Stats,
    pub wait_time_minutes: Stats,
    pub failed_ticks: u32,
    pub fallback_ticks: u32,
    pub final_mode: FailsafeMode,
    pub final_greens: ApproachMap<u32>,
    pub baseline_greens: ApproachMap<u32>,
}

#[derive(Debug, Default)]
pub struct SummaryCollector {
    samples: BTreeMap<String, Samples>,
    ticks: u64,
    peak_recommendations: usize,
}

impl SummaryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, report: &TickReport, states: &[std::sync::Arc<IntersectionState>]) {
        self.peak_recommendations = self.peak_recommendations.max(report.recommendations);
        for outcome in &report.intersections {
            let s = self.samples.entry(outcome.intersection_id.clone()).or_default();
            if matches!(outcome.outcome, StepOutcome::Failed(_)) {
                s.failed_ticks += 1;
            }
            if outcome.mode == FailsafeMode::LocalFallback {
                s.fallback_ticks += 1;
            }
        }
        self.observe_states(report.tick, states);
    }

    /// Sample the published states whose metrics come from `tick`.
    pub fn observe_states(&mut self, tick: u64, states: &[std::sync::Arc<IntersectionState>]) {
        self.ticks = self.ticks.max(tick + 1);
        for state in states {
            let Some(m) = state.metrics.as_ref().filter(|m| m.tick == tick) else {
                continue;
            };
            let s = self.samples.entry(state.intersection_id.clone()).or_default();
            s.density.push(m.density_percent);
            s.total_queue.push(f64::from(m.total_queue));
            s.wait_minutes.push(m.wait_time_minutes);
        }
    }

    /// Sample the last completed tick of a registry driven elsewhere.
    pub fn observe_latest(&mut self, registry: &IntersectionRegistry) {
        if let Some(tick) = registry.tick_count().checked_sub(1) {
            self.observe_states(tick, &registry.snapshots());
        }
    }

    pub fn finish(
        self,
        seed: u64,
        live: bool,
        states: &[std::sync::Arc<IntersectionState>],
        status: &SystemStatus,
    ) -> RunSummary {
        let intersections = states
            .iter()
            .map(|state| {
                let s = self.samples.get(&state.intersection_id);
                let stats = |f: fn(&Samples) -> &Vec<f64>| {
                    Stats::from_samples(s.map_or(&[][..], |s| f(s).as_slice()))
                };
                IntersectionSummary {
                    intersection_id: state.intersection_id.clone(),
                    location_name: state.location_name.clone(),
                    density_percent: stats(|s| &s.density),
                    total_queue: stats(|s| &s.total_queue),
                    wait_time_minutes: stats(|s| &s.wait_minutes),
                    failed_ticks: s.map_or(0, |s| s.failed_ticks),
                    fallback_ticks: s.map_or(0, |s| s.fallback_ticks),
                    final_mode: state.mode,
                    final_greens: state.plan.greens(),
                    baseline_greens: state.baseline.greens(),
                }
            })
            .collect();
        RunSummary {
            generated_at: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
            prng: "ChaCha8Rng",
            seed,
            live,
            ticks: self.ticks,
            peak_recommendations: self.peak_recommendations,
            final_status: status.clone(),
            intersections,
        }
    }
}

// ─── Report ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub seed: u64,
    pub live: bool,
    pub ticks: u64,
    pub peak_recommendations: usize,
    pub final_status: SystemStatus,
    pub intersections: Vec<IntersectionSummary>,
}

impl RunSummary {
    pub fn print(&self) {
        println!("  {:<12} {:>9} {:>9} {:>8} {:>7} {:>9}  {}",
            "Intersection", "Density%", "Queue", "Wait", "Failed", "Fallback", "Greens N/E/S/W");
        println!("  {}", "-".repeat(84));
        for ix in &self.intersections {
            let g = &ix.final_greens;
            println!("  {:<12} {:>9.1} {:>9.1} {:>7.1}m {:>7} {:>9}  {}/{}/{}/{}",
                ix.intersection_id,
                ix.density_percent.mean,
                ix.total_queue.mean,
                ix.wait_time_minutes.mean,
                ix.failed_ticks,
                ix.fallback_ticks,
                g.n, g.e, g.s, g.w,
            );
        }
        println!("  {}", "-".repeat(84));
        println!("  Ticks: {}  Peak recommendations: {}  Status: {}\n",
            self.ticks, self.peak_recommendations, self.final_status.message);
    }

    /// Write under `dir` as `corridor-<millis>.json`.
    pub fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("corridor-{}.json", chrono::Utc::now().timestamp_millis()));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corridor_engine::failsafe::ManualClock;
    use corridor_engine::CorridorConfig;
    use std::sync::Arc;

    fn registry() -> IntersectionRegistry {
        IntersectionRegistry::builder(CorridorConfig::default())
            .clock(Arc::new(ManualClock::starting_monday()))
            .build()
            .unwrap()
    }

    #[test]
    fn stats_from_samples() {
        let s = Stats::from_samples(&[2.0, 4.0, 6.0]);
        assert_eq!(s.mean, 4.0);
        assert_eq!((s.min, s.max, s.n), (2.0, 6.0, 3));
        assert_eq!(s.std_dev, 2.0);
        assert_eq!(Stats::from_samples(&[]).n, 0);
    }

    #[test]
    fn headless_observation_counts_every_tick() {
        let reg = registry();
        let mut summary = SummaryCollector::new();
        for _ in 0..5 {
            let report = reg.tick();
            summary.observe(&report, &reg.snapshots());
        }
        let run = summary.finish(42, false, &reg.snapshots(), &reg.status());
        assert_eq!(run.ticks, 5);
        assert_eq!(run.intersections[0].density_percent.n, 5);
        assert_eq!(run.intersections[0].failed_ticks, 0);
    }

    #[test]
    fn latest_observation_samples_final_state() {
        let reg = registry();
        let mut summary = SummaryCollector::new();
        summary.observe_latest(&reg);
        for _ in 0..3 {
            reg.tick();
        }
        summary.observe_latest(&reg);
        let run = summary.finish(42, true, &reg.snapshots(), &reg.status());
        assert_eq!(run.ticks, 3);
        assert_eq!(run.intersections[0].total_queue.n, 1);
    }
}
