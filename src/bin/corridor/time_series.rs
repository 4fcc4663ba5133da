// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Per-Tick JSONL Recorder

use std::io::{BufWriter, Write};
use std::path::Path;

use corridor_engine::{ApproachMap, FailsafeMode, FlowLabel, IntersectionRegistry, IntersectionState, RiskLabel};
use serde::Serialize;

/// One line per intersection per tick.
#[derive(Debug, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub timestamp: String,
    pub intersection_id: String,
    pub mode: FailsafeMode,
    pub greens: ApproachMap<u32>,
    pub cycle_seconds: u32,
    pub current_volume: u32,
    pub total_queue: u32,
    pub queue_per_approach: ApproachMap<u32>,
    pub density_percent: f64,
    pub avg_speed_kmh: f64,
    pub wait_time_minutes: f64,
    pub flow_label: FlowLabel,
    pub predicted_volume_15m: Option<u32>,
    pub congestion_risk_percent: Option<f64>,
    pub risk_label: Option<RiskLabel>,
}

impl TickSnapshot {
    /// `None` until the intersection has completed a tick.
    pub fn from_state(state: &IntersectionState) -> Option<Self> {
        let metrics = state.metrics.as_ref()?;
        let prediction = state.prediction.as_ref();
        Some(Self {
            tick: metrics.tick,
            timestamp: metrics.timestamp.to_rfc3339(),
            intersection_id: state.intersection_id.clone(),
            mode: state.mode,
            greens: state.plan.greens(),
            cycle_seconds: state.plan.cycle_seconds(),
            current_volume: metrics.current_volume,
            total_queue: metrics.total_queue,
            queue_per_approach: metrics.queue_per_approach.clone(),
            density_percent: metrics.density_percent,
            avg_speed_kmh: metrics.avg_speed_kmh,
            wait_time_minutes: metrics.wait_time_minutes,
            flow_label: metrics.flow_label,
            predicted_volume_15m: prediction.map(|p| p.predicted_volume_15m),
            congestion_risk_percent: prediction.map(|p| p.congestion_risk_percent),
            risk_label: prediction.map(|p| p.risk_label),
        })
    }
}

#[derive(Default)]
pub struct TimeSeriesRecorder {
    snapshots: Vec<TickSnapshot>,
}

impl TimeSeriesRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the published states, skipping any whose metrics are not from
    /// `tick` (a failed intersection keeps last tick's metrics).
    pub fn record(&mut self, tick: u64, states: &[std::sync::Arc<IntersectionState>]) {
        self.snapshots.extend(
            states
                .iter()
                .filter_map(|s| TickSnapshot::from_state(s))
                .filter(|s| s.tick == tick),
        );
    }

    /// Record the states published by the last completed tick, if any.
    pub fn record_latest(&mut self, registry: &IntersectionRegistry) {
        if let Some(tick) = registry.tick_count().checked_sub(1) {
            self.record(tick, &registry.snapshots());
        }
    }

    pub fn write_jsonl(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(std::fs::File::create(path)?);
        for snapshot in &self.snapshots {
            serde_json::to_writer(&mut out, snapshot)?;
            writeln!(out)?;
        }
        out.flush()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
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
    fn latest_records_last_completed_tick() {
        let reg = registry();
        let mut rec = TimeSeriesRecorder::new();
        rec.record_latest(&reg);
        assert_eq!(rec.len(), 0);

        for _ in 0..3 {
            reg.tick();
        }
        rec.record_latest(&reg);
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.snapshots[0].tick, 2);
    }

    #[test]
    fn writes_one_line_per_snapshot() {
        let reg = registry();
        let mut rec = TimeSeriesRecorder::new();
        for _ in 0..4 {
            let report = reg.tick();
            rec.record(report.tick, &reg.snapshots());
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/ticks.jsonl");
        rec.write_jsonl(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        let last: serde_json::Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(last["tick"], 3);
        assert_eq!(last["intersection_id"], "SUR-4092");
    }
}
