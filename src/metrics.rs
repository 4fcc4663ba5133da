// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Traffic Metrics

use crate::types::{Approach, FlowLabel, RiskLabel};

const FREE_FLOW_LABEL_MIN_KMH: f64 = 45.0;
const MODERATE_FLOW_LABEL_MIN_KMH: f64 = 25.0;

const RISK_CRITICAL_PERCENT: f64 = 90.0;
const RISK_HIGH_PERCENT: f64 = 76.0;
const RISK_MODERATE_PERCENT: f64 = 50.0;

// ---------------------------------------------------------------------------
// Queue-derived metrics
// ---------------------------------------------------------------------------

/// Total queue normalised to `max_queue_per_approach × 4`, clamped to [0, 100].
pub fn density_percent(total_queue: u32, max_queue_per_approach: u32) -> f64 {
    let capacity = f64::from(max_queue_per_approach) * f64::from(Approach::COUNT);
    if capacity <= 0.0 {
        return 100.0;
    }
    (f64::from(total_queue) / capacity * 100.0).clamp(0.0, 100.0)
}

/// Greenshields linear speed-density: 0 % → free flow, 100 % → jam speed.
pub fn speed_kmh(density_percent: f64, free_flow_kmh: f64, jam_kmh: f64) -> f64 {
    let d = density_percent.clamp(0.0, 100.0);
    (free_flow_kmh - (free_flow_kmh - jam_kmh) * d / 100.0).clamp(jam_kmh, free_flow_kmh)
}

/// Minutes to clear the queue at this tick's departure rate (floored at one
/// vehicle per minute).
pub fn wait_time_minutes(total_queue: u32, departures: u32, minutes_per_tick: u32) -> f64 {
    let rate = (f64::from(departures) / f64::from(minutes_per_tick.max(1))).max(1.0);
    f64::from(total_queue) / rate
}

pub fn flow_rate_per_minute(arrivals: u32, minutes_per_tick: u32) -> f64 {
    f64::from(arrivals) / f64::from(minutes_per_tick.max(1))
}

/// Arrivals scaled to a per-cycle count: `arrivals × max(1, cycle / tick)`.
pub fn volume_per_cycle(arrivals: u32, cycle_seconds: u32, minutes_per_tick: u32) -> u32 {
    let tick_seconds = minutes_per_tick.max(1) * 60;
    arrivals * (cycle_seconds / tick_seconds).max(1)
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

pub fn flow_label(speed_kmh: f64) -> FlowLabel {
    if speed_kmh >= FREE_FLOW_LABEL_MIN_KMH {
        FlowLabel::FreeFlow
    } else if speed_kmh >= MODERATE_FLOW_LABEL_MIN_KMH {
        FlowLabel::ModerateFlow
    } else {
        FlowLabel::SlowTraffic
    }
}

pub fn risk_label(risk_percent: f64) -> RiskLabel {
    if risk_percent >= RISK_CRITICAL_PERCENT {
        RiskLabel::Critical
    } else if risk_percent >= RISK_HIGH_PERCENT {
        RiskLabel::High
    } else if risk_percent >= RISK_MODERATE_PERCENT {
        RiskLabel::Moderate
    } else {
        RiskLabel::Smooth
    }
}

// ---------------------------------------------------------------------------
// Capacity estimates
// ---------------------------------------------------------------------------

/// Volume the intersection would carry at 100 % density, inferred from the
/// current volume and density. Empty queues assume twice the current volume.
pub fn capacity_volume(current_volume: u32, density_percent: f64) -> f64 {
    if density_percent > 0.0 {
        f64::from(current_volume) / (density_percent / 100.0).max(0.01)
    } else {
        f64::from(current_volume) * 2.0
    }
}

pub fn congestion_threshold(current_volume: u32, density_percent: f64, alert_percent: f64) -> f64 {
    capacity_volume(current_volume, density_percent) * alert_percent / 100.0
}

/// Predicted volume as a share of capacity, capped at 100.
pub fn congestion_risk_percent(predicted_volume: u32, current_volume: u32, density_percent: f64) -> f64 {
    let capacity = capacity_volume(current_volume, density_percent).max(1.0);
    (f64::from(predicted_volume) / capacity * 100.0).min(100.0)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn density_normalises_and_clamps() {
        assert_relative_eq!(density_percent(0, 80), 0.0);
        assert_relative_eq!(density_percent(160, 80), 50.0);
        assert_relative_eq!(density_percent(480, 80), 100.0);
    }

    #[test]
    fn speed_is_linear_between_free_and_jam() {
        assert_relative_eq!(speed_kmh(0.0, 60.0, 10.0), 60.0);
        assert_relative_eq!(speed_kmh(50.0, 60.0, 10.0), 35.0);
        assert_relative_eq!(speed_kmh(100.0, 60.0, 10.0), 10.0);
        assert_relative_eq!(speed_kmh(140.0, 60.0, 10.0), 10.0);
    }

    #[test]
    fn wait_time_floors_departure_rate() {
        assert_relative_eq!(wait_time_minutes(30, 0, 1), 30.0);
        assert_relative_eq!(wait_time_minutes(30, 60, 1), 0.5);
        assert_relative_eq!(wait_time_minutes(30, 60, 2), 1.0);
    }

    #[test]
    fn volume_scales_by_ticks_per_cycle() {
        assert_eq!(volume_per_cycle(70, 150, 1), 140);
        assert_eq!(volume_per_cycle(70, 90, 1), 70);
        assert_eq!(volume_per_cycle(70, 150, 5), 70);
    }

    #[test]
    fn labels_follow_thresholds() {
        assert_eq!(flow_label(60.0), FlowLabel::FreeFlow);
        assert_eq!(flow_label(45.0), FlowLabel::FreeFlow);
        assert_eq!(flow_label(30.0), FlowLabel::ModerateFlow);
        assert_eq!(flow_label(10.0), FlowLabel::SlowTraffic);
        assert_eq!(risk_label(95.0), RiskLabel::Critical);
        assert_eq!(risk_label(80.0), RiskLabel::High);
        assert_eq!(risk_label(50.0), RiskLabel::Moderate);
        assert_eq!(risk_label(10.0), RiskLabel::Smooth);
    }

    #[test]
    fn threshold_uses_inferred_capacity() {
        // 50 % density at volume 100 → capacity 200 → 80 % threshold 160.
        assert_relative_eq!(congestion_threshold(100, 50.0, 80.0), 160.0);
        // Empty queue → capacity assumed 2× volume.
        assert_relative_eq!(congestion_threshold(100, 0.0, 80.0), 160.0);
        assert_relative_eq!(congestion_risk_percent(150, 100, 50.0), 75.0);
        assert_relative_eq!(congestion_risk_percent(500, 100, 50.0), 100.0);
    }
}
