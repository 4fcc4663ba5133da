// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Intersection Simulator

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::config::{ApproachConfig, CorridorConfig, SimulationConfig};
use crate::controller::SignalController;
use crate::demand::DemandGenerator;
use crate::metrics;
use crate::types::*;

// ─── IntersectionSimulator ───────────────────────────────────────────────────

/// Queue dynamics for one intersection.
///
/// Each tick, every approach discharges at most its saturation capacity for
/// the current green share; the rest stays queued up to a hard cap. The
/// simulator owns its controller, so plan changes take effect on the next
/// `step`.
#[derive(Debug, Clone)]
pub struct IntersectionSimulator {
    intersection_id: String,
    controller: SignalController,
    demand: DemandGenerator,
    queue: ApproachMap<u32>,
    weather: Weather,
    approaches: ApproachConfig,
    sim: SimulationConfig,
}

impl IntersectionSimulator {
    pub fn new(
        intersection_id: impl Into<String>,
        controller: SignalController,
        demand: DemandGenerator,
        config: &CorridorConfig,
    ) -> Self {
        Self {
            intersection_id: intersection_id.into(),
            controller,
            demand,
            queue: ApproachMap::default(),
            weather: Weather {
                temperature_c: config.weather.default_temperature_c,
                condition: config.weather.default_condition.clone(),
            },
            approaches: config.approaches.clone(),
            sim: config.simulation.clone(),
        }
    }

    /// Convenience constructor seeding demand from `demand.seed` and the
    /// timing baseline.
    pub fn from_config(
        intersection_id: impl Into<String>,
        config: &CorridorConfig,
    ) -> Result<Self, crate::safety::PlanViolations> {
        let controller = SignalController::new(&config.timing, config.timing.baseline_greens)?;
        let demand = DemandGenerator::new(config.demand.clone());
        Ok(Self::new(intersection_id, controller, demand, config))
    }

    // ─── Step ───────────────────────────────────────────────────────────

    pub fn step(&mut self, tick: u64, timestamp: DateTime<FixedOffset>) -> MetricsSnapshot {
        let arrivals = self.demand.arrivals(tick);
        let plan = self.controller.plan();

        let mut total_arrivals = 0u32;
        let mut total_departures = 0u32;
        for approach in Approach::ALL {
            let capacity = self.service_capacity(approach, &plan);
            let demand = self.queue[approach] + arrivals[approach];
            let departures = f64::from(demand).min(capacity).floor() as u32;
            self.queue[approach] = (demand - departures).min(self.sim.queue_hard_cap);
            total_arrivals += arrivals[approach];
            total_departures += departures;
        }

        debug!(
            intersection = %self.intersection_id,
            tick,
            arrivals = total_arrivals,
            departures = total_departures,
            queue = self.queue.total(),
            "intersection stepped"
        );
        self.snapshot(tick, timestamp, total_arrivals, total_departures, plan.cycle_seconds())
    }

    /// Vehicles `approach` can discharge in one tick:
    /// `sat_flow × lanes × (green / cycle) × (minutes_per_tick / 60)`.
    pub fn service_capacity(&self, approach: Approach, plan: &SignalPlan) -> f64 {
        let lanes = f64::from(self.approaches.lanes[approach]);
        let green_ratio = f64::from(plan.green(approach)) / f64::from(plan.cycle_seconds().max(1));
        self.approaches.saturation_flow_per_lane
            * lanes
            * green_ratio
            * f64::from(self.sim.minutes_per_tick)
            / 60.0
    }

    fn snapshot(
        &self,
        tick: u64,
        timestamp: DateTime<FixedOffset>,
        arrivals: u32,
        departures: u32,
        cycle_seconds: u32,
    ) -> MetricsSnapshot {
        let mpt = self.sim.minutes_per_tick;
        let total_queue = self.queue.total();
        let density = metrics::density_percent(total_queue, self.sim.max_queue_per_approach);
        let speed = metrics::speed_kmh(density, self.sim.free_flow_speed_kmh, self.sim.jam_speed_kmh);

        MetricsSnapshot {
            tick,
            timestamp,
            current_volume: metrics::volume_per_cycle(arrivals, cycle_seconds, mpt),
            queue_per_approach: self.queue,
            total_queue,
            density_percent: metrics::round_to(density, 1),
            avg_speed_kmh: metrics::round_to(speed, 1),
            wait_time_minutes: metrics::round_to(metrics::wait_time_minutes(total_queue, departures, mpt), 2),
            flow_rate_cars_per_min: metrics::round_to(metrics::flow_rate_per_minute(arrivals, mpt), 2),
            arrivals,
            departures,
            weather: self.weather.clone(),
            accidents_count: 0,
            flow_label: metrics::flow_label(speed),
        }
    }

    // ─── Controller proxy ───────────────────────────────────────────────

    pub fn apply_adjustment(&mut self, approach: Approach, delta: i32) -> SignalPlan {
        self.controller.apply_adjustment(approach, delta)
    }

    pub fn revert_baseline(&mut self) -> SignalPlan {
        self.controller.revert_baseline()
    }

    pub fn controller(&self) -> &SignalController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut SignalController {
        &mut self.controller
    }

    // ─── State ──────────────────────────────────────────────────────────

    pub fn set_weather(&mut self, weather: Weather) {
        self.weather = weather;
    }

    pub fn weather(&self) -> &Weather {
        &self.weather
    }

    pub fn queue(&self) -> ApproachMap<u32> {
        self.queue
    }

    pub fn total_queue(&self) -> u32 {
        self.queue.total()
    }

    /// Overwrite queues (clamped to the hard cap), e.g. to start from a
    /// congested state.
    pub fn set_queue(&mut self, queue: ApproachMap<u32>) {
        let cap = self.sim.queue_hard_cap;
        self.queue = queue.map(|_, &q| q.min(cap));
    }

    pub fn intersection_id(&self) -> &str {
        &self.intersection_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 2, 7, 0, 0)
            .unwrap()
    }

    fn quiet_config() -> CorridorConfig {
        let mut config = CorridorConfig::default();
        config.demand.peak_arrivals = ApproachMap { n: 0.0, e: 0.0, s: 0.0, w: 0.0 };
        config
    }

    #[test]
    fn capacity_matches_saturation_formula() {
        let sim = IntersectionSimulator::from_config("T", &CorridorConfig::default()).unwrap();
        let plan = sim.controller().plan();
        // 1900 × 3 × 45/150 × 1/60 = 28.5
        approx::assert_relative_eq!(sim.service_capacity(Approach::S, &plan), 28.5, epsilon = 1e-9);
        // 1900 × 2 × 20/150 / 60
        approx::assert_relative_eq!(
            sim.service_capacity(Approach::E, &plan),
            1900.0 * 2.0 * 20.0 / 150.0 / 60.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn queue_drains_without_arrivals() {
        let mut sim = IntersectionSimulator::from_config("T", &quiet_config()).unwrap();
        sim.set_queue(ApproachMap { n: 60, e: 30, s: 60, w: 30 });
        let mut last = sim.total_queue();
        for tick in 0..20 {
            let snap = sim.step(tick, ts());
            assert!(snap.total_queue <= last);
            assert_eq!(snap.arrivals, 0);
            last = snap.total_queue;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn queue_respects_hard_cap() {
        let mut config = CorridorConfig::default();
        config.demand.peak_arrivals = ApproachMap { n: 400.0, e: 400.0, s: 400.0, w: 400.0 };
        config.demand.noise_fraction = 0.0;
        let mut sim = IntersectionSimulator::from_config("T", &config).unwrap();
        for tick in 200..230 {
            let snap = sim.step(tick, ts());
            for (_, &q) in snap.queue_per_approach.iter() {
                assert!(q <= 120);
            }
            assert!(snap.density_percent <= 100.0);
            assert!(snap.avg_speed_kmh >= 10.0);
        }
        assert_eq!(sim.total_queue(), 480);
    }

    #[test]
    fn snapshot_echoes_weather_and_zero_accidents() {
        let mut sim = IntersectionSimulator::from_config("T", &CorridorConfig::default()).unwrap();
        sim.set_weather(Weather { temperature_c: 27.5, condition: "Cloudy".into() });
        let snap = sim.step(0, ts());
        assert_eq!(snap.weather.condition, "Cloudy");
        assert_eq!(snap.accidents_count, 0);
        assert_eq!(snap.current_volume, snap.arrivals * 2);
    }

    #[test]
    fn extending_green_drains_faster() {
        let mut config = quiet_config();
        config.demand.noise_fraction = 0.0;
        let mut base = IntersectionSimulator::from_config("A", &config).unwrap();
        let mut extended = base.clone();
        base.set_queue(ApproachMap { n: 0, e: 0, s: 100, w: 0 });
        extended.set_queue(ApproachMap { n: 0, e: 0, s: 100, w: 0 });
        extended.apply_adjustment(Approach::N, -10);
        let s_base = base.controller().current_green(Approach::S);
        let s_ext = extended.controller().current_green(Approach::S);
        assert!(s_ext > s_base);
        base.step(0, ts());
        extended.step(0, ts());
        assert!(extended.queue().s < base.queue().s);
    }
}
