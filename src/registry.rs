// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Intersection Registry

//! The explicitly owned set of intersections and the per-tick pipeline.
//!
//! Each intersection's mutable runtime sits behind its own `Mutex`, so a tick
//! and an operator action on the same intersection never interleave. Read
//! models are immutable `Arc` values swapped whole under `RwLock`; a reader
//! sees the state before or after a tick, never part of one.
//!
//! Lock order: recommendation book → runtime, failsafe → runtime. A runtime
//! lock is never held while taking either of the others.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, CorridorConfig};
use crate::controller::SignalController;
use crate::demand::DemandGenerator;
use crate::failsafe::{Clock, FailsafeMonitor};
use crate::forecast::{self, ForecastError, ForecastModel, Forecaster, Horizons, VolumeHistory};
use crate::metrics;
use crate::rules::{RecommendationBook, RecommendationError, RuleEngine, RuleInput};
use crate::safety::{PlanViolations, SafetyEnvelope};
use crate::simulation::IntersectionSimulator;
use crate::timeline::TimelineBuffer;
use crate::types::*;
use crate::weather::{StaticWeather, WeatherCache, WeatherSource};

const DECISION_LOG_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("intersection '{id}' has an invalid baseline: {source}")]
    Baseline {
        id: String,
        #[source]
        source: PlanViolations,
    },
    #[error("unknown intersection '{0}'")]
    UnknownIntersection(String),
    #[error(transparent)]
    UnknownApproach(#[from] ParseApproachError),
    #[error(transparent)]
    Recommendation(#[from] RecommendationError),
    #[error("manual delta {requested}s exceeds the {max}s limit")]
    DeltaTooLarge { requested: i32, max: u32 },
}

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StepOutcome {
    Stepped,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntersectionOutcome {
    pub intersection_id: String,
    pub outcome: StepOutcome,
    pub mode: FailsafeMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp: DateTime<FixedOffset>,
    pub intersections: Vec<IntersectionOutcome>,
    pub recommendations: usize,
}

impl TickReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.intersections.iter().filter_map(|o| match &o.outcome {
            StepOutcome::Failed(reason) => Some((o.intersection_id.as_str(), reason.as_str())),
            StepOutcome::Stepped => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Per-intersection runtime
// ---------------------------------------------------------------------------

struct IntersectionRuntime {
    sim: IntersectionSimulator,
    timeline: TimelineBuffer,
    history: VolumeHistory,
    metrics: Option<MetricsSnapshot>,
    prediction: Option<Prediction>,
    mode: FailsafeMode,
    last_adjusted_at: Option<DateTime<FixedOffset>>,
}

struct IntersectionSlot {
    id: String,
    location_name: String,
    city: String,
    runtime: Mutex<IntersectionRuntime>,
    published: RwLock<Arc<IntersectionState>>,
}

impl IntersectionSlot {
    fn publish(&self, rt: &IntersectionRuntime) {
        let state = IntersectionState {
            intersection_id: self.id.clone(),
            location_name: self.location_name.clone(),
            city: self.city.clone(),
            plan: rt.sim.controller().plan(),
            baseline: rt.sim.controller().baseline_plan(),
            metrics: rt.metrics.clone(),
            prediction: rt.prediction.clone(),
            mode: rt.mode,
            last_adjusted_at: rt.last_adjusted_at,
        };
        *write(&self.published) = Arc::new(state);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct RegistryBuilder {
    config: CorridorConfig,
    clock: Option<Arc<dyn Clock>>,
    model: Option<Arc<dyn ForecastModel>>,
    weather: Option<Box<dyn WeatherSource>>,
}

impl RegistryBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn forecast_model(mut self, model: Arc<dyn ForecastModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn weather_source(mut self, source: Box<dyn WeatherSource>) -> Self {
        self.weather = Some(source);
        self
    }

    pub fn build(self) -> Result<IntersectionRegistry, RegistryError> {
        let config = self.config;
        config.validate()?;
        let offset = config.utc_offset()?;
        let forecaster = Forecaster::from_config(&config, self.model)?;
        let clock = self.clock.unwrap_or_else(default_clock);
        let weather_source = self
            .weather
            .unwrap_or_else(|| Box::new(StaticWeather::from_config(&config.weather)));

        let mut slots = Vec::with_capacity(config.intersections.len());
        let mut envelope = None;
        for ix in &config.intersections {
            let baseline = ix.baseline_greens.unwrap_or(config.timing.baseline_greens);
            let controller = SignalController::new(&config.timing, baseline).map_err(|source| {
                RegistryError::Baseline {
                    id: ix.intersection_id.clone(),
                    source,
                }
            })?;
            envelope.get_or_insert(*controller.envelope());
            let demand = DemandGenerator::with_seed(
                ix.seed.unwrap_or(config.demand.seed),
                config.demand.clone(),
            );
            let sim = IntersectionSimulator::new(ix.intersection_id.clone(), controller, demand, &config);
            let runtime = IntersectionRuntime {
                sim,
                timeline: TimelineBuffer::new(config.simulation.timeline_capacity),
                history: VolumeHistory::new(config.forecast.history_ticks),
                metrics: None,
                prediction: None,
                mode: FailsafeMode::LocalFallback,
                last_adjusted_at: None,
            };
            let slot = IntersectionSlot {
                id: ix.intersection_id.clone(),
                location_name: ix.location_name.clone(),
                city: ix.city.clone(),
                runtime: Mutex::new(runtime),
                published: RwLock::new(Arc::new(placeholder_state())),
            };
            slot.publish(&lock(&slot.runtime));
            slots.push(slot);
        }

        let envelope = envelope
            .unwrap_or_else(|| SafetyEnvelope::for_cycle(&config.timing, config.timing.cycle_seconds));
        let rules = RuleEngine::new(config.rules.clone(), envelope, config.simulation.minutes_per_tick);
        let now = clock.wall_time().with_timezone(&offset);
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        info!(
            intersections = slots.len(),
            forecaster = %forecaster.name(),
            "corridor registry ready"
        );

        Ok(IntersectionRegistry {
            horizons: Horizons::from_config(&config),
            failsafe: Mutex::new(FailsafeMonitor::new(clock.clone(), config.failsafe.stale_seconds)),
            weather: Mutex::new(WeatherCache::new(weather_source, &config.weather)),
            config,
            offset,
            clock,
            rules,
            forecaster,
            slots,
            index,
            book: RwLock::new(RecommendationBook::new()),
            status: RwLock::new(Arc::new(SystemStatus {
                operational: true,
                mode: FailsafeMode::LocalFallback,
                live: false,
                message: "Awaiting first tick.".to_string(),
                last_update: now,
            })),
            decision_log: Mutex::new(VecDeque::new()),
            tick: AtomicU64::new(0),
            tick_guard: Mutex::new(()),
            live: AtomicBool::new(false),
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn default_clock() -> Arc<dyn Clock> {
    Arc::new(crate::failsafe::MonotonicClock::new())
}

#[cfg(target_arch = "wasm32")]
fn default_clock() -> Arc<dyn Clock> {
    Arc::new(crate::failsafe::ManualClock::starting_monday())
}

fn placeholder_state() -> IntersectionState {
    let greens = ApproachMap::default();
    IntersectionState {
        intersection_id: String::new(),
        location_name: String::new(),
        city: String::new(),
        plan: SignalPlan::from_greens(&greens, 0),
        baseline: SignalPlan::from_greens(&greens, 0),
        metrics: None,
        prediction: None,
        mode: FailsafeMode::LocalFallback,
        last_adjusted_at: None,
    }
}

// ---------------------------------------------------------------------------
// IntersectionRegistry
// ---------------------------------------------------------------------------

pub struct IntersectionRegistry {
    config: CorridorConfig,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
    rules: RuleEngine,
    forecaster: Forecaster,
    horizons: Horizons,
    slots: Vec<IntersectionSlot>,
    index: HashMap<String, usize>,
    failsafe: Mutex<FailsafeMonitor>,
    weather: Mutex<WeatherCache>,
    book: RwLock<RecommendationBook>,
    status: RwLock<Arc<SystemStatus>>,
    decision_log: Mutex<VecDeque<DecisionLogEntry>>,
    tick: AtomicU64,
    tick_guard: Mutex<()>,
    live: AtomicBool,
}

impl IntersectionRegistry {
    pub fn builder(config: CorridorConfig) -> RegistryBuilder {
        RegistryBuilder {
            config,
            clock: None,
            model: None,
            weather: None,
        }
    }

    pub fn new(config: CorridorConfig) -> Result<Self, RegistryError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &CorridorConfig {
        &self.config
    }

    pub fn intersection_ids(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.id.clone()).collect()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
        let mut status = write(&self.status);
        let mut next = SystemStatus::clone(&status);
        next.live = live;
        *status = Arc::new(next);
    }

    /// Record a corridor-wide failure outside the per-intersection isolation.
    pub fn mark_failed(&self, message: &str) {
        let mut status = write(&self.status);
        *status = Arc::new(SystemStatus {
            operational: false,
            mode: FailsafeMode::LocalFallback,
            live: self.live.load(Ordering::SeqCst),
            message: message.to_string(),
            last_update: self.now(),
        });
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.clock.wall_time().with_timezone(&self.offset)
    }

    fn slot(&self, id: &str) -> Result<&IntersectionSlot, RegistryError> {
        self.index
            .get(id)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| RegistryError::UnknownIntersection(id.to_string()))
    }

    // ─── Tick pipeline ──────────────────────────────────────────────────

    /// Advance every intersection by one tick.
    ///
    /// Order: weather, step + forecast + timeline per intersection, failsafe
    /// for every intersection, corridor-wide recommendations, status. A
    /// failing intersection is reported and skipped; it does not stop the
    /// others. Each intersection is published once, after the failsafe pass.
    /// Concurrent callers are serialized.
    pub fn tick(&self) -> TickReport {
        let _serial = lock(&self.tick_guard);
        let tick = self.tick.fetch_add(1, Ordering::SeqCst);
        let timestamp = self.now();
        let elapsed = self.clock.elapsed();

        let mut outcomes = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let weather = lock(&self.weather).get(&slot.id, elapsed);
            let result = catch_unwind(AssertUnwindSafe(|| self.step_intersection(slot, tick, timestamp, weather)));
            let outcome = match result {
                Ok(Ok(())) => {
                    lock(&self.failsafe).record_tick(&slot.id);
                    StepOutcome::Stepped
                }
                Ok(Err(err)) => {
                    warn!(intersection = %slot.id, tick, error = %err, "intersection tick failed");
                    StepOutcome::Failed(err.to_string())
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    warn!(intersection = %slot.id, tick, panic = %reason, "intersection tick panicked");
                    StepOutcome::Failed(format!("panic: {reason}"))
                }
            };
            outcomes.push((slot, outcome));
        }

        let mut intersections = Vec::with_capacity(outcomes.len());
        {
            let monitor = lock(&self.failsafe);
            for (slot, outcome) in outcomes {
                let mut rt = lock(&slot.runtime);
                let before = rt.sim.controller().is_at_baseline();
                let mode = monitor.check(&slot.id, rt.sim.controller_mut());
                if !before && rt.sim.controller().is_at_baseline() {
                    rt.last_adjusted_at = Some(timestamp);
                }
                rt.mode = mode;
                slot.publish(&rt);
                intersections.push(IntersectionOutcome {
                    intersection_id: slot.id.clone(),
                    outcome,
                    mode,
                });
            }
        }

        let inputs = self.rule_inputs();
        let recommendations = self.rules.generate(&inputs, timestamp);
        let published = recommendations.len();
        write(&self.book).publish(recommendations);

        let report = TickReport {
            tick,
            timestamp,
            intersections,
            recommendations: published,
        };
        self.update_status(&report);
        debug!(tick, recommendations = published, "tick complete");
        report
    }

    /// Step one intersection and commit its metrics and timeline point. A
    /// forecast failure still leaves the step committed (with no prediction)
    /// and is returned so the tick is reported failed. Publishing happens
    /// once per tick, after the failsafe pass.
    fn step_intersection(
        &self,
        slot: &IntersectionSlot,
        tick: u64,
        timestamp: DateTime<FixedOffset>,
        weather: Weather,
    ) -> Result<(), ForecastError> {
        let mut rt = lock(&slot.runtime);
        rt.sim.set_weather(weather);
        let snapshot = rt.sim.step(tick, timestamp);
        rt.history.push(tick, snapshot.current_volume);
        let forecast = self.forecaster.forecast(&rt.history, self.horizons);

        let alert = self.config.rules.alert_threshold_percent;
        let threshold = metrics::congestion_threshold(snapshot.current_volume, snapshot.density_percent, alert);
        rt.timeline.append(TimelinePoint {
            timestamp,
            current_volume: snapshot.current_volume,
            predicted_volume: forecast.as_ref().ok().map(|f| f.predicted_volume_15m),
            congestion_threshold: metrics::round_to(threshold, 1),
            congestion_detected: f64::from(snapshot.current_volume) >= threshold,
        });

        let result = match forecast {
            Ok(forecast) => {
                rt.prediction = Some(forecast::build_prediction(
                    self.forecaster.name(),
                    &snapshot,
                    forecast,
                    &self.config.forecast,
                    alert,
                ));
                Ok(())
            }
            Err(err) => {
                rt.prediction = None;
                Err(err)
            }
        };
        rt.metrics = Some(snapshot);
        result
    }

    fn rule_inputs(&self) -> Vec<RuleInput> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let rt = lock(&slot.runtime);
                let m = rt.metrics.as_ref()?;
                Some(RuleInput {
                    intersection_id: slot.id.clone(),
                    location_name: slot.location_name.clone(),
                    density_percent: m.density_percent,
                    queue_per_approach: m.queue_per_approach,
                    current_greens: rt.sim.controller().greens(),
                    departures_per_tick: m.departures,
                    wait_time_minutes: m.wait_time_minutes,
                    confidence_percent: rt
                        .prediction
                        .as_ref()
                        .map_or(self.config.rules.default_confidence_percent, |p| p.confidence_percent),
                })
            })
            .collect()
    }

    fn update_status(&self, report: &TickReport) {
        let failures: Vec<String> = report
            .failures()
            .map(|(id, reason)| format!("{id}: {reason}"))
            .collect();
        let stale: Vec<&str> = report
            .intersections
            .iter()
            .filter(|o| o.mode == FailsafeMode::LocalFallback)
            .map(|o| o.intersection_id.as_str())
            .collect();

        let status = if !failures.is_empty() {
            SystemStatus {
                operational: false,
                mode: FailsafeMode::LocalFallback,
                live: self.live.load(Ordering::SeqCst),
                message: format!("Tick error: {}", failures.join("; ")),
                last_update: report.timestamp,
            }
        } else if !stale.is_empty() {
            SystemStatus {
                operational: true,
                mode: FailsafeMode::LocalFallback,
                live: self.live.load(Ordering::SeqCst),
                message: format!(
                    "Sensor stale for '{}' (>{}s). Reverted to baseline signal plan.",
                    stale.join("', '"),
                    self.config.failsafe.stale_seconds
                ),
                last_update: report.timestamp,
            }
        } else {
            SystemStatus {
                operational: true,
                mode: FailsafeMode::AiActive,
                live: self.live.load(Ordering::SeqCst),
                message: format!("Tick {}: simulation running.", report.tick),
                last_update: report.timestamp,
            }
        };
        *write(&self.status) = Arc::new(status);
    }

    // ─── Controller surface ─────────────────────────────────────────────

    pub fn plan(&self, id: &str) -> Result<SignalPlan, RegistryError> {
        let slot = self.slot(id)?;
        Ok(read(&slot.published).plan)
    }

    pub fn current_green(&self, id: &str, approach: Approach) -> Result<u32, RegistryError> {
        Ok(self.plan(id)?.green(approach))
    }

    /// Manual override with the approach given as text (`"N"`, `"s"`, ...).
    pub fn manual_override(&self, id: &str, approach: &str, delta: i32) -> Result<SignalPlan, RegistryError> {
        let approach: Approach = approach.parse()?;
        self.apply_adjustment(id, approach, delta)
    }

    /// Operator adjustment. Rejects oversized deltas before touching state;
    /// infeasible ones degrade inside the controller.
    pub fn apply_adjustment(&self, id: &str, approach: Approach, delta: i32) -> Result<SignalPlan, RegistryError> {
        let slot = self.slot(id)?;
        let max = self.config.rules.max_manual_delta_seconds;
        if delta.unsigned_abs() > max {
            return Err(RegistryError::DeltaTooLarge { requested: delta, max });
        }
        let now = self.now();
        let (plan, applied) = {
            let mut rt = lock(&slot.runtime);
            let (plan, applied) = adjust(&mut rt, approach, delta, now);
            slot.publish(&rt);
            (plan, applied)
        };
        self.log_decision(DecisionLogEntry {
            timestamp: now,
            intersection_id: slot.id.clone(),
            location_name: slot.location_name.clone(),
            recommendation_id: None,
            action: HumanAction::ManualOverride,
            approach: Some(approach),
            requested_delta_seconds: delta,
            applied_delta_seconds: applied,
            outcome: describe_adjustment(approach, delta, applied),
        });
        Ok(plan)
    }

    pub fn revert_baseline(&self, id: &str) -> Result<SignalPlan, RegistryError> {
        let slot = self.slot(id)?;
        let now = self.now();
        let plan = {
            let mut rt = lock(&slot.runtime);
            let changed = !rt.sim.controller().is_at_baseline();
            let plan = rt.sim.revert_baseline();
            if changed {
                rt.last_adjusted_at = Some(now);
            }
            slot.publish(&rt);
            plan
        };
        self.log_decision(DecisionLogEntry {
            timestamp: now,
            intersection_id: slot.id.clone(),
            location_name: slot.location_name.clone(),
            recommendation_id: None,
            action: HumanAction::Reverted,
            approach: None,
            requested_delta_seconds: 0,
            applied_delta_seconds: 0,
            outcome: "Reverted to baseline signal plan.".to_string(),
        });
        Ok(plan)
    }

    // ─── Recommendation surface ─────────────────────────────────────────

    pub fn recommendations(&self) -> Vec<Recommendation> {
        read(&self.book).recommendations().to_vec()
    }

    /// Apply a pending recommendation through the controller, then mark it
    /// applied. The controller may degrade the delta.
    pub fn apply_recommendation(&self, rec_id: &str) -> Result<Recommendation, RegistryError> {
        let now = self.now();
        let mut book = write(&self.book);
        let rec = book.pending(rec_id)?.clone();
        let slot = self.slot(&rec.target_intersection)?;
        let applied = {
            let mut rt = lock(&slot.runtime);
            let (_, applied) = adjust(&mut rt, rec.target_approach, rec.delta_seconds, now);
            slot.publish(&rt);
            applied
        };
        let updated = book.apply(rec_id)?;
        drop(book);

        self.log_decision(DecisionLogEntry {
            timestamp: now,
            intersection_id: slot.id.clone(),
            location_name: slot.location_name.clone(),
            recommendation_id: Some(rec.id.clone()),
            action: HumanAction::Applied,
            approach: Some(rec.target_approach),
            requested_delta_seconds: rec.delta_seconds,
            applied_delta_seconds: applied,
            outcome: describe_adjustment(rec.target_approach, rec.delta_seconds, applied),
        });
        Ok(updated)
    }

    pub fn reject_recommendation(&self, rec_id: &str) -> Result<Recommendation, RegistryError> {
        let updated = write(&self.book).reject(rec_id)?;
        self.log_decision(DecisionLogEntry {
            timestamp: self.now(),
            intersection_id: updated.target_intersection.clone(),
            location_name: updated.target_location.clone(),
            recommendation_id: Some(updated.id.clone()),
            action: HumanAction::Rejected,
            approach: Some(updated.target_approach),
            requested_delta_seconds: updated.delta_seconds,
            applied_delta_seconds: 0,
            outcome: "Recommendation rejected; signal plan unchanged.".to_string(),
        });
        Ok(updated)
    }

    // ─── Read models ────────────────────────────────────────────────────

    pub fn timeline(&self, id: &str, n: usize) -> Result<Vec<TimelinePoint>, RegistryError> {
        let slot = self.slot(id)?;
        let rt = lock(&slot.runtime);
        Ok(rt.timeline.last(n))
    }

    pub fn snapshot(&self, id: &str) -> Result<Arc<IntersectionState>, RegistryError> {
        let slot = self.slot(id)?;
        Ok(Arc::clone(&read(&slot.published)))
    }

    pub fn snapshots(&self) -> Vec<Arc<IntersectionState>> {
        self.slots.iter().map(|s| Arc::clone(&read(&s.published))).collect()
    }

    pub fn status(&self) -> Arc<SystemStatus> {
        Arc::clone(&read(&self.status))
    }

    pub fn failsafe_mode(&self, id: &str) -> Result<FailsafeMode, RegistryError> {
        self.slot(id)?;
        Ok(lock(&self.failsafe).mode(id))
    }

    /// Newest first.
    pub fn decision_log(&self, limit: usize) -> Vec<DecisionLogEntry> {
        lock(&self.decision_log).iter().take(limit).cloned().collect()
    }

    fn log_decision(&self, entry: DecisionLogEntry) {
        info!(
            intersection = %entry.intersection_id,
            action = ?entry.action,
            outcome = %entry.outcome,
            "operator decision"
        );
        let mut log = lock(&self.decision_log);
        log.push_front(entry);
        log.truncate(DECISION_LOG_CAPACITY);
    }
}

fn adjust(
    rt: &mut IntersectionRuntime,
    approach: Approach,
    delta: i32,
    now: DateTime<FixedOffset>,
) -> (SignalPlan, i32) {
    let before = rt.sim.controller().current_green(approach);
    let plan = rt.sim.apply_adjustment(approach, delta);
    let applied = plan.green(approach) as i32 - before as i32;
    if applied != 0 {
        rt.last_adjusted_at = Some(now);
    }
    (plan, applied)
}

fn describe_adjustment(approach: Approach, requested: i32, applied: i32) -> String {
    if applied == 0 && requested != 0 {
        format!("No feasible change for {approach} within safety bounds (requested {requested:+}s).")
    } else if applied == requested {
        format!("Green for {approach} adjusted by {applied:+}s.")
    } else {
        format!("Green for {approach} adjusted by {applied:+}s (requested {requested:+}s).")
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
