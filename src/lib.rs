// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite ("The Corridor")

pub mod types;
pub mod config;
pub mod safety;
pub mod controller;
pub mod demand;
pub mod metrics;
pub mod simulation;
pub mod timeline;
pub mod rules;
pub mod failsafe;
pub mod forecast;
pub mod weather;
pub mod registry;
#[cfg(not(target_arch = "wasm32"))]
pub mod driver;

pub use types::*;
pub use config::{ConfigError, CorridorConfig};
pub use controller::SignalController;
pub use registry::{IntersectionRegistry, RegistryError, TickReport};
pub use simulation::IntersectionSimulator;

use std::sync::Arc;
use std::time::Duration;

use wasm_bindgen::prelude::*;

use failsafe::ManualClock;

// ─── WASM Interface ──────────────────────────────────────────────────────────

/// Browser-facing corridor simulation driven by explicit `tick()` calls on a
/// simulated clock.
#[wasm_bindgen]
pub struct CorridorSimulation {
    registry: IntersectionRegistry,
    clock: Arc<ManualClock>,
    tick_interval: Duration,
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn to_js<T: serde::Serialize>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

impl CorridorSimulation {
    pub fn with_config(config: CorridorConfig) -> Result<Self, RegistryError> {
        let clock = Arc::new(ManualClock::starting_monday());
        let tick_interval = Duration::from_millis(config.driver.tick_interval_ms);
        let registry = IntersectionRegistry::builder(config)
            .clock(clock.clone())
            .build()?;
        Ok(Self {
            registry,
            clock,
            tick_interval,
        })
    }

    pub fn registry(&self) -> &IntersectionRegistry {
        &self.registry
    }

    pub fn tick_core(&mut self) -> TickReport {
        self.clock.advance(self.tick_interval);
        self.registry.tick()
    }
}

#[wasm_bindgen]
impl CorridorSimulation {
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u32) -> Result<CorridorSimulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let mut config = CorridorConfig::default();
        config.demand.seed = u64::from(seed);
        Self::with_config(config).map_err(js_error)
    }

    pub fn from_json(json: &str) -> Result<CorridorSimulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config = CorridorConfig::from_json_str(json).map_err(js_error)?;
        Self::with_config(config).map_err(js_error)
    }

    pub fn tick(&mut self) -> JsValue {
        let report = self.tick_core();
        to_js(&report)
    }

    pub fn intersection_ids(&self) -> JsValue {
        to_js(&self.registry.intersection_ids())
    }

    pub fn plan(&self, intersection_id: &str) -> Result<JsValue, JsValue> {
        let plan = self.registry.plan(intersection_id).map_err(js_error)?;
        Ok(to_js(&plan))
    }

    pub fn apply_adjustment(&mut self, intersection_id: &str, approach: &str, delta: i32) -> Result<JsValue, JsValue> {
        let plan = self
            .registry
            .manual_override(intersection_id, approach, delta)
            .map_err(js_error)?;
        Ok(to_js(&plan))
    }

    pub fn revert_baseline(&mut self, intersection_id: &str) -> Result<JsValue, JsValue> {
        let plan = self.registry.revert_baseline(intersection_id).map_err(js_error)?;
        Ok(to_js(&plan))
    }

    pub fn recommendations(&self) -> JsValue {
        to_js(&self.registry.recommendations())
    }

    pub fn apply_recommendation(&mut self, recommendation_id: &str) -> Result<JsValue, JsValue> {
        let rec = self
            .registry
            .apply_recommendation(recommendation_id)
            .map_err(js_error)?;
        Ok(to_js(&rec))
    }

    pub fn reject_recommendation(&mut self, recommendation_id: &str) -> Result<JsValue, JsValue> {
        let rec = self
            .registry
            .reject_recommendation(recommendation_id)
            .map_err(js_error)?;
        Ok(to_js(&rec))
    }

    pub fn timeline(&self, intersection_id: &str, n: usize) -> Result<JsValue, JsValue> {
        let points = self.registry.timeline(intersection_id, n).map_err(js_error)?;
        Ok(to_js(&points))
    }

    pub fn snapshot(&self, intersection_id: &str) -> Result<JsValue, JsValue> {
        let state = self.registry.snapshot(intersection_id).map_err(js_error)?;
        Ok(to_js(state.as_ref()))
    }

    pub fn status(&self) -> JsValue {
        to_js(self.registry.status().as_ref())
    }

    pub fn decision_log(&self, limit: usize) -> JsValue {
        to_js(&self.registry.decision_log(limit))
    }
}
