// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Forecast Capability

//! Volume forecasts per intersection.
//!
//! The capability is chosen once from `forecast.mode`: an injected
//! [`ForecastModel`], or a statistical baseline over the bounded volume
//! history. A model failure is reported to the caller; it is never swapped
//! for the baseline at runtime.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{BaselineMethod, ConfigError, CorridorConfig, ForecastConfig, ForecastMode};
use crate::metrics;
use crate::types::{Forecast, HorizonPoint, MetricsSnapshot, Prediction};

const MAX_CONFIDENCE_PERCENT: u8 = 99;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForecastError {
    #[error("forecast model '{model}' failed: {reason}")]
    Model { model: String, reason: String },
}

// ---------------------------------------------------------------------------
// VolumeHistory
// ---------------------------------------------------------------------------

/// Bounded `(tick, volume)` history, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeHistory {
    points: VecDeque<(u64, u32)>,
    capacity: usize,
}

impl VolumeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, tick: u64, volume: u32) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back((tick, volume));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<(u64, u32)> {
        self.points.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u64, u32)> {
        self.points.iter()
    }
}

/// Last observed volume, whatever the horizon. Zero with no history.
pub fn persistence(history: &VolumeHistory) -> u32 {
    history.latest().map_or(0, |(_, v)| v)
}

/// Volume observed one season before the forecast target tick, or the
/// closest sample to it. Falls back to persistence when the history does not
/// reach back that far.
pub fn seasonal_naive(history: &VolumeHistory, horizon_ticks: u64, seasonal_ticks: u64) -> u32 {
    let (Some(&(first_tick, first_volume)), Some((last_tick, _))) = (history.points.front(), history.latest()) else {
        return 0;
    };
    let target = i128::from(last_tick) + i128::from(horizon_ticks) - i128::from(seasonal_ticks);
    if target < i128::from(first_tick) {
        return persistence(history);
    }

    let mut best = (i128::from(first_tick) - target).abs();
    let mut best_volume = first_volume;
    for &(tick, volume) in history.iter() {
        let distance = (i128::from(tick) - target).abs();
        if distance < best {
            best = distance;
            best_volume = volume;
        }
        if i128::from(tick) > target && distance > best {
            break;
        }
    }
    best_volume
}

// ---------------------------------------------------------------------------
// Forecaster
// ---------------------------------------------------------------------------

/// An externally trained predictor.
pub trait ForecastModel: Send + Sync {
    fn name(&self) -> &str;
    fn predict(&self, history: &VolumeHistory, horizon_ticks: u64) -> Result<u32, String>;
    fn confidence_percent(&self) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizons {
    pub short_ticks: u64,
    pub medium_ticks: u64,
    pub long_ticks: u64,
}

impl Horizons {
    pub fn from_config(config: &CorridorConfig) -> Self {
        let f = &config.forecast;
        Self {
            short_ticks: config.horizon_ticks(f.horizon_15m_minutes),
            medium_ticks: config.horizon_ticks(f.horizon_2h_minutes),
            long_ticks: config.horizon_ticks(f.horizon_4h_minutes),
        }
    }
}

#[derive(Clone)]
pub enum Forecaster {
    Model(Arc<dyn ForecastModel>),
    Baseline {
        method: BaselineMethod,
        seasonal_ticks: u64,
        confidence_percent: u8,
    },
}

impl std::fmt::Debug for Forecaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Forecaster").field(&self.name()).finish()
    }
}

impl Forecaster {
    /// Pick the capability named by `forecast.mode`. `model` mode without a
    /// supplied model is a configuration error.
    pub fn from_config(
        config: &CorridorConfig,
        model: Option<Arc<dyn ForecastModel>>,
    ) -> Result<Self, ConfigError> {
        match config.forecast.mode {
            ForecastMode::Model => model.map(Self::Model).ok_or(ConfigError::ModelUnavailable),
            ForecastMode::Persistence => Ok(Self::Baseline {
                method: config.forecast.baseline,
                seasonal_ticks: config.forecast.seasonal_ticks,
                confidence_percent: config.rules.default_confidence_percent,
            }),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Model(model) => model.name().to_string(),
            Self::Baseline { method: BaselineMethod::Persistence, .. } => "Persistence Baseline".to_string(),
            Self::Baseline { method: BaselineMethod::SeasonalNaive, .. } => "Seasonal Naive Baseline".to_string(),
        }
    }

    pub fn forecast(&self, history: &VolumeHistory, horizons: Horizons) -> Result<Forecast, ForecastError> {
        let predict = |h: u64| self.predict(history, h);
        Ok(Forecast {
            predicted_volume_15m: predict(horizons.short_ticks)?,
            predicted_volume_2h: predict(horizons.medium_ticks)?,
            predicted_volume_4h: predict(horizons.long_ticks)?,
            confidence_percent: self.confidence_percent().min(MAX_CONFIDENCE_PERCENT),
        })
    }

    fn predict(&self, history: &VolumeHistory, horizon_ticks: u64) -> Result<u32, ForecastError> {
        match self {
            Self::Model(model) => model
                .predict(history, horizon_ticks)
                .map_err(|reason| ForecastError::Model {
                    model: model.name().to_string(),
                    reason,
                }),
            Self::Baseline { method: BaselineMethod::Persistence, .. } => Ok(persistence(history)),
            Self::Baseline {
                method: BaselineMethod::SeasonalNaive,
                seasonal_ticks,
                ..
            } => Ok(seasonal_naive(history, horizon_ticks, *seasonal_ticks)),
        }
    }

    fn confidence_percent(&self) -> u8 {
        match self {
            Self::Model(model) => model.confidence_percent(),
            Self::Baseline { confidence_percent, .. } => *confidence_percent,
        }
    }
}

/// Operator-facing view of the forecast: the 15-minute headline plus one
/// point per horizon, each flagged against the congestion threshold.
pub fn build_prediction(
    model_name: String,
    snapshot: &MetricsSnapshot,
    forecast: Forecast,
    config: &ForecastConfig,
    alert_threshold_percent: f64,
) -> Prediction {
    let current = snapshot.current_volume;
    let predicted = forecast.predicted_volume_15m;
    let risk = metrics::congestion_risk_percent(predicted, current, snapshot.density_percent);
    let threshold = metrics::congestion_threshold(current, snapshot.density_percent, alert_threshold_percent);
    let at = |minutes: u32| snapshot.timestamp + chrono::Duration::minutes(i64::from(minutes));

    let horizons = [
        ("15m", config.horizon_15m_minutes, forecast.predicted_volume_15m),
        ("2h", config.horizon_2h_minutes, forecast.predicted_volume_2h),
        ("4h", config.horizon_4h_minutes, forecast.predicted_volume_4h),
    ]
    .into_iter()
    .map(|(label, minutes, volume)| HorizonPoint {
        label: label.to_string(),
        horizon_minutes: minutes,
        timestamp: at(minutes),
        current_volume: current,
        predicted_volume: volume,
        congestion_threshold: metrics::round_to(threshold, 1),
        congestion_detected: f64::from(volume) >= threshold,
    })
    .collect();

    Prediction {
        model_name,
        current_volume: current,
        predicted_volume_15m: predicted,
        delta_volume: i64::from(predicted) - i64::from(current),
        congestion_risk_percent: metrics::round_to(risk, 1),
        risk_label: metrics::risk_label(risk),
        peak_forecast_time: at(config.horizon_15m_minutes).format("%H:%M").to_string(),
        confidence_percent: forecast.confidence_percent,
        forecast,
        horizons,
    }
}
