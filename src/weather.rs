// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Weather Feed

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::config::WeatherConfig;
use crate::types::Weather;

/// Upstream weather provider. `None` means the provider is unavailable right
/// now; the cache then keeps serving the last known value.
pub trait WeatherSource: Send + Sync {
    fn fetch(&self, location_key: &str) -> Option<Weather>;
}

/// Fixed reading, used when no live provider is configured.
#[derive(Debug, Clone)]
pub struct StaticWeather {
    weather: Weather,
}

impl StaticWeather {
    pub fn new(weather: Weather) -> Self {
        Self { weather }
    }

    pub fn from_config(config: &WeatherConfig) -> Self {
        Self::new(default_weather(config))
    }
}

impl WeatherSource for StaticWeather {
    fn fetch(&self, _location_key: &str) -> Option<Weather> {
        Some(self.weather.clone())
    }
}

fn default_weather(config: &WeatherConfig) -> Weather {
    Weather {
        temperature_c: config.default_temperature_c,
        condition: config.default_condition.clone(),
    }
}

/// Per-location cache refreshed at most every `refresh_seconds`. A failed
/// fetch is not retried for that location until the same interval has
/// passed.
pub struct WeatherCache {
    source: Box<dyn WeatherSource>,
    refresh_every: Duration,
    fallback: Weather,
    entries: HashMap<String, (Duration, Weather)>,
    failed_at: HashMap<String, Duration>,
}

impl WeatherCache {
    pub fn new(source: Box<dyn WeatherSource>, config: &WeatherConfig) -> Self {
        Self {
            source,
            refresh_every: Duration::from_secs(config.refresh_seconds),
            fallback: default_weather(config),
            entries: HashMap::new(),
            failed_at: HashMap::new(),
        }
    }

    /// Reading for `location_key` at monotonic time `now`.
    pub fn get(&mut self, location_key: &str, now: Duration) -> Weather {
        if let Some((fetched_at, weather)) = self.entries.get(location_key) {
            if now.saturating_sub(*fetched_at) < self.refresh_every {
                return weather.clone();
            }
        }
        let retry_due = self
            .failed_at
            .get(location_key)
            .map_or(true, |failed| now.saturating_sub(*failed) >= self.refresh_every);
        if retry_due {
            match self.source.fetch(location_key) {
                Some(weather) => {
                    debug!(location = %location_key, condition = %weather.condition, "weather refreshed");
                    self.failed_at.remove(location_key);
                    self.entries
                        .insert(location_key.to_string(), (now, weather.clone()));
                    return weather;
                }
                None => {
                    debug!(location = %location_key, "weather provider unavailable");
                    self.failed_at.insert(location_key.to_string(), now);
                }
            }
        }
        self.entries
            .get(location_key)
            .map(|(_, w)| w.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}
