// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Corridor Signal Control Suite - Demand Generator

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::DemandConfig;
use crate::types::{Approach, ApproachMap};

/// Rush-hour arrivals per approach per tick.
///
/// The mean rises from `off_peak_fraction × peak` at tick 0 to `peak` at
/// `ramp_ticks` along a raised cosine, then holds. Gaussian jitter with
/// σ = `noise_fraction × mean` is added and the result rounded, floored at 0.
/// The same seed and tick sequence always yields the same arrivals.
#[derive(Debug, Clone)]
pub struct DemandGenerator {
    rng: ChaCha8Rng,
    config: DemandConfig,
}

impl DemandGenerator {
    pub fn new(config: DemandConfig) -> Self {
        Self::with_seed(config.seed, config)
    }

    pub fn with_seed(seed: u64, config: DemandConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
        }
    }

    pub fn arrivals(&mut self, tick: u64) -> ApproachMap<u32> {
        let ramp = ramp_factor(tick, self.config.ramp_ticks);
        let mut arrivals = ApproachMap::default();
        for approach in Approach::ALL {
            let mean = self.mean_arrivals(approach, ramp);
            let noise = self.sample_normal() * self.config.noise_fraction * mean;
            arrivals[approach] = (mean + noise).round().max(0.0) as u32;
        }
        arrivals
    }

    fn mean_arrivals(&self, approach: Approach, ramp: f64) -> f64 {
        let peak = self.config.peak_arrivals[approach];
        let off_peak = self.config.off_peak_fraction;
        off_peak * peak + ramp * (1.0 - off_peak) * peak
    }

    /// Standard normal draw via Box-Muller.
    fn sample_normal(&mut self) -> f64 {
        // 1 - U keeps u1 in (0, 1] so ln never sees zero.
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

/// Raised-cosine ease from 0.0 at tick 0 to 1.0 at `ramp_ticks`.
pub fn ramp_factor(tick: u64, ramp_ticks: u64) -> f64 {
    if tick == 0 {
        return 0.0;
    }
    if ramp_ticks == 0 || tick >= ramp_ticks {
        return 1.0;
    }
    0.5 * (1.0 - (std::f64::consts::PI * tick as f64 / ramp_ticks as f64).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ramp_shape() {
        assert_relative_eq!(ramp_factor(0, 120), 0.0);
        assert_relative_eq!(ramp_factor(60, 120), 0.5, epsilon = 1e-12);
        assert_relative_eq!(ramp_factor(120, 120), 1.0);
        assert_relative_eq!(ramp_factor(500, 120), 1.0);
        let mut last = 0.0;
        for t in 0..=120 {
            let r = ramp_factor(t, 120);
            assert!(r >= last);
            last = r;
        }
    }

    #[test]
    fn same_seed_same_arrivals() {
        let mut a = DemandGenerator::new(DemandConfig::default());
        let mut b = DemandGenerator::new(DemandConfig::default());
        for tick in 0..300 {
            assert_eq!(a.arrivals(tick), b.arrivals(tick));
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = DemandGenerator::with_seed(1, DemandConfig::default());
        let mut b = DemandGenerator::with_seed(2, DemandConfig::default());
        let diverged = (0..50).any(|t| a.arrivals(t) != b.arrivals(t));
        assert!(diverged);
    }

    #[test]
    fn peak_mean_tracks_config() {
        let mut demand = DemandGenerator::new(DemandConfig::default());
        let n = 4_000u64;
        let mut south = 0u64;
        for tick in 0..n {
            south += u64::from(demand.arrivals(120 + tick).s);
        }
        let mean = south as f64 / n as f64;
        assert!((mean - 28.0).abs() < 0.5, "peak mean {mean} far from 28");
    }

    #[test]
    fn zero_noise_is_deterministic_mean() {
        let config = DemandConfig {
            noise_fraction: 0.0,
            ..DemandConfig::default()
        };
        let mut demand = DemandGenerator::new(config);
        // 0.35 × 28 = 9.8, 0.35 × 14 = 4.9
        assert_eq!(demand.arrivals(0), ApproachMap { n: 10, e: 5, s: 10, w: 5 });
        assert_eq!(demand.arrivals(200), ApproachMap { n: 28, e: 14, s: 28, w: 14 });
    }
}
