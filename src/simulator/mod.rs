// src/simulator/mod.rs - Synthetic process used when no device is attached
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;

/// Source of the bounded noise added to every simulated reading.
pub trait JitterSource: Send {
    /// Uniform sample from `[-amplitude, amplitude]`.
    fn sample(&mut self, amplitude: f64) -> f64;
}

/// Seedable uniform jitter. The same seed replays the same sequence.
#[derive(Debug, Clone)]
pub struct SeededJitter {
    rng: StdRng,
}

impl SeededJitter {
    /// Without a seed the generator is seeded from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&mut self, amplitude: f64) -> f64 {
        if amplitude.is_nan() || amplitude <= 0.0 {
            return 0.0;
        }
        self.rng.random_range(-amplitude..=amplitude)
    }
}

/// Jitter pinned to zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn sample(&mut self, _amplitude: f64) -> f64 {
        0.0
    }
}

/// First-order lag toward the target with bounded noise. Convergence is
/// asymptotic; the target is never reached exactly.
pub struct SimulationModel {
    gain: f64,
    jitter: f64,
    source: Box<dyn JitterSource>,
}

impl SimulationModel {
    pub fn new(config: &SimulationConfig, source: Box<dyn JitterSource>) -> Self {
        Self {
            gain: config.gain,
            jitter: config.jitter,
            source,
        }
    }

    pub fn step(&mut self, previous_measured: f64, target: f64) -> f64 {
        previous_measured
            + (target - previous_measured) * self.gain
            + self.source.sample(self.jitter)
    }
}

impl std::fmt::Debug for SimulationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationModel")
            .field("gain", &self.gain)
            .field("jitter", &self.jitter)
            .finish()
    }
}
