// src/history.rs - Rolling window of time-stamped samples
use std::collections::VecDeque;

use serde::Serialize;

/// One tick's worth of data. Never mutated after it is appended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Seconds since the link was opened.
    pub time: f64,
    /// Measured process temperature, °C.
    pub measured: f64,
    /// Setpoint in force when the sample was taken, °C.
    pub setpoint: f64,
}

/// Axis extents for the chart collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub time_min: f64,
    pub time_max: f64,
    pub value_min: f64,
    pub value_max: f64,
}

/// Fixed-capacity FIFO time series.
///
/// Samples are stored whole, so the time, measured and setpoint sequences
/// handed out by the accessors always have the same length.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    samples: VecDeque<Sample>,
    max_points: usize,
    padding: f64,
}

impl TimeSeriesBuffer {
    pub fn new(max_points: usize, padding: f64) -> Self {
        let max_points = max_points.max(1);
        Self {
            samples: VecDeque::with_capacity(max_points + 1),
            max_points,
            padding,
        }
    }

    /// Push to the back; evict from the front once over capacity.
    pub fn append(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.max_points {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_points
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    pub fn measured(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.measured).collect()
    }

    pub fn setpoints(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.setpoint).collect()
    }

    /// Time extent plus value extent over measured and setpoint, padded.
    /// `None` while the buffer is empty.
    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;
        let (value_min, value_max) = self.samples.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), s| (lo.min(s.measured).min(s.setpoint), hi.max(s.measured).max(s.setpoint)),
        );
        Some(Bounds {
            time_min: first.time,
            time_max: last.time,
            value_min: value_min - self.padding,
            value_max: value_max + self.padding,
        })
    }
}
