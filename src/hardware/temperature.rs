// src/hardware/temperature.rs - Process state and setpoint reconciliation
use thermo_shared::ProcessStatus;
use thiserror::Error;

/// Operator-side view of the regulated process. Single owner: the control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    /// Setpoint last sent to (or adopted from) the device, °C.
    pub target: f64,
    /// Most recent measurement, carried forward when a read yields nothing.
    pub last_measured: f64,
    /// `None` until the first tick after a connect.
    pub status: Option<ProcessStatus>,
}

impl ControlState {
    pub fn new(target: f64, initial_measured: f64) -> Self {
        Self {
            target,
            last_measured: initial_measured,
            status: None,
        }
    }

    /// Regulation error, positive while the process is below target.
    pub fn control_error(&self) -> f64 {
        self.target - self.last_measured
    }
}

/// Operator nudge sizes offered by the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetpointDelta {
    MinusHalf,
    MinusTenth,
    PlusTenth,
    PlusHalf,
}

impl SetpointDelta {
    pub fn value(self) -> f64 {
        match self {
            SetpointDelta::MinusHalf => -0.5,
            SetpointDelta::MinusTenth => -0.1,
            SetpointDelta::PlusTenth => 0.1,
            SetpointDelta::PlusHalf => 0.5,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "-0.5" => Some(SetpointDelta::MinusHalf),
            "-0.1" => Some(SetpointDelta::MinusTenth),
            "+0.1" | "0.1" => Some(SetpointDelta::PlusTenth),
            "+0.5" | "0.5" => Some(SetpointDelta::PlusHalf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetpointError {
    #[error("setpoint must be a finite number, got {0}")]
    NotFinite(f64),
}

/// Outcome of comparing the device-reported setpoint with ours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    Unchanged,
    /// The device disagreed and its value was taken over.
    Adopted { previous: f64, device: f64 },
}

/// Keeps `ControlState::target` in agreement with the device.
///
/// Operator commands write the target directly and are then sent to the
/// device. A device-reported setpoint that differs by more than `tolerance`
/// wins and is not echoed back, so local changes on the unit stick.
#[derive(Debug, Clone, Copy)]
pub struct SetpointReconciler {
    tolerance: f64,
}

impl SetpointReconciler {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Apply a nudge; the new target is rounded to two decimals.
    pub fn apply_delta(&self, state: &mut ControlState, delta: SetpointDelta) -> f64 {
        state.target = round_centi(state.target + delta.value());
        state.target
    }

    pub fn apply_absolute(&self, state: &mut ControlState, value: f64) -> Result<f64, SetpointError> {
        if !value.is_finite() {
            return Err(SetpointError::NotFinite(value));
        }
        state.target = value;
        Ok(state.target)
    }

    pub fn reconcile(&self, state: &mut ControlState, device_setpoint: f64) -> Reconciliation {
        if (state.target - device_setpoint).abs() > self.tolerance {
            let previous = state.target;
            state.target = device_setpoint;
            Reconciliation::Adopted { previous, device: device_setpoint }
        } else {
            Reconciliation::Unchanged
        }
    }
}

fn round_centi(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ControlState {
        ControlState::new(25.0, 20.0)
    }

    #[test]
    fn test_device_within_tolerance_is_ignored() {
        let reconciler = SetpointReconciler::new(0.01);
        let mut state = state();
        assert_eq!(reconciler.reconcile(&mut state, 25.005), Reconciliation::Unchanged);
        assert_eq!(state.target, 25.0);
    }

    #[test]
    fn test_device_divergence_wins() {
        let reconciler = SetpointReconciler::new(0.01);
        let mut state = state();
        assert_eq!(
            reconciler.reconcile(&mut state, 25.6),
            Reconciliation::Adopted { previous: 25.0, device: 25.6 }
        );
        assert_eq!(state.target, 25.6);

        // Just past the tolerance also wins
        let mut state = ControlState::new(25.0, 20.0);
        reconciler.reconcile(&mut state, 25.02);
        assert_eq!(state.target, 25.02);
    }

    #[test]
    fn test_delta_rounds_to_centi_degrees() {
        let reconciler = SetpointReconciler::new(0.01);
        let mut state = state();
        reconciler.apply_delta(&mut state, SetpointDelta::PlusTenth);
        reconciler.apply_delta(&mut state, SetpointDelta::PlusTenth);
        reconciler.apply_delta(&mut state, SetpointDelta::PlusTenth);
        assert_eq!(state.target, 25.3);
        reconciler.apply_delta(&mut state, SetpointDelta::MinusHalf);
        assert_eq!(state.target, 24.8);
    }

    #[test]
    fn test_absolute_rejects_non_finite() {
        let reconciler = SetpointReconciler::new(0.01);
        let mut state = state();
        assert_eq!(reconciler.apply_absolute(&mut state, 30.25), Ok(30.25));
        assert!(reconciler.apply_absolute(&mut state, f64::NAN).is_err());
        assert_eq!(state.target, 30.25);
    }

    #[test]
    fn test_delta_parse() {
        assert_eq!(SetpointDelta::parse("+0.5"), Some(SetpointDelta::PlusHalf));
        assert_eq!(SetpointDelta::parse("-0.1"), Some(SetpointDelta::MinusTenth));
        assert_eq!(SetpointDelta::parse("+0.2"), None);
    }

    #[test]
    fn test_control_error() {
        let state = state();
        assert_eq!(state.control_error(), 5.0);
    }
}
