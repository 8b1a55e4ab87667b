// Firmware model: thermal plant, filtered sensor, hysteresis heater.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thermo_shared::{DeviceCommand, Frame, ProcessStatus, classify};

#[derive(Debug, Clone)]
pub struct FirmwareConfig {
    /// Weight of the newest raw reading in the moving average.
    pub filter_alpha: f64,
    /// Temperature gained per step with the heater on, °C.
    pub heat_rate: f64,
    /// Fraction of the gap to ambient lost per step.
    pub loss_coefficient: f64,
    pub ambient: f64,
    /// Peak-to-peak raw sensor noise, °C.
    pub sensor_noise: f64,
    pub initial_setpoint: f64,
    /// Emit measured-only lines like older firmware.
    pub legacy_output: bool,
    pub seed: u64,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            filter_alpha: 0.1,
            heat_rate: 0.4,
            loss_coefficient: 0.02,
            ambient: 20.0,
            sensor_noise: 0.0,
            initial_setpoint: 25.0,
            legacy_output: false,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VirtualController {
    config: FirmwareConfig,
    true_temp: f64,
    filtered: Option<f64>,
    setpoint: f64,
    heater_on: bool,
    rng: StdRng,
    received: Vec<DeviceCommand>,
}

impl VirtualController {
    pub fn new(config: FirmwareConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            true_temp: config.ambient,
            filtered: None,
            setpoint: config.initial_setpoint,
            heater_on: false,
            rng,
            received: Vec::new(),
            config,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.true_temp = temperature;
        self
    }

    /// Advance the plant one control period and report the telemetry frame.
    pub fn step(&mut self) -> Frame {
        let gain = if self.heater_on { self.config.heat_rate } else { 0.0 };
        let loss = self.config.loss_coefficient * (self.true_temp - self.config.ambient);
        self.true_temp += gain - loss;

        let noise = if self.config.sensor_noise > 0.0 {
            let half = self.config.sensor_noise / 2.0;
            self.rng.random_range(-half..=half)
        } else {
            0.0
        };
        let raw = self.true_temp + noise;
        let alpha = self.config.filter_alpha;
        let filtered = match self.filtered {
            // First reading seeds the filter
            None => raw,
            Some(previous) => raw * alpha + previous * (1.0 - alpha),
        };
        self.filtered = Some(filtered);

        match classify(filtered, self.setpoint) {
            ProcessStatus::Heating => self.heater_on = true,
            ProcessStatus::Cooling => self.heater_on = false,
            ProcessStatus::Stable => {}
        }

        if self.config.legacy_output {
            Frame::Legacy { measured: filtered }
        } else {
            Frame::Modern {
                measured: filtered,
                device_setpoint: self.setpoint,
            }
        }
    }

    pub fn apply(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::SetTarget(target) => {
                tracing::debug!("device setpoint -> {:.1}", target);
                self.setpoint = target;
            }
        }
        self.received.push(command);
    }

    /// Setpoint change from the buttons on the unit itself.
    pub fn press_setpoint(&mut self, delta: f64) {
        self.setpoint = ((self.setpoint + delta) * 100.0).round() / 100.0;
    }

    pub fn set_legacy_output(&mut self, legacy: bool) {
        self.config.legacy_output = legacy;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn measured(&self) -> Option<f64> {
        self.filtered
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn received(&self) -> &[DeviceCommand] {
        &self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reading_seeds_filter() {
        let mut device = VirtualController::new(FirmwareConfig::default()).with_temperature(30.0);
        let frame = device.step();
        // 30 - 0.02 * (30 - 20) = 29.8, heater still off on the first step
        assert!((frame.measured() - 29.8).abs() < 1e-9);
        assert_eq!(frame.device_setpoint(), Some(25.0));
    }

    #[test]
    fn test_heater_follows_hysteresis() {
        let mut device = VirtualController::new(FirmwareConfig::default());
        device.step();
        assert!(device.heater_on(), "below target must heat");

        for _ in 0..2000 {
            device.step();
        }
        for _ in 0..500 {
            let measured = device.step().measured();
            assert!(measured > 24.0 && measured < 26.5, "limit cycle left the band: {measured}");
        }
    }

    #[test]
    fn test_set_command_and_buttons() {
        let mut device = VirtualController::new(FirmwareConfig::default());
        device.apply(DeviceCommand::SetTarget(30.0));
        assert_eq!(device.setpoint(), 30.0);
        device.press_setpoint(-0.5);
        assert_eq!(device.setpoint(), 29.5);
        assert_eq!(device.received(), &[DeviceCommand::SetTarget(30.0)]);
    }

    #[test]
    fn test_legacy_output() {
        let mut device = VirtualController::new(FirmwareConfig {
            legacy_output: true,
            ..FirmwareConfig::default()
        });
        assert!(matches!(device.step(), Frame::Legacy { .. }));
    }

    #[test]
    fn test_noise_is_seeded() {
        let config = FirmwareConfig { sensor_noise: 0.4, seed: 7, ..FirmwareConfig::default() };
        let mut a = VirtualController::new(config.clone());
        let mut b = VirtualController::new(config);
        for _ in 0..10 {
            assert_eq!(a.step(), b.step());
        }
    }
}
