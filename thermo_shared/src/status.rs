// Process status classification shared by host display and device heater logic.
//
// The stable band sits entirely above the target: anything below target is
// heating, anything more than STABLE_BAND above it is cooling. This mirrors the
// controller firmware and must not be made symmetric.

use serde::{Deserialize, Serialize};

/// Width of the stable band above target, °C.
pub const STABLE_BAND: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    Heating,
    Stable,
    Cooling,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Heating => "heating",
            ProcessStatus::Stable => "stable",
            ProcessStatus::Cooling => "cooling",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(measured: f64, target: f64) -> ProcessStatus {
    classify_with_band(measured, target, STABLE_BAND)
}

pub fn classify_with_band(measured: f64, target: f64, band: f64) -> ProcessStatus {
    if measured < target {
        ProcessStatus::Heating
    } else if measured > target + band {
        ProcessStatus::Cooling
    } else {
        ProcessStatus::Stable
    }
}
