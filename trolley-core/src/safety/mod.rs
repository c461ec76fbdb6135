//! Safety monitoring
//!
//! Sensor validation and health, plus the wire-end detection heuristics
//! shared by wire learning and automatic mode.

pub mod detection;
pub mod monitor;

pub use detection::{DetectionInput, DetectionMethod, DetectorConfig, WireEndDetector};
pub use monitor::{SensorHealthMonitor, SensorSnapshot, SensorStatus, ValidationStage};
