//! Configuration type definitions
//!
//! Speeds are in m/s, distances in meters, accelerations in g and all
//! durations in milliseconds. ESC duties are 14-bit counts of a 50 Hz
//! period (819 = 1.0 ms, 1638 = 2.0 ms).

use crate::error::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Motion hardware constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HardwareConfig {
    /// Wheel circumference (m); one pulse per revolution
    pub wheel_circumference_m: f32,
    /// Absolute speed ceiling for every mode
    pub max_speed: f32,
    /// Speeds below this map to neutral
    pub speed_deadband: f32,
    /// Output update period the duty rate limit is expressed against
    pub update_interval_ms: u32,
    /// Pulse silence after which measured speed is forced to zero
    pub pulse_timeout_ms: u32,
    pub esc_min_duty: u16,
    pub esc_neutral_duty: u16,
    pub esc_max_duty: u16,
    pub esc_arm_duty: u16,
    /// Largest duty change per output update
    pub max_duty_step: u16,
    pub arm_neutral_hold_ms: u32,
    pub arm_signal_hold_ms: u32,
    /// Weight of the newest inter-pulse speed sample
    pub speed_smoothing: f32,
    /// Allowed gap between applied and target duty before the ESC is
    /// considered unresponsive
    pub duty_tracking_tolerance: u16,
    /// How long the gap may persist
    pub duty_tracking_grace_ms: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            wheel_circumference_m: 0.1916,
            max_speed: 2.0,
            speed_deadband: 0.05,
            update_interval_ms: 20,
            pulse_timeout_ms: 2000,
            esc_min_duty: 819,
            esc_neutral_duty: 1229,
            esc_max_duty: 1638,
            esc_arm_duty: 819,
            max_duty_step: 100,
            arm_neutral_hold_ms: 1000,
            arm_signal_hold_ms: 3000,
            speed_smoothing: 0.3,
            duty_tracking_tolerance: 200,
            duty_tracking_grace_ms: 1000,
        }
    }
}

/// Sensor health monitor constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorConfig {
    /// Time allowed per validation stage
    pub stage_timeout_ms: u32,
    /// Shake threshold, evaluated only during validation
    pub shake_threshold_g: f32,
    /// Impact threshold, evaluated only outside validation
    pub impact_threshold_g: f32,
    /// Pulse silence after which the pulse sensor is reported stale
    pub pulse_health_timeout_ms: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: 60_000,
            shake_threshold_g: 0.3,
            impact_threshold_g: 0.1,
            pulse_health_timeout_ms: 5000,
        }
    }
}

/// Wire learning constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LearningConfig {
    pub start_speed: f32,
    pub max_speed: f32,
    pub speed_increment: f32,
    /// Time budget per direction
    pub direction_timeout_ms: u32,
    /// Allowed difference between directions (%)
    pub tolerance_percent: f32,
    pub min_wire_length_m: f32,
    pub max_wire_length_m: f32,
    pub impact_threshold_g: f32,
    pub pulse_timeout_ms: u32,
    pub pulse_timeout_checks: u8,
    /// Rolling mean below this share of the command is a speed drop
    pub speed_drop_ratio: f32,
    /// Speed-drop detection is disabled below this command
    pub speed_drop_min_command: f32,
    pub validation_pulses: u32,
    pub validation_window_ms: u32,
    pub step_pause_ms: u32,
    pub direction_pause_ms: u32,
    /// Terminal forward speed at which coasting is calibrated
    pub coasting_trigger_speed: f32,
    pub coasting_speed: f32,
    /// Measured speed at which power is cut for calibration
    pub coasting_reached_speed: f32,
    /// Measured speed at which the coast is considered finished
    pub coasting_stop_speed: f32,
    pub coasting_timeout_ms: u32,
    pub coasting_margin_m: f32,
    pub cruise_factor: f32,
    pub max_cruise_speed: f32,
    pub min_accuracy_percent: f32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            start_speed: 0.1,
            max_speed: 1.0,
            speed_increment: 0.1,
            direction_timeout_ms: 60_000,
            tolerance_percent: 5.0,
            min_wire_length_m: 2.0,
            max_wire_length_m: 2000.0,
            impact_threshold_g: 1.0,
            pulse_timeout_ms: 2000,
            pulse_timeout_checks: 3,
            speed_drop_ratio: 0.7,
            speed_drop_min_command: 0.2,
            validation_pulses: 10,
            validation_window_ms: 3000,
            step_pause_ms: 500,
            direction_pause_ms: 2000,
            coasting_trigger_speed: 4.0,
            coasting_speed: 5.0,
            coasting_reached_speed: 4.8,
            coasting_stop_speed: 0.1,
            coasting_timeout_ms: 30_000,
            coasting_margin_m: 2.0,
            cruise_factor: 1.5,
            max_cruise_speed: 5.0,
            min_accuracy_percent: 90.0,
        }
    }
}

/// Automatic cycling constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AutomaticConfig {
    pub max_cruise_speed: f32,
    pub start_speed: f32,
    /// m/s²
    pub acceleration: f32,
    /// m/s²
    pub deceleration: f32,
    pub coasting_speed: f32,
    /// Calibration cuts power once measured speed is within this of target
    pub coasting_reached_margin: f32,
    pub safety_margin_m: f32,
    pub min_coasting_distance_m: f32,
    pub max_coasting_distance_m: f32,
    pub max_cycles: u32,
    pub cycle_pause_ms: u32,
    pub direction_pause_ms: u32,
    pub run_timeout_ms: u32,
    pub approach_speed: f32,
    pub approach_distance_m: f32,
    pub impact_threshold_g: f32,
    pub pulse_timeout_ms: u32,
    /// Below this measured speed a coast is finished
    pub coast_stop_speed: f32,
    pub speed_drop_ratio: f32,
    pub speed_drop_min_command: f32,
    pub min_wire_length_m: f32,
}

impl Default for AutomaticConfig {
    fn default() -> Self {
        Self {
            max_cruise_speed: 5.0,
            start_speed: 0.1,
            acceleration: 0.5,
            deceleration: 0.3,
            coasting_speed: 5.0,
            coasting_reached_margin: 0.2,
            safety_margin_m: 2.0,
            min_coasting_distance_m: 0.5,
            max_coasting_distance_m: 50.0,
            max_cycles: 1000,
            cycle_pause_ms: 5000,
            direction_pause_ms: 3000,
            run_timeout_ms: 300_000,
            approach_speed: 1.0,
            approach_distance_m: 0.5,
            impact_threshold_g: 0.5,
            pulse_timeout_ms: 2000,
            coast_stop_speed: 0.1,
            speed_drop_ratio: 0.4,
            speed_drop_min_command: 0.5,
            min_wire_length_m: 2.0,
        }
    }
}

/// Manual control constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManualConfig {
    pub max_speed: f32,
    pub min_speed_step: f32,
    pub speed_increment: f32,
    pub default_speed: f32,
    pub impact_threshold_g: f32,
    /// Largest accepted change from the current command
    pub max_speed_jump: f32,
    pub max_commands_per_window: usize,
    pub rate_window_ms: u32,
    pub liveness_check_ms: u32,
    pub liveness_failures: u8,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            max_speed: 2.0,
            min_speed_step: 0.05,
            speed_increment: 0.1,
            default_speed: 0.5,
            impact_threshold_g: 0.8,
            max_speed_jump: 1.0,
            max_commands_per_window: 10,
            rate_window_ms: 1000,
            liveness_check_ms: 2000,
            liveness_failures: 3,
        }
    }
}

/// Mode coordinator constants
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoordinatorConfig {
    pub max_system_errors: u32,
    /// Quiet period after which the rolling error count resets
    pub error_reset_ms: u32,
    pub validation_timeout_ms: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_system_errors: 10,
            error_reset_ms: 30_000,
            validation_timeout_ms: 60_000,
        }
    }
}

/// Complete trolley configuration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrolleyConfig {
    pub hardware: HardwareConfig,
    pub sensors: SensorConfig,
    pub learning: LearningConfig,
    pub automatic: AutomaticConfig,
    pub manual: ManualConfig,
    pub coordinator: CoordinatorConfig,
}

impl TrolleyConfig {
    /// Check the configuration for values the components cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        let hw = &self.hardware;
        if hw.wheel_circumference_m <= 0.0 {
            return Err(Error::invalid_argument("Wheel circumference must be positive"));
        }
        if hw.max_speed <= hw.speed_deadband {
            return Err(Error::invalid_argument("Max speed must exceed deadband"));
        }
        if !(hw.esc_min_duty < hw.esc_neutral_duty && hw.esc_neutral_duty < hw.esc_max_duty) {
            return Err(Error::invalid_argument("ESC duties must satisfy min < neutral < max"));
        }
        if hw.esc_arm_duty < hw.esc_min_duty || hw.esc_arm_duty > hw.esc_max_duty {
            return Err(Error::invalid_argument("ESC arm duty outside duty range"));
        }
        if hw.max_duty_step == 0 {
            return Err(Error::invalid_argument("Duty step must be non-zero"));
        }
        if !(hw.speed_smoothing > 0.0 && hw.speed_smoothing <= 1.0) {
            return Err(Error::invalid_argument("Speed smoothing must be in (0, 1]"));
        }

        let learning = &self.learning;
        if learning.start_speed <= 0.0 || learning.start_speed > learning.max_speed {
            return Err(Error::invalid_argument("Learning start speed invalid"));
        }
        if learning.speed_increment <= 0.0 {
            return Err(Error::invalid_argument("Learning increment must be positive"));
        }
        if learning.min_wire_length_m >= learning.max_wire_length_m {
            return Err(Error::invalid_argument("Wire length range is empty"));
        }
        if learning.pulse_timeout_checks == 0 || learning.validation_pulses == 0 {
            return Err(Error::invalid_argument("Learning detection counts must be non-zero"));
        }

        let auto = &self.automatic;
        if auto.acceleration <= 0.0 || auto.deceleration <= 0.0 {
            return Err(Error::invalid_argument("Automatic ramp rates must be positive"));
        }
        if auto.min_coasting_distance_m >= auto.max_coasting_distance_m {
            return Err(Error::invalid_argument("Coasting distance range is empty"));
        }
        if auto.max_cycles == 0 {
            return Err(Error::invalid_argument("Max cycles must be non-zero"));
        }

        let manual = &self.manual;
        if manual.max_speed <= 0.0 || manual.default_speed > manual.max_speed {
            return Err(Error::invalid_argument("Manual speed limits invalid"));
        }
        if manual.max_commands_per_window == 0 || manual.liveness_failures == 0 {
            return Err(Error::invalid_argument("Manual limits must be non-zero"));
        }

        if self.coordinator.max_system_errors == 0 {
            return Err(Error::invalid_argument("Max system errors must be non-zero"));
        }

        Ok(())
    }
}
