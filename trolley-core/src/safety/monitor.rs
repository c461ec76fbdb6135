//! Sensor health monitor
//!
//! Runs the guided validation sequence (rotate the wheel, then shake the
//! trolley) that gates every motion mode, then keeps tracking
//! acceleration, impacts and pulse activity.
//!
//! Each validation step needs both the sensor event and an explicit
//! operator confirmation, so vibration during transport cannot pass the
//! gate on its own.

use crate::config::SensorConfig;
use crate::error::Error;
use crate::traits::AccelSample;

/// Validation sequence stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValidationStage {
    Start,
    WaitRotation,
    WaitShake,
    SensorsReady,
    SystemReady,
    Failed,
}

impl ValidationStage {
    /// Inside the window where shake (not impact) is evaluated
    pub fn is_validating(self) -> bool {
        matches!(self, ValidationStage::WaitRotation | ValidationStage::WaitShake)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStage::Start => "Start",
            ValidationStage::WaitRotation => "Wait rotation",
            ValidationStage::WaitShake => "Wait shake",
            ValidationStage::SensorsReady => "Sensors ready",
            ValidationStage::SystemReady => "System ready",
            ValidationStage::Failed => "Failed",
        }
    }
}

/// Per-sensor health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorStatus {
    Unknown,
    Testing,
    Healthy,
    Failed,
    Timeout,
}

impl SensorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorStatus::Unknown => "Unknown",
            SensorStatus::Testing => "Testing",
            SensorStatus::Healthy => "Healthy",
            SensorStatus::Failed => "Failed",
            SensorStatus::Timeout => "Timeout",
        }
    }
}

/// Snapshot of sensor state for modes and status egress
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSnapshot {
    pub stage: ValidationStage,
    pub accel: AccelSample,
    /// Magnitude including gravity
    pub total_g: f32,
    /// Magnitude deviation from 1 g
    pub dynamic_g: f32,
    pub last_impact_g: f32,
    pub last_impact_ms: Option<u64>,
    pub rotation_detected: bool,
    pub shake_detected: bool,
    pub hall_status: SensorStatus,
    pub accel_status: SensorStatus,
    /// A pulse arrived within the health timeout
    pub pulse_recent: bool,
    pub ready: bool,
}

/// Sensor validation and health tracking
#[derive(Debug, Clone)]
pub struct SensorHealthMonitor {
    config: SensorConfig,
    stage: ValidationStage,
    stage_since_ms: u64,
    rotation_detected: bool,
    shake_detected: bool,
    rotation_confirmed: bool,
    shake_confirmed: bool,
    ready: bool,
    accel: AccelSample,
    hall_status: SensorStatus,
    accel_status: SensorStatus,
    last_pulse_ms: Option<u64>,
    last_impact_g: f32,
    last_impact_ms: Option<u64>,
    now_ms: u64,
}

impl SensorHealthMonitor {
    pub fn new(config: SensorConfig) -> Self {
        Self {
            config,
            stage: ValidationStage::Start,
            stage_since_ms: 0,
            rotation_detected: false,
            shake_detected: false,
            rotation_confirmed: false,
            shake_confirmed: false,
            ready: false,
            accel: AccelSample::at_rest(),
            hall_status: SensorStatus::Unknown,
            accel_status: SensorStatus::Unknown,
            last_pulse_ms: None,
            last_impact_g: 0.0,
            last_impact_ms: None,
            now_ms: 0,
        }
    }

    /// (Re)start the guided sequence at the rotation step
    pub fn begin_validation(&mut self, now_ms: u64) {
        self.clear_flags();
        self.enter(ValidationStage::WaitRotation, now_ms);
        self.hall_status = SensorStatus::Testing;
        self.accel_status = SensorStatus::Testing;
    }

    /// Return to `Start` and forget all confirmations
    pub fn reset_validation(&mut self) {
        self.clear_flags();
        self.stage = ValidationStage::Start;
        self.hall_status = SensorStatus::Unknown;
        self.accel_status = SensorStatus::Unknown;
    }

    pub fn record_pulse(&mut self, timestamp_ms: u64) {
        self.last_pulse_ms = Some(timestamp_ms);
        if self.stage == ValidationStage::WaitRotation {
            self.rotation_detected = true;
        }
    }

    pub fn record_accel(&mut self, sample: AccelSample, now_ms: u64) {
        self.accel = sample;
        if self.accel_status == SensorStatus::Failed {
            self.accel_status = if self.ready {
                SensorStatus::Healthy
            } else {
                SensorStatus::Testing
            };
        }

        let dynamic = sample.dynamic_g();
        if self.stage.is_validating() {
            if self.stage == ValidationStage::WaitShake && dynamic > self.config.shake_threshold_g {
                self.shake_detected = true;
            }
        } else if dynamic > self.config.impact_threshold_g {
            self.last_impact_g = dynamic;
            self.last_impact_ms = Some(now_ms);
        }
    }

    /// The accelerometer could not be read; keep the last sample
    pub fn record_accel_failure(&mut self) {
        self.accel_status = SensorStatus::Failed;
    }

    /// Operator confirms the wheel rotation was seen
    pub fn confirm_rotation(&mut self, now_ms: u64) -> Result<(), Error> {
        if self.stage != ValidationStage::WaitRotation {
            return Err(Error::invalid_state("Not waiting for wheel rotation"));
        }
        if !self.rotation_detected {
            return Err(Error::invalid_state("No wheel rotation detected yet"));
        }
        self.rotation_confirmed = true;
        self.hall_status = SensorStatus::Healthy;
        self.enter(ValidationStage::WaitShake, now_ms);
        Ok(())
    }

    /// Operator confirms the shake was seen
    pub fn confirm_shake(&mut self, now_ms: u64) -> Result<(), Error> {
        if self.stage != ValidationStage::WaitShake {
            return Err(Error::invalid_state("Not waiting for trolley shake"));
        }
        if !self.shake_detected {
            return Err(Error::invalid_state("No shake detected yet"));
        }
        self.shake_confirmed = true;
        self.accel_status = SensorStatus::Healthy;
        self.enter(ValidationStage::SensorsReady, now_ms);
        Ok(())
    }

    /// Advance the sequence and apply stage timeouts
    pub fn update(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        let elapsed = now_ms.saturating_sub(self.stage_since_ms);
        let timed_out = elapsed > self.config.stage_timeout_ms as u64;

        match self.stage {
            ValidationStage::Start => self.begin_validation(now_ms),
            ValidationStage::WaitRotation if timed_out => {
                self.hall_status = SensorStatus::Timeout;
                self.enter(ValidationStage::Failed, now_ms);
            }
            ValidationStage::WaitShake if timed_out => {
                self.accel_status = SensorStatus::Timeout;
                self.enter(ValidationStage::Failed, now_ms);
            }
            ValidationStage::SensorsReady => {
                if self.rotation_confirmed && self.shake_confirmed {
                    self.ready = true;
                    self.enter(ValidationStage::SystemReady, now_ms);
                }
            }
            _ => {}
        }
    }

    /// Fail a validation in progress, e.g. on an overall time budget
    pub fn abort_validation(&mut self, now_ms: u64) {
        if !self.stage.is_validating() {
            return;
        }
        if self.hall_status == SensorStatus::Testing {
            self.hall_status = SensorStatus::Timeout;
        }
        if self.accel_status == SensorStatus::Testing {
            self.accel_status = SensorStatus::Timeout;
        }
        self.enter(ValidationStage::Failed, now_ms);
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn stage(&self) -> ValidationStage {
        self.stage
    }

    /// Milliseconds spent in the current stage
    pub fn stage_elapsed_ms(&self) -> u64 {
        self.now_ms.saturating_sub(self.stage_since_ms)
    }

    /// Motion commands are only allowed after validation
    pub fn check_command_safety(&self) -> Result<(), Error> {
        if self.ready {
            Ok(())
        } else {
            Err(Error::not_ready("Sensors not validated"))
        }
    }

    /// Operator guidance for the current stage
    pub fn status_message(&self) -> &'static str {
        match self.stage {
            ValidationStage::Start => "Sensor validation not started",
            ValidationStage::WaitRotation if self.rotation_detected => {
                "Wheel rotation detected - press H to confirm"
            }
            ValidationStage::WaitRotation => "ROTATE THE WHEEL to test the hall sensor",
            ValidationStage::WaitShake if self.shake_detected => {
                "Shake detected - press C to confirm"
            }
            ValidationStage::WaitShake => "SHAKE THE TROLLEY to test the accelerometer",
            ValidationStage::SensorsReady => "Sensors confirmed",
            ValidationStage::SystemReady => "All sensors validated",
            ValidationStage::Failed => "Sensor validation failed - press V to retry",
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        let pulse_recent = self.last_pulse_ms.is_some_and(|t| {
            self.now_ms.saturating_sub(t) <= self.config.pulse_health_timeout_ms as u64
        });

        SensorSnapshot {
            stage: self.stage,
            accel: self.accel,
            total_g: self.accel.magnitude_g(),
            dynamic_g: self.accel.dynamic_g(),
            last_impact_g: self.last_impact_g,
            last_impact_ms: self.last_impact_ms,
            rotation_detected: self.rotation_detected,
            shake_detected: self.shake_detected,
            hall_status: self.hall_status,
            accel_status: self.accel_status,
            pulse_recent,
            ready: self.ready,
        }
    }

    fn enter(&mut self, stage: ValidationStage, now_ms: u64) {
        self.stage = stage;
        self.stage_since_ms = now_ms;
    }

    fn clear_flags(&mut self) {
        self.rotation_detected = false;
        self.shake_detected = false;
        self.rotation_confirmed = false;
        self.shake_confirmed = false;
        self.ready = false;
    }
}
