//! Motion controller
//!
//! Owns the ESC output and the odometry and implements
//! [`MotionHardware`] for the modes.

use crate::config::HardwareConfig;
use crate::error::HardwareError;
use crate::traits::{EscOutput, MotionHardware};

use super::esc::{ArmState, EscController};
use super::odometry::{Odometry, PulseEvent};

/// Snapshot of the motion hardware state
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionStatus {
    pub initialized: bool,
    pub armed: bool,
    pub arming: bool,
    pub commanded_speed: f32,
    pub forward: bool,
    pub measured_speed: f32,
    pub total_pulses: u32,
    pub rotation_count: u32,
    pub last_pulse_ms: Option<u64>,
    pub position_m: f32,
    pub target_duty: u16,
    pub applied_duty: u16,
    pub pulse_healthy: bool,
    pub esc_responding: bool,
    pub ready: bool,
}

/// ESC output plus pulse odometry
pub struct MotionController<E> {
    config: HardwareConfig,
    output: E,
    esc: EscController,
    odometry: Odometry,
    initialized: bool,
    commanded_speed: f32,
    forward: bool,
    /// Commanded above the deadband at the last update
    moving: bool,
}

impl<E: EscOutput> MotionController<E> {
    pub fn new(config: HardwareConfig, output: E) -> Self {
        Self {
            config,
            output,
            esc: EscController::new(config),
            odometry: Odometry::new(&config),
            initialized: false,
            commanded_speed: 0.0,
            forward: true,
            moving: false,
        }
    }

    /// Drive the output to neutral and accept commands
    pub fn init(&mut self) -> Result<(), HardwareError> {
        self.esc.force_neutral(&mut self.output);
        if !self.esc.is_responding() {
            return Err(HardwareError::NotInitialized);
        }
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Output update step: timeouts, arming sequence, rate-limited duty
    pub fn update(&mut self, now_ms: u64) {
        if !self.initialized {
            return;
        }

        let moving = self.commanded_speed > self.config.speed_deadband;
        if moving && !self.moving {
            self.odometry.note_motion_start(now_ms);
        }
        self.moving = moving;

        self.odometry.update(now_ms, self.commanded_speed);
        self.esc.update(&mut self.output, now_ms);
    }

    /// Pulse consumer; attributes the pulse to the commanded direction
    pub fn record_pulse(&mut self, event: PulseEvent) {
        self.odometry.record_pulse(event, self.forward);
    }

    /// Write a raw duty, bypassing speed mapping and rate limiting
    pub fn set_duty_direct(&mut self, duty: u16) -> Result<(), HardwareError> {
        if !self.initialized {
            return Err(HardwareError::NotInitialized);
        }
        if duty < self.config.esc_min_duty || duty > self.config.esc_max_duty {
            return Err(HardwareError::InvalidRange);
        }
        self.esc.write_direct(&mut self.output, duty);
        Ok(())
    }

    pub fn set_rate_limiting(&mut self, enabled: bool) {
        self.esc.set_rate_limiting(enabled);
    }

    pub fn arm_state(&self) -> ArmState {
        self.esc.arm_state()
    }

    pub fn total_pulses(&self) -> u32 {
        self.odometry.total_pulses()
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn output(&self) -> &E {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut E {
        &mut self.output
    }

    pub fn status(&self) -> MotionStatus {
        MotionStatus {
            initialized: self.initialized,
            armed: self.esc.is_armed(),
            arming: self.esc.arm_state().is_arming(),
            commanded_speed: self.commanded_speed,
            forward: self.forward,
            measured_speed: self.odometry.speed(),
            total_pulses: self.odometry.total_pulses(),
            rotation_count: self.odometry.rotation_count(),
            last_pulse_ms: self.odometry.last_pulse_ms(),
            position_m: self.odometry.position(),
            target_duty: self.esc.target_duty(),
            applied_duty: self.esc.applied_duty(),
            pulse_healthy: self.odometry.is_healthy(),
            esc_responding: self.esc.is_responding(),
            ready: self.is_ready(),
        }
    }
}

impl<E: EscOutput> MotionHardware for MotionController<E> {
    fn set_speed(&mut self, speed: f32, forward: bool) -> Result<(), HardwareError> {
        if !self.initialized {
            return Err(HardwareError::NotInitialized);
        }
        if !(0.0..=self.config.max_speed).contains(&speed) {
            return Err(HardwareError::InvalidRange);
        }
        if !self.esc.is_armed() {
            return Err(HardwareError::NotArmed);
        }

        self.commanded_speed = speed;
        self.forward = forward;
        let duty = self.esc.speed_to_duty(speed, forward);
        self.esc.set_target(duty);
        Ok(())
    }

    fn stop_motor(&mut self) {
        self.commanded_speed = 0.0;
        self.esc.set_target(self.config.esc_neutral_duty);
    }

    fn arm(&mut self, now_ms: u64) -> Result<(), HardwareError> {
        if !self.initialized {
            return Err(HardwareError::NotInitialized);
        }
        self.esc.begin_arming(now_ms);
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), HardwareError> {
        self.commanded_speed = 0.0;
        self.esc.disarm();
        Ok(())
    }

    fn emergency_stop(&mut self) {
        self.commanded_speed = 0.0;
        self.esc.force_neutral(&mut self.output);
    }

    fn is_armed(&self) -> bool {
        self.esc.is_armed()
    }

    fn is_arming(&self) -> bool {
        self.esc.arm_state().is_arming()
    }

    fn speed(&self) -> f32 {
        self.odometry.speed()
    }

    fn commanded_speed(&self) -> f32 {
        self.commanded_speed
    }

    fn is_forward(&self) -> bool {
        self.forward
    }

    fn rotation_count(&self) -> u32 {
        self.odometry.rotation_count()
    }

    fn reset_rotation_count(&mut self) {
        self.odometry.reset_rotation_count();
    }

    fn position(&self) -> f32 {
        self.odometry.position()
    }

    fn reset_position(&mut self) {
        self.odometry.reset_position();
    }

    fn time_since_last_pulse(&self, now_ms: u64) -> u64 {
        self.odometry.time_since_last_pulse(now_ms)
    }

    fn is_pulse_healthy(&self) -> bool {
        self.odometry.is_healthy()
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.odometry.is_healthy() && self.esc.is_responding()
    }

    fn rotations_to_distance(&self, rotations: u32) -> f32 {
        self.odometry.rotations_to_distance(rotations)
    }

    fn distance_to_rotations(&self, distance_m: f32) -> u32 {
        self.odometry.distance_to_rotations(distance_m)
    }

    fn max_speed(&self) -> f32 {
        self.config.max_speed
    }
}
