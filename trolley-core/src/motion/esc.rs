//! ESC command path
//!
//! Maps speeds to duties, runs the non-blocking arming sequence and
//! rate-limits the duty written to the output on every update.

use crate::config::HardwareConfig;
use crate::traits::EscOutput;

/// Arming sequence progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmState {
    Disarmed,
    /// Holding neutral so the ESC sees a valid idle pulse
    NeutralHold { since_ms: u64 },
    /// Holding the arming pulse
    SignalHold { since_ms: u64 },
    Armed,
}

impl ArmState {
    pub fn is_arming(&self) -> bool {
        matches!(self, ArmState::NeutralHold { .. } | ArmState::SignalHold { .. })
    }
}

/// Duty generation and output stage
#[derive(Debug, Clone)]
pub struct EscController {
    config: HardwareConfig,
    arm: ArmState,
    /// Duty the output is moving toward
    target_duty: u16,
    /// Duty last written
    applied_duty: u16,
    rate_limiting: bool,
    /// Last write succeeded
    output_ok: bool,
    /// Start of the current gap between applied and target duty
    tracking_gap_since: Option<u64>,
    tracking_ok: bool,
}

impl EscController {
    pub fn new(config: HardwareConfig) -> Self {
        Self {
            config,
            arm: ArmState::Disarmed,
            target_duty: config.esc_neutral_duty,
            applied_duty: config.esc_neutral_duty,
            rate_limiting: true,
            output_ok: true,
            tracking_gap_since: None,
            tracking_ok: true,
        }
    }

    /// Map a speed and direction to a duty
    ///
    /// Forward spans neutral..max, reverse spans neutral..min. Speeds in
    /// the deadband map to neutral.
    pub fn speed_to_duty(&self, speed: f32, forward: bool) -> u16 {
        let cfg = &self.config;
        if speed < cfg.speed_deadband {
            return cfg.esc_neutral_duty;
        }

        let ratio = (speed / cfg.max_speed).clamp(0.0, 1.0);
        let neutral = cfg.esc_neutral_duty as f32;
        let duty = if forward {
            neutral + ratio * (cfg.esc_max_duty - cfg.esc_neutral_duty) as f32
        } else {
            neutral - ratio * (cfg.esc_neutral_duty - cfg.esc_min_duty) as f32
        };

        (duty + 0.5) as u16
    }

    pub fn arm_state(&self) -> ArmState {
        self.arm
    }

    pub fn is_armed(&self) -> bool {
        self.arm == ArmState::Armed
    }

    /// Begin arming; no-op if armed or already arming
    pub fn begin_arming(&mut self, now_ms: u64) {
        if self.arm == ArmState::Disarmed {
            self.arm = ArmState::NeutralHold { since_ms: now_ms };
            self.target_duty = self.config.esc_neutral_duty;
        }
    }

    pub fn disarm(&mut self) {
        self.arm = ArmState::Disarmed;
        self.target_duty = self.config.esc_neutral_duty;
    }

    /// Set the duty the output should move toward
    pub fn set_target(&mut self, duty: u16) {
        self.target_duty = duty;
    }

    pub fn target_duty(&self) -> u16 {
        self.target_duty
    }

    pub fn applied_duty(&self) -> u16 {
        self.applied_duty
    }

    pub fn set_rate_limiting(&mut self, enabled: bool) {
        self.rate_limiting = enabled;
    }

    /// Output accepted the last write and is tracking the target
    pub fn is_responding(&self) -> bool {
        self.output_ok && self.tracking_ok
    }

    /// Write neutral immediately, abandoning any arming in progress
    pub fn force_neutral<E: EscOutput>(&mut self, output: &mut E) {
        if self.arm.is_arming() {
            self.arm = ArmState::Disarmed;
        }
        self.target_duty = self.config.esc_neutral_duty;
        self.write(output, self.config.esc_neutral_duty);
        self.tracking_gap_since = None;
        self.tracking_ok = true;
    }

    /// Write a duty immediately, bypassing the rate limit
    pub fn write_direct<E: EscOutput>(&mut self, output: &mut E, duty: u16) {
        self.target_duty = duty;
        self.write(output, duty);
    }

    /// Advance the arming sequence and step the output toward target
    pub fn update<E: EscOutput>(&mut self, output: &mut E, now_ms: u64) {
        match self.arm {
            ArmState::NeutralHold { since_ms } => {
                if now_ms.saturating_sub(since_ms) >= self.config.arm_neutral_hold_ms as u64 {
                    self.arm = ArmState::SignalHold { since_ms: now_ms };
                    self.write_direct(output, self.config.esc_arm_duty);
                } else {
                    self.write_direct(output, self.config.esc_neutral_duty);
                }
                return;
            }
            ArmState::SignalHold { since_ms } => {
                if now_ms.saturating_sub(since_ms) >= self.config.arm_signal_hold_ms as u64 {
                    self.arm = ArmState::Armed;
                    self.write_direct(output, self.config.esc_neutral_duty);
                } else {
                    self.write_direct(output, self.config.esc_arm_duty);
                }
                return;
            }
            ArmState::Disarmed | ArmState::Armed => {}
        }

        let next = if self.rate_limiting {
            step_toward(self.applied_duty, self.target_duty, self.config.max_duty_step)
        } else {
            self.target_duty
        };
        self.write(output, next);
        self.check_tracking(now_ms);
    }

    fn write<E: EscOutput>(&mut self, output: &mut E, duty: u16) {
        match output.set_duty(duty) {
            Ok(()) => {
                self.applied_duty = duty;
                self.output_ok = true;
            }
            Err(_) => self.output_ok = false,
        }
    }

    fn check_tracking(&mut self, now_ms: u64) {
        let gap = self.applied_duty.abs_diff(self.target_duty);
        if gap <= self.config.duty_tracking_tolerance {
            self.tracking_gap_since = None;
            self.tracking_ok = true;
            return;
        }

        let since = *self.tracking_gap_since.get_or_insert(now_ms);
        if now_ms.saturating_sub(since) > self.config.duty_tracking_grace_ms as u64 {
            self.tracking_ok = false;
        }
    }
}

/// Move `from` toward `to` by at most `max_step`
fn step_toward(from: u16, to: u16, max_step: u16) -> u16 {
    if to > from {
        from.saturating_add(max_step).min(to)
    } else {
        from.saturating_sub(max_step).max(to)
    }
}
