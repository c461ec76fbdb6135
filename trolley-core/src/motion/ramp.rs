//! Speed ramp for smooth acceleration and deceleration
//!
//! Automatic mode drives the commanded speed through this ramp instead
//! of stepping straight to cruise.

/// Current ramp state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampState {
    /// Output is zero
    Stopped,
    /// Output is rising toward target
    Accelerating,
    /// Output is at target
    AtSpeed,
    /// Output is falling toward target
    Decelerating,
}

/// Linear speed ramp in m/s
#[derive(Debug, Clone)]
pub struct SpeedRamp {
    current: f32,
    target: f32,
    /// m/s²
    acceleration: f32,
    /// m/s²
    deceleration: f32,
    state: RampState,
}

impl SpeedRamp {
    pub fn new(acceleration: f32, deceleration: f32) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            acceleration,
            deceleration,
            state: RampState::Stopped,
        }
    }

    /// Jump the output to `speed` without ramping
    pub fn start_at(&mut self, speed: f32) {
        self.current = speed.max(0.0);
        self.update_state();
    }

    pub fn set_target(&mut self, speed: f32) {
        self.target = speed.max(0.0);
        self.update_state();
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn state(&self) -> RampState {
        self.state
    }

    pub fn is_at_target(&self) -> bool {
        matches!(self.state, RampState::AtSpeed | RampState::Stopped)
    }

    /// Advance the ramp by `delta_ms`, returning the new output
    pub fn update(&mut self, delta_ms: u32) -> f32 {
        let dt = delta_ms as f32 / 1000.0;

        if self.current < self.target {
            self.current = (self.current + self.acceleration * dt).min(self.target);
        } else if self.current > self.target {
            self.current = (self.current - self.deceleration * dt).max(self.target);
        }

        self.update_state();
        self.current
    }

    /// Drop output and target to zero
    pub fn stop(&mut self) {
        self.current = 0.0;
        self.target = 0.0;
        self.state = RampState::Stopped;
    }

    /// Milliseconds until the output reaches the target
    pub fn time_to_target_ms(&self) -> u32 {
        let diff = self.target - self.current;
        let rate = if diff >= 0.0 {
            self.acceleration
        } else {
            self.deceleration
        };
        if rate <= 0.0 {
            return u32::MAX;
        }
        (libm::fabsf(diff) / rate * 1000.0) as u32
    }

    fn update_state(&mut self) {
        self.state = if self.current <= 0.0 && self.target <= 0.0 {
            RampState::Stopped
        } else if self.current < self.target {
            RampState::Accelerating
        } else if self.current > self.target {
            RampState::Decelerating
        } else {
            RampState::AtSpeed
        };
    }
}
