//! Pulse odometry
//!
//! One hall pulse per wheel revolution is the only source of speed,
//! distance and position. Pulses carry no direction; each one is
//! attributed to the direction commanded when it is consumed, so a
//! direction change between pulses can misattribute one revolution.

use crate::config::HardwareConfig;

/// A captured hall pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseEvent {
    pub timestamp_ms: u64,
}

/// Pulse counters and derived speed/position
#[derive(Debug, Clone)]
pub struct Odometry {
    circumference_m: f32,
    smoothing: f32,
    timeout_ms: u64,
    deadband: f32,
    /// Raw pulse count since power-up
    total_pulses: u32,
    /// `total_pulses` at the last rotation-count reset
    rotation_offset: u32,
    position_m: f32,
    speed: f32,
    last_pulse_ms: Option<u64>,
    /// Time the motor was last commanded away from standstill
    motion_since_ms: u64,
    healthy: bool,
}

impl Odometry {
    pub fn new(config: &HardwareConfig) -> Self {
        Self {
            circumference_m: config.wheel_circumference_m,
            smoothing: config.speed_smoothing,
            timeout_ms: config.pulse_timeout_ms as u64,
            deadband: config.speed_deadband,
            total_pulses: 0,
            rotation_offset: 0,
            position_m: 0.0,
            speed: 0.0,
            last_pulse_ms: None,
            motion_since_ms: 0,
            healthy: true,
        }
    }

    /// Consume one pulse
    pub fn record_pulse(&mut self, event: PulseEvent, forward: bool) {
        if let Some(last) = self.last_pulse_ms {
            let dt_ms = event.timestamp_ms.saturating_sub(last);
            // A pulse after a long silence is a restart, not a speed sample
            if dt_ms > 0 && dt_ms <= self.timeout_ms {
                let sample = self.circumference_m / (dt_ms as f32 / 1000.0);
                self.speed = self.smoothing * sample + (1.0 - self.smoothing) * self.speed;
            }
        }

        self.total_pulses = self.total_pulses.wrapping_add(1);
        if forward {
            self.position_m += self.circumference_m;
        } else {
            self.position_m -= self.circumference_m;
        }
        self.last_pulse_ms = Some(event.timestamp_ms);
        self.healthy = true;
    }

    /// Note that the motor has just been commanded away from standstill
    pub fn note_motion_start(&mut self, now_ms: u64) {
        self.motion_since_ms = now_ms;
    }

    /// Apply the silence timeout
    ///
    /// Silence zeroes measured speed. The pulse path is only marked
    /// unhealthy when the motor is commanded to move.
    pub fn update(&mut self, now_ms: u64, commanded_speed: f32) {
        let reference = self
            .last_pulse_ms
            .map_or(self.motion_since_ms, |last| last.max(self.motion_since_ms));

        if now_ms.saturating_sub(reference) > self.timeout_ms {
            self.speed = 0.0;
            if commanded_speed > self.deadband {
                self.healthy = false;
            }
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn total_pulses(&self) -> u32 {
        self.total_pulses
    }

    pub fn rotation_count(&self) -> u32 {
        self.total_pulses.wrapping_sub(self.rotation_offset)
    }

    pub fn reset_rotation_count(&mut self) {
        self.rotation_offset = self.total_pulses;
    }

    pub fn position(&self) -> f32 {
        self.position_m
    }

    pub fn reset_position(&mut self) {
        self.position_m = 0.0;
    }

    pub fn last_pulse_ms(&self) -> Option<u64> {
        self.last_pulse_ms
    }

    /// Milliseconds since the last pulse (or since boot when none yet)
    pub fn time_since_last_pulse(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_pulse_ms.unwrap_or(0))
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn rotations_to_distance(&self, rotations: u32) -> f32 {
        rotations as f32 * self.circumference_m
    }

    pub fn distance_to_rotations(&self, distance_m: f32) -> u32 {
        if distance_m <= 0.0 {
            return 0;
        }
        (distance_m / self.circumference_m + 0.5) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odometry() -> Odometry {
        Odometry::new(&HardwareConfig::default())
    }

    fn pulse(t: u64) -> PulseEvent {
        PulseEvent { timestamp_ms: t }
    }

    #[test]
    fn test_position_follows_direction_flag() {
        let mut odo = odometry();
        for i in 0..10 {
            odo.record_pulse(pulse(i * 100), true);
        }
        for i in 10..14 {
            odo.record_pulse(pulse(i * 100), false);
        }
        assert!((odo.position() - 6.0 * 0.1916).abs() < 1e-4);
        assert_eq!(odo.total_pulses(), 14);
    }

    #[test]
    fn test_speed_smoothing() {
        let mut odo = odometry();
        odo.record_pulse(pulse(0), true);
        assert_eq!(odo.speed(), 0.0);

        // 0.1916 m in 100 ms = 1.916 m/s; first sample weighted 0.3
        odo.record_pulse(pulse(100), true);
        assert!((odo.speed() - 0.3 * 1.916).abs() < 1e-4);

        for i in 2..40 {
            odo.record_pulse(pulse(i * 100), true);
        }
        assert!((odo.speed() - 1.916).abs() < 1e-3);
    }

    #[test]
    fn test_rotation_reset_keeps_raw_count() {
        let mut odo = odometry();
        for i in 0..5 {
            odo.record_pulse(pulse(i * 100), true);
        }
        odo.reset_rotation_count();
        odo.record_pulse(pulse(600), true);
        assert_eq!(odo.rotation_count(), 1);
        assert_eq!(odo.total_pulses(), 6);
    }

    #[test]
    fn test_silence_zeroes_speed_without_fault_when_idle() {
        let mut odo = odometry();
        odo.record_pulse(pulse(0), true);
        odo.record_pulse(pulse(100), true);
        odo.update(2101, 0.0);
        assert_eq!(odo.speed(), 0.0);
        assert!(odo.is_healthy());
    }

    #[test]
    fn test_silence_while_commanded_marks_unhealthy() {
        let mut odo = odometry();
        odo.note_motion_start(1000);
        odo.update(2500, 0.5);
        assert!(odo.is_healthy());
        odo.update(3001, 0.5);
        assert!(!odo.is_healthy());

        odo.record_pulse(pulse(3100), true);
        assert!(odo.is_healthy());
    }

    #[test]
    fn test_unit_conversions() {
        let odo = odometry();
        assert!((odo.rotations_to_distance(500) - 95.8).abs() < 1e-3);
        assert_eq!(odo.distance_to_rotations(95.8), 500);
        assert_eq!(odo.distance_to_rotations(-1.0), 0);
    }
}
