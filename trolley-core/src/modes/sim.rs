//! Simulated trolley on a wire for mode tests

use crate::error::HardwareError;
use crate::safety::{SensorHealthMonitor, SensorSnapshot};
use crate::config::SensorConfig;
use crate::traits::{AccelSample, MotionHardware};

pub(crate) const TICK_MS: u64 = 20;
const CIRCUMFERENCE: f32 = 0.1916;

/// Trolley that moves at exactly the commanded speed and stops dead at
/// either end of the wire with a jolt
#[derive(Debug)]
pub(crate) struct SimTrolley {
    pub armed: bool,
    arming_until: Option<u64>,
    pub arm_duration_ms: u64,
    pub arm_fails: bool,
    pub commanded: f32,
    pub forward: bool,
    pub velocity: f32,
    /// Deceleration while unpowered (m/s²)
    pub coast_decel: f32,
    /// Wheel turns freely but the trolley does not move
    pub stalled: bool,
    pub location_m: f32,
    pub forward_end_m: f32,
    pub reverse_end_m: f32,
    wheel_travel_m: f32,
    pub rotations: u32,
    pub position_m: f32,
    pub last_pulse_ms: Option<u64>,
    pub jolt: bool,
    pub emergency_stops: u32,
    pub max_speed: f32,
}

impl SimTrolley {
    pub fn new(wire_length_m: f32) -> Self {
        Self {
            armed: false,
            arming_until: None,
            arm_duration_ms: 100,
            arm_fails: false,
            commanded: 0.0,
            forward: true,
            velocity: 0.0,
            coast_decel: 1000.0,
            stalled: false,
            location_m: 0.0,
            forward_end_m: wire_length_m,
            reverse_end_m: 0.0,
            wheel_travel_m: 0.0,
            rotations: 0,
            position_m: 0.0,
            last_pulse_ms: None,
            jolt: false,
            emergency_stops: 0,
            max_speed: 2.0,
        }
    }

    /// Advance physics by one tick ending at `now_ms`
    pub fn step(&mut self, now_ms: u64) {
        self.jolt = false;
        if let Some(until) = self.arming_until {
            if now_ms >= until {
                self.arming_until = None;
                self.armed = !self.arm_fails;
            }
        }

        if self.commanded > 0.0 && self.armed {
            self.velocity = self.commanded;
        } else {
            self.velocity = (self.velocity - self.coast_decel * TICK_MS as f32 / 1000.0).max(0.0);
        }
        if self.stalled || self.velocity == 0.0 {
            self.velocity = 0.0;
            return;
        }

        let mut delta = self.velocity * TICK_MS as f32 / 1000.0;
        if self.forward {
            let room = self.forward_end_m - self.location_m;
            if delta >= room {
                delta = room.max(0.0);
                self.hit_end();
            }
            self.location_m += delta;
        } else {
            let room = self.location_m - self.reverse_end_m;
            if delta >= room {
                delta = room.max(0.0);
                self.hit_end();
            }
            self.location_m -= delta;
        }

        self.wheel_travel_m += delta;
        while self.wheel_travel_m >= CIRCUMFERENCE {
            self.wheel_travel_m -= CIRCUMFERENCE;
            self.rotations += 1;
            self.position_m += if self.forward { CIRCUMFERENCE } else { -CIRCUMFERENCE };
            self.last_pulse_ms = Some(now_ms);
        }
    }

    fn hit_end(&mut self) {
        self.velocity = 0.0;
        self.jolt = true;
    }

    /// Sensor snapshot with a 1.5 g jolt on the tick the trolley hit an end
    pub fn snapshot(&self) -> SensorSnapshot {
        let mut sensors = SensorHealthMonitor::new(SensorConfig::default()).snapshot();
        sensors.ready = true;
        if self.jolt {
            sensors.accel = AccelSample::new(0.0, 0.0, 2.5);
            sensors.total_g = 2.5;
            sensors.dynamic_g = 1.5;
        } else {
            sensors.accel = AccelSample::at_rest();
            sensors.total_g = 1.0;
            sensors.dynamic_g = 0.0;
        }
        sensors
    }
}

impl MotionHardware for SimTrolley {
    fn set_speed(&mut self, speed: f32, forward: bool) -> Result<(), HardwareError> {
        if !self.armed {
            return Err(HardwareError::NotArmed);
        }
        if !(0.0..=self.max_speed).contains(&speed) {
            return Err(HardwareError::InvalidRange);
        }
        self.commanded = speed;
        self.forward = forward;
        Ok(())
    }

    fn stop_motor(&mut self) {
        self.commanded = 0.0;
    }

    fn arm(&mut self, now_ms: u64) -> Result<(), HardwareError> {
        if !self.armed {
            self.arming_until = Some(now_ms + self.arm_duration_ms);
        }
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), HardwareError> {
        self.commanded = 0.0;
        self.armed = false;
        self.arming_until = None;
        Ok(())
    }

    fn emergency_stop(&mut self) {
        self.commanded = 0.0;
        self.arming_until = None;
        self.emergency_stops += 1;
    }

    fn is_armed(&self) -> bool {
        self.armed
    }

    fn is_arming(&self) -> bool {
        self.arming_until.is_some()
    }

    fn speed(&self) -> f32 {
        self.velocity
    }

    fn commanded_speed(&self) -> f32 {
        self.commanded
    }

    fn is_forward(&self) -> bool {
        self.forward
    }

    fn rotation_count(&self) -> u32 {
        self.rotations
    }

    fn reset_rotation_count(&mut self) {
        self.rotations = 0;
    }

    fn position(&self) -> f32 {
        self.position_m
    }

    fn reset_position(&mut self) {
        self.position_m = 0.0;
    }

    fn time_since_last_pulse(&self, now_ms: u64) -> u64 {
        self.last_pulse_ms.map_or(u64::MAX, |t| now_ms.saturating_sub(t))
    }

    fn is_pulse_healthy(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn rotations_to_distance(&self, rotations: u32) -> f32 {
        rotations as f32 * CIRCUMFERENCE
    }

    fn distance_to_rotations(&self, distance_m: f32) -> u32 {
        (distance_m / CIRCUMFERENCE) as u32
    }

    fn max_speed(&self) -> f32 {
        self.max_speed
    }
}
