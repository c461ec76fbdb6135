//! Motion hardware trait
//!
//! The contract every mode drives the trolley through. Implemented by
//! [`crate::motion::MotionController`]; modes are generic over it so they
//! never see the ESC or the pulse path directly.

use crate::error::HardwareError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Travel direction along the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

/// Motor, arming and pulse-odometry contract
pub trait MotionHardware {
    /// Command a speed (m/s) and direction
    ///
    /// Fails with `InvalidRange` outside `[0, max]` and with `NotArmed`
    /// before arming completes; nothing changes on failure.
    fn set_speed(&mut self, speed: f32, forward: bool) -> Result<(), HardwareError>;

    /// Zero the command and let the output ramp back to neutral
    fn stop_motor(&mut self);

    /// Start the arming sequence; succeeds immediately if already armed
    fn arm(&mut self, now_ms: u64) -> Result<(), HardwareError>;

    /// Zero the command and drop the armed flag
    fn disarm(&mut self) -> Result<(), HardwareError>;

    /// Force neutral output and zero command; never fails
    fn emergency_stop(&mut self);

    fn is_armed(&self) -> bool;

    /// Arming sequence in progress
    fn is_arming(&self) -> bool;

    /// Smoothed measured speed (m/s)
    fn speed(&self) -> f32;

    fn commanded_speed(&self) -> f32;

    fn is_forward(&self) -> bool;

    /// Pulses since the last rotation-count reset
    fn rotation_count(&self) -> u32;

    fn reset_rotation_count(&mut self);

    /// Signed distance from the last position reset (m)
    fn position(&self) -> f32;

    fn reset_position(&mut self);

    /// Milliseconds since the last pulse, or since initialization if none
    fn time_since_last_pulse(&self, now_ms: u64) -> u64;

    /// Pulses received within the timeout while commanded to move
    fn is_pulse_healthy(&self) -> bool;

    /// Initialized, pulse path healthy and ESC tracking its target
    fn is_ready(&self) -> bool;

    fn rotations_to_distance(&self, rotations: u32) -> f32;

    fn distance_to_rotations(&self, distance_m: f32) -> u32;

    /// Absolute speed ceiling (m/s)
    fn max_speed(&self) -> f32;
}
