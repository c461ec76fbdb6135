//! Motion hardware interface
//!
//! Turns speed commands into rate-limited ESC duties and turns the hall
//! pulse stream into speed, rotation count and position.

pub mod controller;
pub mod esc;
pub mod odometry;
pub mod ramp;

pub use controller::{MotionController, MotionStatus};
pub use esc::{ArmState, EscController};
pub use odometry::{Odometry, PulseEvent};
pub use ramp::{RampState, SpeedRamp};
