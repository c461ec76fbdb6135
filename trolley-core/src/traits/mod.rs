//! Hardware abstraction traits
//!
//! These traits define the interface between the application logic
//! and hardware-specific implementations.

pub mod accel;
pub mod esc;
pub mod motion;

pub use accel::{AccelSample, Accelerometer, SensorError};
pub use esc::{EscError, EscOutput, ESC_DUTY_RESOLUTION};
pub use motion::{Direction, MotionHardware};
