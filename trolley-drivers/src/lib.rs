//! Hardware driver implementations
//!
//! Concrete implementations of the traits defined in trolley-core, written
//! against `embedded-hal` 1.0 so they run on any HAL:
//!
//! - ESC output over a PWM channel
//! - MPU-6050 accelerometer over I2C

#![no_std]
#![deny(unsafe_code)]

pub mod esc;
pub mod sensor;
