//! Board-agnostic core logic for the wire trolley firmware
//!
//! This crate contains all application logic that does not depend on
//! specific hardware implementations:
//!
//! - Hardware abstraction traits (ESC output, accelerometer, motion)
//! - Motion hardware interface (duty mapping, arming, pulse odometry)
//! - Sensor health monitoring and guided validation
//! - Wire-end detection heuristics
//! - Wire learning, automatic cycling and manual control state machines
//! - Mode coordination and single-character command ingress
//! - Configuration constants and persisted record definitions
//!
//! Everything is driven by explicit millisecond timestamps, so the whole
//! system can be exercised on the host with synthetic pulse streams.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod modes;
pub mod motion;
pub mod safety;
pub mod status;
pub mod system;
pub mod traits;

pub use error::{Error, ErrorKind};
pub use system::TrolleySystem;
