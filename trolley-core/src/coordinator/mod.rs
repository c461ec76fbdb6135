//! Mode coordination
//!
//! Decides which of the three modes may run and routes stops, emergency
//! stops and learned data between them.

pub mod arbiter;
pub mod availability;

pub use arbiter::ModeCoordinator;
pub use availability::{ModeAvailability, OperationMode, SensorValidationState};
