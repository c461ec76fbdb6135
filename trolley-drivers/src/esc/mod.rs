//! ESC output drivers

pub mod pwm;

pub use pwm::PwmEsc;
