//! Manual control
//!
//! Discrete operator commands with rate limiting, speed sanity checks
//! and continuous impact and pulse-liveness monitoring.

pub mod command;
pub mod mode;
pub mod state;

pub use command::{CommandHistory, ManualCommand, ManualCommandType, RateLimiter, SessionStats};
pub use mode::{ManualMode, ManualStatus};
pub use state::{ManualEvent, ManualState};
