//! Wire learning
//!
//! Measures the wire by running to each end at a stepped speed ramp and
//! recommends a cruise speed for automatic mode.

pub mod mode;
pub mod state;

pub use mode::{DirectionRecord, LearningProgress, WireLearningMode};
pub use state::{LearningEvent, LearningState};
