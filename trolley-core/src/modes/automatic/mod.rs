//! Automatic cycling
//!
//! Repeated forward and reverse runs at cruise speed over a learned wire,
//! cutting power a calibrated coasting distance before each end.

pub mod mode;
pub mod state;

pub use mode::{AutomaticMode, AutomaticProgress, AutomaticResults, CycleRecord};
pub use state::{AutomaticEvent, AutomaticState};
