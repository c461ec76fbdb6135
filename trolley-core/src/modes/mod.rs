//! Operating modes
//!
//! Each mode is a pure state enum with a `transition` function plus a
//! driver struct that performs the hardware calls at transition
//! boundaries. Drivers are updated every tick with the current time, the
//! motion hardware and the latest sensor snapshot, and report results and
//! fatal errors back as [`ModeEvent`]s.

use core::fmt::{self, Write};

use crate::config::{CoastingCalibration, TrolleyConfig, WireLearningResult};
use crate::error::Error;

pub mod automatic;
pub mod learning;
pub mod manual;

#[cfg(test)]
pub(crate) mod sim;

pub use automatic::{AutomaticMode, AutomaticState};
pub use learning::{LearningState, WireLearningMode};
pub use manual::{ManualMode, ManualState};

/// The three mode drivers; the coordinator keeps at most one active
pub struct ModeSet {
    pub learning: WireLearningMode,
    pub automatic: AutomaticMode,
    pub manual: ManualMode,
}

impl ModeSet {
    pub fn new(config: &TrolleyConfig) -> Self {
        Self {
            learning: WireLearningMode::new(config.learning),
            automatic: AutomaticMode::new(config.automatic),
            manual: ManualMode::new(config.manual),
        }
    }

    /// Number of modes currently reporting active
    pub fn active_count(&self) -> usize {
        [
            self.learning.is_active(),
            self.automatic.is_active(),
            self.manual.is_active(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }
}

/// Capacity of status and error strings
pub const MESSAGE_LEN: usize = 96;

/// Operator-facing status or error text
pub type Message = heapless::String<MESSAGE_LEN>;

/// Writer that drops whatever does not fit
pub(crate) struct Truncating<'a, const N: usize>(pub &'a mut heapless::String<N>);

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Format a message, truncating at capacity
pub fn format_message(args: fmt::Arguments<'_>) -> Message {
    let mut msg = Message::new();
    // Truncating never reports an error
    let _ = Truncating(&mut msg).write_fmt(args);
    msg
}

/// Copy static text into a message
pub fn message(text: &str) -> Message {
    format_message(format_args!("{}", text))
}

/// Results and failures a mode pushes to the coordinator
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeEvent {
    /// Wire learning finished with a consistent result
    WireLearningComplete(WireLearningResult),
    /// A coasting calibration was measured
    CoastingCalibrated(CoastingCalibration),
    /// Mode-fatal error; the mode has already stopped the hardware
    Fault(Error),
}
