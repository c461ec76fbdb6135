//! Wire-end detection
//!
//! Three independent signals end a traversal: an accelerometer impact,
//! pulse silence seen on several consecutive checks, and a rolling mean
//! of measured speed falling well below the command. When several fire
//! on the same check, impact wins over speed drop, which wins over
//! pulse silence.

use heapless::Deque;

use crate::config::{AutomaticConfig, LearningConfig};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of speed samples in the rolling mean
pub const SPEED_WINDOW: usize = 5;

/// How a wire end (or the end of a traversal) was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DetectionMethod {
    #[default]
    None,
    Impact,
    PulseTimeout,
    SpeedDrop,
    UserStop,
}

impl DetectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::None => "None",
            DetectionMethod::Impact => "Impact",
            DetectionMethod::PulseTimeout => "Pulse timeout",
            DetectionMethod::SpeedDrop => "Speed drop",
            DetectionMethod::UserStop => "User stop",
        }
    }
}

/// Detector thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DetectorConfig {
    pub impact_threshold_g: f32,
    pub pulse_timeout_ms: u64,
    /// Consecutive over-timeout checks before pulse silence counts
    pub pulse_timeout_checks: u8,
    pub speed_drop_ratio: f32,
    pub speed_drop_min_command: f32,
}

impl From<&LearningConfig> for DetectorConfig {
    fn from(cfg: &LearningConfig) -> Self {
        Self {
            impact_threshold_g: cfg.impact_threshold_g,
            pulse_timeout_ms: cfg.pulse_timeout_ms as u64,
            pulse_timeout_checks: cfg.pulse_timeout_checks,
            speed_drop_ratio: cfg.speed_drop_ratio,
            speed_drop_min_command: cfg.speed_drop_min_command,
        }
    }
}

impl From<&AutomaticConfig> for DetectorConfig {
    fn from(cfg: &AutomaticConfig) -> Self {
        Self {
            impact_threshold_g: cfg.impact_threshold_g,
            pulse_timeout_ms: cfg.pulse_timeout_ms as u64,
            pulse_timeout_checks: 1,
            speed_drop_ratio: cfg.speed_drop_ratio,
            speed_drop_min_command: cfg.speed_drop_min_command,
        }
    }
}

/// Readings for one detection check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionInput {
    pub now_ms: u64,
    /// Gravity-compensated acceleration
    pub dynamic_g: f32,
    pub measured_speed: f32,
    pub commanded_speed: f32,
    /// Milliseconds since the last pulse
    pub pulse_silence_ms: u64,
}

/// Stateful wire-end detector, reset at the start of every traversal
#[derive(Debug, Clone)]
pub struct WireEndDetector {
    config: DetectorConfig,
    samples: Deque<f32, SPEED_WINDOW>,
    consecutive_timeouts: u8,
    /// Silence is never counted from before this time
    armed_at_ms: u64,
    speed_drop_enabled: bool,
}

impl WireEndDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            samples: Deque::new(),
            consecutive_timeouts: 0,
            armed_at_ms: 0,
            speed_drop_enabled: false,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Clear history at the start of a traversal
    pub fn reset(&mut self, now_ms: u64) {
        self.samples.clear();
        self.consecutive_timeouts = 0;
        self.armed_at_ms = now_ms;
        self.speed_drop_enabled = false;
    }

    /// Only sample speed once the trolley has proven it can move
    pub fn enable_speed_drop(&mut self, enabled: bool) {
        if !enabled {
            self.samples.clear();
        }
        self.speed_drop_enabled = enabled;
    }

    /// Restart the silence reference (e.g. after a pause)
    pub fn rearm_silence(&mut self, now_ms: u64) {
        self.armed_at_ms = now_ms;
        self.consecutive_timeouts = 0;
    }

    /// Mean of the current speed window, if full
    pub fn average_speed(&self) -> Option<f32> {
        if !self.samples.is_full() {
            return None;
        }
        let sum: f32 = self.samples.iter().sum();
        Some(sum / SPEED_WINDOW as f32)
    }

    /// Run one check, returning the highest-priority method that fired
    pub fn check(&mut self, input: &DetectionInput) -> Option<DetectionMethod> {
        let impact = input.dynamic_g > self.config.impact_threshold_g;

        let silence = input
            .pulse_silence_ms
            .min(input.now_ms.saturating_sub(self.armed_at_ms));
        if silence > self.config.pulse_timeout_ms {
            self.consecutive_timeouts = self.consecutive_timeouts.saturating_add(1);
        } else {
            self.consecutive_timeouts = 0;
        }
        let pulse_timeout = self.consecutive_timeouts >= self.config.pulse_timeout_checks;

        let mut speed_drop = false;
        if self.speed_drop_enabled && input.commanded_speed > self.config.speed_drop_min_command {
            if self.samples.is_full() {
                self.samples.pop_front();
            }
            // Window is never full after pop_front, so push cannot fail
            let _ = self.samples.push_back(input.measured_speed);
            if let Some(avg) = self.average_speed() {
                speed_drop = avg < input.commanded_speed * self.config.speed_drop_ratio;
            }
        }

        if impact {
            Some(DetectionMethod::Impact)
        } else if speed_drop {
            Some(DetectionMethod::SpeedDrop)
        } else if pulse_timeout {
            Some(DetectionMethod::PulseTimeout)
        } else {
            None
        }
    }
}
