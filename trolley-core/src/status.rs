//! Whole-system status snapshot for egress
//!
//! Built on demand by [`TrolleySystem::status`](crate::TrolleySystem::status);
//! transports read it instead of reaching into the components.

use core::fmt::{self, Write};

use crate::coordinator::{ModeAvailability, OperationMode, SensorValidationState};
use crate::modes::automatic::AutomaticProgress;
use crate::modes::learning::LearningProgress;
use crate::modes::manual::ManualStatus;
use crate::modes::Message;
use crate::motion::MotionStatus;
use crate::safety::SensorSnapshot;

/// Progress of whichever mode is active
#[derive(Debug, Clone, PartialEq)]
pub enum ModeDetail {
    Idle,
    WireLearning(LearningProgress),
    Automatic(AutomaticProgress),
    Manual(ManualStatus),
}

/// Snapshot of the system at one tick
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    pub timestamp_ms: u64,
    pub mode: OperationMode,
    pub learning_availability: ModeAvailability,
    pub automatic_availability: ModeAvailability,
    pub manual_availability: ModeAvailability,
    pub validation: SensorValidationState,
    pub sensors: SensorSnapshot,
    pub motion: MotionStatus,
    pub healthy: bool,
    pub motion_safe: bool,
    pub error_count: u32,
    /// Learned wire length, once a complete learning result exists
    pub wire_length_m: Option<f32>,
    pub coasting_distance_m: Option<f32>,
    pub detail: ModeDetail,
    pub mode_status: Message,
    pub error: Message,
}

impl SystemStatus {
    pub fn availability(&self, mode: OperationMode) -> Option<ModeAvailability> {
        match mode {
            OperationMode::WireLearning => Some(self.learning_availability),
            OperationMode::Automatic => Some(self.automatic_availability),
            OperationMode::Manual => Some(self.manual_availability),
            OperationMode::None => None,
        }
    }

    pub fn esc_state(&self) -> &'static str {
        if self.motion.armed {
            "Armed"
        } else if self.motion.arming {
            "Arming"
        } else {
            "Disarmed"
        }
    }

    /// One-line summary, as answered to the status command
    pub fn write_summary<W: Write>(&self, out: &mut W) -> fmt::Result {
        write!(
            out,
            "Status: Mode={}, Sensors={}, ESC={}, Speed={:.1} m/s, Position={:.1} m",
            self.mode.as_str(),
            if self.sensors.ready { "Validated" } else { "Not validated" },
            self.esc_state(),
            self.motion.measured_speed,
            self.motion.position_m,
        )
    }

    /// Multi-line report listing each mode's availability
    pub fn write_report<W: Write>(&self, out: &mut W) -> fmt::Result {
        self.write_summary(out)?;
        writeln!(out)?;
        for mode in OperationMode::ALL {
            if let Some(availability) = self.availability(mode) {
                writeln!(out, "  {}: {}", mode.as_str(), availability.as_str())?;
            }
        }
        writeln!(out, "  Validation: {}", self.validation.as_str())?;
        writeln!(
            out,
            "  Health: {} ({} errors)",
            if self.healthy { "Healthy" } else { "Error" },
            self.error_count
        )?;
        if let Some(length) = self.wire_length_m {
            writeln!(out, "  Wire: {:.2} m", length)?;
        }
        if let Some(distance) = self.coasting_distance_m {
            writeln!(out, "  Coasting: {:.2} m", distance)?;
        }
        write!(out, "  {}", self.mode_status)?;
        if !self.error.is_empty() {
            write!(out, "\n  Last error: {}", self.error)?;
        }
        Ok(())
    }
}
