//! Mode identities and the derived availability values

use crate::safety::{SensorSnapshot, ValidationStage};

/// Operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperationMode {
    #[default]
    None,
    WireLearning,
    Automatic,
    Manual,
}

impl OperationMode {
    pub const ALL: [OperationMode; 3] = [
        OperationMode::WireLearning,
        OperationMode::Automatic,
        OperationMode::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationMode::None => "None",
            OperationMode::WireLearning => "Wire Learning",
            OperationMode::Automatic => "Automatic",
            OperationMode::Manual => "Manual",
        }
    }
}

/// Whether a mode may be activated right now
///
/// Never stored authoritatively; recomputed from the sensor state, the
/// learned data and the modes' own activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeAvailability {
    BlockedSensors,
    BlockedWireLearningRequired,
    BlockedSystemError,
    Available,
    Active,
    Stopping,
}

impl ModeAvailability {
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            ModeAvailability::BlockedSensors
                | ModeAvailability::BlockedWireLearningRequired
                | ModeAvailability::BlockedSystemError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModeAvailability::BlockedSensors => "Sensors not validated",
            ModeAvailability::BlockedWireLearningRequired => "Wire learning required",
            ModeAvailability::BlockedSystemError => "System error",
            ModeAvailability::Available => "Available",
            ModeAvailability::Active => "Active",
            ModeAvailability::Stopping => "Stopping",
        }
    }
}

/// Operator-facing view of the guided sensor validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorValidationState {
    NotStarted,
    /// Waiting for the wheel to be turned
    InProgress,
    /// Rotation seen, waiting for the operator to confirm it
    HallPending,
    /// Hall confirmed, waiting for a shake and its confirmation
    AccelPending,
    Complete,
    Failed,
}

impl SensorValidationState {
    pub fn from_snapshot(sensors: &SensorSnapshot) -> Self {
        match sensors.stage {
            ValidationStage::Start => SensorValidationState::NotStarted,
            ValidationStage::WaitRotation if sensors.rotation_detected => {
                SensorValidationState::HallPending
            }
            ValidationStage::WaitRotation => SensorValidationState::InProgress,
            ValidationStage::WaitShake => SensorValidationState::AccelPending,
            ValidationStage::SensorsReady | ValidationStage::SystemReady => {
                SensorValidationState::Complete
            }
            ValidationStage::Failed => SensorValidationState::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorValidationState::NotStarted => "Not started",
            SensorValidationState::InProgress => "In progress",
            SensorValidationState::HallPending => "Hall pending confirmation",
            SensorValidationState::AccelPending => "Accel pending confirmation",
            SensorValidationState::Complete => "Complete",
            SensorValidationState::Failed => "Failed",
        }
    }
}
