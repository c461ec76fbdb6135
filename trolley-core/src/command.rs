//! Single-character command vocabulary
//!
//! Every transport (serial console, web page, test harness) sends the same
//! command letters and gets back a [`CommandResponse`]. Parsing lives here;
//! [`TrolleySystem::process_command`](crate::TrolleySystem::process_command)
//! routes a parsed command to the coordinator or the active mode.

use core::fmt::{self, Write};

use heapless::String;

use crate::modes::manual::ManualCommandType;
use crate::modes::Truncating;

/// Longest response message
pub const RESPONSE_LEN: usize = 192;

/// Response text
pub type ResponseText = String<RESPONSE_LEN>;

/// Operator commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Activate wire learning
    StartWireLearning,
    /// Activate automatic cycling
    StartAutomatic,
    /// Activate manual control
    StartManual,
    /// Start the guided sensor validation
    StartValidation,
    /// Operator saw the wheel turn
    ConfirmHall,
    /// Operator saw the shake register
    ConfirmAccelerometer,
    /// Forwarded to manual mode (`A D F B S + -`)
    Motion(ManualCommandType),
    /// Finish the current operation, then stop
    GracefulStop,
    /// Stop the current mode now
    Interrupt,
    EmergencyStop,
    /// Forget learned data and sensor validation
    Reset,
    /// One-line status report
    Status,
}

impl Command {
    /// Parse a command letter (case-insensitive)
    ///
    /// `E` is the system emergency stop; manual mode's own `E` is reached
    /// through it.
    pub fn from_char(c: char) -> Option<Self> {
        let command = match c.to_ascii_uppercase() {
            'W' => Command::StartWireLearning,
            'U' => Command::StartAutomatic,
            'M' => Command::StartManual,
            'V' => Command::StartValidation,
            'H' => Command::ConfirmHall,
            'C' => Command::ConfirmAccelerometer,
            'Q' => Command::GracefulStop,
            'I' => Command::Interrupt,
            'E' => Command::EmergencyStop,
            'R' => Command::Reset,
            'T' => Command::Status,
            upper @ ('A' | 'D' | 'F' | 'B' | 'S' | '+' | '-') => {
                Command::Motion(ManualCommandType::from_char(upper)?)
            }
            _ => return None,
        };
        Some(command)
    }

    /// The canonical (upper case) letter
    pub fn to_char(self) -> char {
        match self {
            Command::StartWireLearning => 'W',
            Command::StartAutomatic => 'U',
            Command::StartManual => 'M',
            Command::StartValidation => 'V',
            Command::ConfirmHall => 'H',
            Command::ConfirmAccelerometer => 'C',
            Command::GracefulStop => 'Q',
            Command::Interrupt => 'I',
            Command::EmergencyStop => 'E',
            Command::Reset => 'R',
            Command::Status => 'T',
            Command::Motion(kind) => match kind {
                ManualCommandType::ArmEsc => 'A',
                ManualCommandType::DisarmEsc => 'D',
                ManualCommandType::Forward => 'F',
                ManualCommandType::Backward => 'B',
                ManualCommandType::IncreaseSpeed => '+',
                ManualCommandType::DecreaseSpeed => '-',
                ManualCommandType::EmergencyStop => 'E',
                ManualCommandType::Stop | ManualCommandType::SetSpeed => 'S',
            },
        }
    }

    /// Only meaningful while manual mode is active
    pub fn is_manual(self) -> bool {
        matches!(self, Command::Motion(_))
    }

    /// Stops or reports; never starts motion
    pub fn is_safe_anytime(self) -> bool {
        matches!(
            self,
            Command::GracefulStop
                | Command::Interrupt
                | Command::EmergencyStop
                | Command::Status
        )
    }
}

/// Result of one command, for any transport to relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub success: bool,
    pub message: ResponseText,
}

impl CommandResponse {
    pub fn ok(text: &str) -> Self {
        Self::new(true, format_args!("{}", text))
    }

    pub fn failed(text: &str) -> Self {
        Self::new(false, format_args!("{}", text))
    }

    /// Build a response from format arguments, truncated to fit
    pub fn new(success: bool, args: fmt::Arguments<'_>) -> Self {
        let mut message = ResponseText::new();
        // Truncating never reports an error
        let _ = Truncating(&mut message).write_fmt(args);
        Self { success, message }
    }

    /// Response for a letter outside the vocabulary
    pub fn unknown(c: char) -> Self {
        Self::new(
            false,
            format_args!(
                "Unknown command '{}' - Valid commands: V(validation), W(wire learning), \
                 U(automatic), M(manual), A(arm), F(forward), B(backward), S(stop), E(emergency)",
                c
            ),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.message
    }
}
