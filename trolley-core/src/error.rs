//! Error taxonomy shared by every component
//!
//! Operations return `Result<T, Error>`. The `kind` drives control flow
//! (the coordinator counts them, the command layer reports them) and the
//! `reason` is a short static string shown to the operator.

use core::fmt;

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Out-of-range speed or parameter
    InvalidArgument,
    /// Operation attempted in the wrong mode or state
    InvalidState,
    /// Sensors not validated or hardware not initialized
    NotReady,
    /// A required earlier step has not completed (e.g. wire learning)
    PrerequisiteMissing,
    /// A stage exceeded its time budget
    Timeout,
    /// Impact, pulse silence during motion, or an excessive speed change
    SafetyViolation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "Invalid argument",
            ErrorKind::InvalidState => "Invalid state",
            ErrorKind::NotReady => "Not ready",
            ErrorKind::PrerequisiteMissing => "Prerequisite missing",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::SafetyViolation => "Safety violation",
        }
    }
}

/// An error with its category and a short operator-facing reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error {
    pub kind: ErrorKind,
    pub reason: &'static str,
}

impl Error {
    pub const fn new(kind: ErrorKind, reason: &'static str) -> Self {
        Self { kind, reason }
    }

    pub const fn invalid_argument(reason: &'static str) -> Self {
        Self::new(ErrorKind::InvalidArgument, reason)
    }

    pub const fn invalid_state(reason: &'static str) -> Self {
        Self::new(ErrorKind::InvalidState, reason)
    }

    pub const fn not_ready(reason: &'static str) -> Self {
        Self::new(ErrorKind::NotReady, reason)
    }

    pub const fn prerequisite_missing(reason: &'static str) -> Self {
        Self::new(ErrorKind::PrerequisiteMissing, reason)
    }

    pub const fn timeout(reason: &'static str) -> Self {
        Self::new(ErrorKind::Timeout, reason)
    }

    pub const fn safety_violation(reason: &'static str) -> Self {
        Self::new(ErrorKind::SafetyViolation, reason)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.reason)
    }
}

/// Errors returned by the motion hardware interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HardwareError {
    /// Speed or duty outside the permitted range
    InvalidRange,
    /// Motion requested before the ESC finished arming
    NotArmed,
    /// Hardware used before initialization
    NotInitialized,
}

impl From<HardwareError> for Error {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::InvalidRange => Error::invalid_argument("Speed out of range"),
            HardwareError::NotArmed => Error::invalid_state("ESC not armed"),
            HardwareError::NotInitialized => Error::not_ready("Hardware not initialized"),
        }
    }
}
