//! ESC output trait
//!
//! The ESC takes a servo-style pulse. Duties are expressed in 14-bit
//! counts of the 50 Hz period; the implementation scales them to its
//! timer resolution.

/// Counts per PWM period that duty values are expressed in
pub const ESC_DUTY_RESOLUTION: u16 = 1 << 14;

/// Errors from the ESC output stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EscError {
    /// The PWM peripheral rejected the write
    Output,
    /// Duty outside the period
    OutOfRange,
}

/// Raw ESC pulse output
pub trait EscOutput {
    /// Write a duty in [`ESC_DUTY_RESOLUTION`] counts
    fn set_duty(&mut self, duty: u16) -> Result<(), EscError>;
}
