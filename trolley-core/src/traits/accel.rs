//! Accelerometer trait

use libm::{fabsf, sqrtf};

/// Errors that can occur reading a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Bus transaction failed
    Bus,
    /// Device did not identify itself
    NotFound,
    /// Read before the device was configured
    NotInitialized,
}

/// One acceleration sample in g
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccelSample {
    pub x_g: f32,
    pub y_g: f32,
    pub z_g: f32,
}

impl AccelSample {
    pub const fn new(x_g: f32, y_g: f32, z_g: f32) -> Self {
        Self { x_g, y_g, z_g }
    }

    /// Trolley at rest, gravity on Z
    pub const fn at_rest() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    /// Vector magnitude including gravity
    pub fn magnitude_g(&self) -> f32 {
        sqrtf(self.x_g * self.x_g + self.y_g * self.y_g + self.z_g * self.z_g)
    }

    /// Deviation of the magnitude from 1 g
    ///
    /// All shake and impact thresholds compare against this value.
    pub fn dynamic_g(&self) -> f32 {
        fabsf(self.magnitude_g() - 1.0)
    }
}

/// Three-axis accelerometer
pub trait Accelerometer {
    /// Read the latest sample in g
    fn read(&mut self) -> Result<AccelSample, SensorError>;
}
