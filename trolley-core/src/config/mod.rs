//! Configuration and persisted records
//!
//! [`TrolleyConfig`] centralises every threshold, speed and timeout the
//! components use. [`records`] holds the two learned records that survive
//! a reboot and the envelope they are stored in.

pub mod records;
pub mod types;

#[cfg(feature = "serde")]
pub use records::{decode_record, encode_record};
pub use records::{
    CoastingCalibration, RecordError, WireLearningResult, MAX_RECORD_SIZE, RECORD_MAGIC,
    RECORD_VERSION,
};
pub use types::{
    AutomaticConfig, CoordinatorConfig, HardwareConfig, LearningConfig, ManualConfig,
    SensorConfig, TrolleyConfig,
};
