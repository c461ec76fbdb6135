//! Learned records that survive a reboot
//!
//! Records are stored as a small fixed header followed by the postcard
//! payload:
//!
//! ```text
//! [magic: u32 LE][version: u8][crc: u32 LE][len: u16 LE][payload ...]
//! ```
//!
//! The CRC covers the payload bytes only.

#[cfg(feature = "serde")]
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::safety::DetectionMethod;

/// Magic number identifying a trolley record
pub const RECORD_MAGIC: u32 = 0x5452_4C59; // "TRLY"

/// Current record format version
pub const RECORD_VERSION: u8 = 1;

/// Header size in bytes
pub const RECORD_HEADER_SIZE: usize = 11;

/// Largest encoded record
pub const MAX_RECORD_SIZE: usize = 128;

/// Outcome of a completed wire learning run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WireLearningResult {
    /// Set once both directions agreed within tolerance
    pub complete: bool,
    /// Mean of the two directions (m)
    pub wire_length_m: f32,
    pub forward_distance_m: f32,
    pub reverse_distance_m: f32,
    pub forward_rotations: u32,
    pub reverse_rotations: u32,
    /// 100 minus the relative difference between directions
    pub accuracy_percent: f32,
    pub recommended_cruise_speed: f32,
    /// How the forward wire end was found
    pub primary_method: DetectionMethod,
    pub total_time_ms: u32,
}

impl WireLearningResult {
    /// Complete and accurate enough for automatic mode
    pub fn is_usable(&self, min_accuracy_percent: f32) -> bool {
        self.complete && self.accuracy_percent >= min_accuracy_percent
    }
}

/// Measured coast-out behaviour at a known speed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoastingCalibration {
    pub calibration_speed: f32,
    pub coasting_distance_m: f32,
    pub coasting_time_ms: u32,
    /// m/s²
    pub deceleration_rate: f32,
    /// Coasting distance plus safety margin; power is cut this far from
    /// a wire end
    pub coast_start_distance_m: f32,
    pub calibration_rotations: u32,
}

impl CoastingCalibration {
    /// Build a calibration from a measured coast
    pub fn from_measurement(
        calibration_speed: f32,
        coasting_distance_m: f32,
        coasting_time_ms: u32,
        rotations: u32,
        safety_margin_m: f32,
    ) -> Self {
        let deceleration_rate = if coasting_time_ms > 0 {
            calibration_speed / (coasting_time_ms as f32 / 1000.0)
        } else if coasting_distance_m > 0.0 {
            (calibration_speed * calibration_speed) / (2.0 * coasting_distance_m)
        } else {
            0.0
        };

        Self {
            calibration_speed,
            coasting_distance_m,
            coasting_time_ms,
            deceleration_rate,
            coast_start_distance_m: coasting_distance_m + safety_margin_m,
            calibration_rotations: rotations,
        }
    }
}

/// Record codec errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// Payload did not fit the output buffer
    Encode,
    /// Payload bytes could not be decoded
    Decode,
    /// Input shorter than the header or the declared payload
    Truncated,
    BadMagic,
    BadVersion,
    CrcMismatch,
}

/// Encode a record into `buffer`, returning the encoded length
#[cfg(feature = "serde")]
pub fn encode_record<T: Serialize>(payload: &T, buffer: &mut [u8]) -> Result<usize, RecordError> {
    if buffer.len() <= RECORD_HEADER_SIZE {
        return Err(RecordError::Encode);
    }

    let (header, body) = buffer.split_at_mut(RECORD_HEADER_SIZE);
    let len = postcard::to_slice(payload, body)
        .map_err(|_| RecordError::Encode)?
        .len();
    let len_u16 = u16::try_from(len).map_err(|_| RecordError::Encode)?;
    let crc = crc32(&body[..len]);

    header[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    header[4] = RECORD_VERSION;
    header[5..9].copy_from_slice(&crc.to_le_bytes());
    header[9..11].copy_from_slice(&len_u16.to_le_bytes());

    Ok(RECORD_HEADER_SIZE + len)
}

/// Decode and verify a record
#[cfg(feature = "serde")]
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RecordError> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return Err(RecordError::Truncated);
    }

    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != RECORD_MAGIC {
        return Err(RecordError::BadMagic);
    }
    if bytes[4] != RECORD_VERSION {
        return Err(RecordError::BadVersion);
    }

    let crc = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    let len = u16::from_le_bytes([bytes[9], bytes[10]]) as usize;
    let body = bytes
        .get(RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + len)
        .ok_or(RecordError::Truncated)?;

    if crc32(body) != crc {
        return Err(RecordError::CrcMismatch);
    }

    postcard::from_bytes(body).map_err(|_| RecordError::Decode)
}

/// CRC-32 (IEEE 802.3, reflected)
pub fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;
    let mut crc: u32 = 0xFFFFFFFF;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}
