//! Learned-record storage seam
//!
//! Persistent key-value storage for the records the trolley learns at
//! runtime (wire length, coasting calibration).

/// Storage keys for persisted records
///
/// Each key holds one encoded record. The storage implementation handles
/// wear leveling; record integrity (magic, version, CRC) is checked by
/// the record codec in `trolley-core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StorageKey {
    /// Wire learning result (wire length, accuracy, cruise speed)
    WireLearning = 0,
    /// Coasting calibration used by automatic mode
    CoastingCalibration = 1,
}

impl StorageKey {
    /// All keys, in storage order
    pub const ALL: [StorageKey; 2] = [StorageKey::WireLearning, StorageKey::CoastingCalibration];

    /// Byte written as the map key
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Key for a stored map byte
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_u8() == value)
    }
}

/// Storage failures, as seen by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// The flash peripheral reported an error
    Flash,
    /// Map bookkeeping failed
    Storage,
    /// Nothing stored under the key
    NotFound,
    /// Item larger than the caller's buffer or the map's item limit
    BufferTooSmall,
    /// Partition contents are not a valid map
    Corrupted,
    /// No free page left, even after garbage collection
    Full,
}

/// Persistent store for learned records
///
/// Provides wear-leveled key-value storage for learned records.
pub trait FlashStorage {
    /// Copy the record stored under `key` into `buffer`
    ///
    /// Returns the number of bytes read.
    fn read(
        &mut self,
        key: StorageKey,
        buffer: &mut [u8],
    ) -> impl core::future::Future<Output = Result<usize, FlashError>>;

    /// Write a value by key, replacing any previous value
    fn write(
        &mut self,
        key: StorageKey,
        data: &[u8],
    ) -> impl core::future::Future<Output = Result<(), FlashError>>;

    /// Whether a record is stored under `key`
    fn exists(&mut self, key: StorageKey) -> impl core::future::Future<Output = bool>;

    /// Erase all stored records
    fn erase_all(&mut self) -> impl core::future::Future<Output = Result<(), FlashError>>;
}

#[cfg(feature = "sequential-storage")]
impl sequential_storage::map::Key for StorageKey {
    fn serialize_into(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, sequential_storage::map::SerializationError> {
        let slot = buffer
            .first_mut()
            .ok_or(sequential_storage::map::SerializationError::BufferTooSmall)?;
        *slot = self.as_u8();
        Ok(1)
    }

    fn deserialize_from(
        buffer: &[u8],
    ) -> Result<(Self, usize), sequential_storage::map::SerializationError> {
        let byte = buffer
            .first()
            .ok_or(sequential_storage::map::SerializationError::BufferTooSmall)?;
        let key = StorageKey::from_u8(*byte)
            .ok_or(sequential_storage::map::SerializationError::InvalidFormat)?;
        Ok((key, 1))
    }
}
