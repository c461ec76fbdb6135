//! Learned-record persistence
//!
//! Restores the wire learning result and coasting calibration at boot and
//! writes them back whenever the system learns a new one. Each record is
//! stored under its own key in the envelope produced by
//! [`encode_record`].

use defmt::*;
use serde::de::DeserializeOwned;
use serde::Serialize;

use trolley_core::config::{
    decode_record, encode_record, CoastingCalibration, RecordError, WireLearningResult,
    MAX_RECORD_SIZE,
};
use trolley_core::system::PersistRequest;
use trolley_hal_rp2040::flash::{FlashError, Rp2040FlashStorage, StorageKey};
use trolley_hal_rp2040::FlashStorageTrait;

use crate::channels::PERSIST_CHANNEL;

pub type Storage = Rp2040FlashStorage<'static>;

/// Persistence errors
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistenceError {
    /// Flash operation failed
    Flash(FlashError),
    /// Record envelope or payload rejected
    Record(RecordError),
}

impl From<FlashError> for PersistenceError {
    fn from(e: FlashError) -> Self {
        PersistenceError::Flash(e)
    }
}

impl From<RecordError> for PersistenceError {
    fn from(e: RecordError) -> Self {
        PersistenceError::Record(e)
    }
}

/// Records found in flash at boot
pub struct StoredRecords {
    pub wire: Option<WireLearningResult>,
    pub coasting: Option<CoastingCalibration>,
}

/// Load both records, discarding any that are missing or invalid
pub async fn load_records(storage: &mut Storage) -> StoredRecords {
    let wire = restored(
        "wire learning result",
        load_record(storage, StorageKey::WireLearning).await,
    );
    if let Some(result) = &wire {
        info!(
            "Wire length {} m ({}% accuracy, complete={})",
            result.wire_length_m, result.accuracy_percent, result.complete
        );
    }

    let coasting = restored(
        "coasting calibration",
        load_record(storage, StorageKey::CoastingCalibration).await,
    );
    if let Some(calibration) = &coasting {
        info!(
            "Coasting {} m from {} m/s",
            calibration.coasting_distance_m, calibration.calibration_speed
        );
    }

    StoredRecords { wire, coasting }
}

fn restored<T>(name: &str, result: Result<T, PersistenceError>) -> Option<T> {
    match result {
        Ok(record) => {
            info!("Restored {} from flash", name);
            Some(record)
        }
        Err(PersistenceError::Flash(FlashError::NotFound)) => {
            debug!("No {} in flash", name);
            None
        }
        Err(e) => {
            warn!("Discarding stored {}: {:?}", name, e);
            None
        }
    }
}

async fn load_record<T: DeserializeOwned>(
    storage: &mut Storage,
    key: StorageKey,
) -> Result<T, PersistenceError> {
    let mut buffer = [0u8; MAX_RECORD_SIZE];
    let len = storage.read(key, &mut buffer).await?;
    debug!("Read {} bytes for {:?}", len, key);
    Ok(decode_record(&buffer[..len])?)
}

async fn store_record<T: Serialize>(
    storage: &mut Storage,
    key: StorageKey,
    record: &T,
) -> Result<(), PersistenceError> {
    let mut buffer = [0u8; MAX_RECORD_SIZE];
    let len = encode_record(record, &mut buffer)?;
    debug!("Saving {} bytes for {:?}", len, key);
    storage.write(key, &buffer[..len]).await?;
    Ok(())
}

async fn apply(storage: &mut Storage, request: PersistRequest) -> Result<(), PersistenceError> {
    match request {
        PersistRequest::WireLearning(result) => {
            store_record(storage, StorageKey::WireLearning, &result).await
        }
        PersistRequest::Coasting(calibration) => {
            store_record(storage, StorageKey::CoastingCalibration, &calibration).await
        }
        PersistRequest::EraseAll => Ok(storage.erase_all().await?),
    }
}

/// Persistence task - applies requests from the tick task in order
#[embassy_executor::task]
pub async fn persistence_task(mut storage: Storage) {
    info!("Persistence task started");

    loop {
        let request = PERSIST_CHANNEL.receive().await;
        match apply(&mut storage, request).await {
            Ok(()) => match request {
                PersistRequest::WireLearning(_) => info!("Saved wire learning result to flash"),
                PersistRequest::Coasting(_) => info!("Saved coasting calibration to flash"),
                PersistRequest::EraseAll => info!("Erased learned records"),
            },
            Err(e) => error!("Failed to persist {:?}: {:?}", request, e),
        }
    }
}
