//! Record partition on the RP2040's QSPI flash
//!
//! The last 64KB of the Pico's flash are reserved in `memory.x` and hold
//! a sequential-storage map with one item per [`StorageKey`]. Items are
//! small (one encoded record each), so every access uses a stack buffer
//! of [`MAX_ITEM_SIZE`].

use core::ops::Range;

use embassy_rp::dma::Channel;
use embassy_rp::flash::{Async, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

pub use trolley_hal::flash::{FlashError, StorageKey};

/// Total flash on the Pico
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Reserved for learned records
pub const RECORD_PARTITION_SIZE: usize = 16 * ERASE_SIZE;

pub const RECORD_PARTITION_START: usize = FLASH_SIZE - RECORD_PARTITION_SIZE;

/// Largest map item (key byte plus encoded record)
pub const MAX_ITEM_SIZE: usize = 256;

/// Offsets of the record partition, relative to the start of flash
pub const RECORD_RANGE: Range<u32> = (RECORD_PARTITION_START as u32)..(FLASH_SIZE as u32);

type RecordFlash<'d> = Flash<'d, FLASH, Async, FLASH_SIZE>;

/// Learned-record storage on the RP2040
pub struct Rp2040FlashStorage<'d> {
    flash: RecordFlash<'d>,
}

impl<'d> Rp2040FlashStorage<'d> {
    pub fn new(flash: Peri<'d, FLASH>, dma: Peri<'d, impl Channel>) -> Self {
        Self {
            flash: Flash::new(flash, dma),
        }
    }

    /// Copy the item stored under `key` into `out`
    ///
    /// `Ok(None)` when the key has never been written.
    async fn fetch(&mut self, key: StorageKey, out: &mut [u8]) -> Result<Option<usize>, FlashError> {
        let mut scratch = [0u8; MAX_ITEM_SIZE];
        let item = map::fetch_item::<StorageKey, &[u8], _>(
            &mut self.flash,
            RECORD_RANGE,
            &mut NoCache::new(),
            &mut scratch,
            &key,
        )
        .await
        .map_err(storage_error)?;

        let Some(bytes) = item else {
            return Ok(None);
        };
        let target = out
            .get_mut(..bytes.len())
            .ok_or(FlashError::BufferTooSmall)?;
        target.copy_from_slice(bytes);
        Ok(Some(bytes.len()))
    }
}

fn storage_error(e: sequential_storage::Error<embassy_rp::flash::Error>) -> FlashError {
    match e {
        sequential_storage::Error::Storage { .. } => FlashError::Flash,
        sequential_storage::Error::FullStorage => FlashError::Full,
        sequential_storage::Error::Corrupted { .. } => FlashError::Corrupted,
        sequential_storage::Error::BufferTooSmall(_) | sequential_storage::Error::ItemTooBig => {
            FlashError::BufferTooSmall
        }
        _ => FlashError::Storage,
    }
}

impl<'d> trolley_hal::FlashStorage for Rp2040FlashStorage<'d> {
    async fn read(&mut self, key: StorageKey, buffer: &mut [u8]) -> Result<usize, FlashError> {
        self.fetch(key, buffer).await?.ok_or(FlashError::NotFound)
    }

    async fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), FlashError> {
        if data.len() >= MAX_ITEM_SIZE {
            return Err(FlashError::BufferTooSmall);
        }
        let mut scratch = [0u8; MAX_ITEM_SIZE];
        map::store_item(
            &mut self.flash,
            RECORD_RANGE,
            &mut NoCache::new(),
            &mut scratch,
            &key,
            &data,
        )
        .await
        .map_err(storage_error)
    }

    async fn exists(&mut self, key: StorageKey) -> bool {
        let mut discard = [0u8; MAX_ITEM_SIZE];
        matches!(self.fetch(key, &mut discard).await, Ok(Some(_)))
    }

    async fn erase_all(&mut self) -> Result<(), FlashError> {
        NorFlash::erase(&mut self.flash, RECORD_RANGE.start, RECORD_RANGE.end)
            .await
            .map_err(|_| FlashError::Flash)
    }
}
