//! RP2040-specific HAL for the trolley firmware
//!
//! Implements the shared `trolley-hal` traits on top of `embassy-rp`.
//! PWM, GPIO and I2C go straight through `embassy-rp`'s `embedded-hal`
//! implementations, so only persistence needs a chip-specific driver.

#![no_std]

pub mod flash;

pub use trolley_hal::{FlashStorage as FlashStorageTrait, StorageKey};
