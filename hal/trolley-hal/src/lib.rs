//! Trolley Hardware Abstraction Layer
//!
//! Board-agnostic traits that chip-specific HALs implement so the
//! firmware can persist learned data without knowing the flash layout.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application (trolley-firmware)         │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  trolley-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!             ┌───────────────┐
//!             │ trolley-hal-  │
//!             │    rp2040     │
//!             └───────────────┘
//! ```
//!
//! Motor and sensor seams live in `trolley-core::traits`; they are
//! implemented against `embedded-hal` in `trolley-drivers`.

#![no_std]
#![deny(unsafe_code)]

pub mod flash;

pub use flash::{FlashError, FlashStorage, StorageKey};
