//! Inter-task communication channels
//!
//! The tick task is the only owner of the trolley system; every other task
//! talks to it through these statics.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use portable_atomic::AtomicU32;

use trolley_core::command::CommandResponse;
use trolley_core::motion::PulseEvent;
use trolley_core::status::SystemStatus;
use trolley_core::system::PersistRequest;

/// Pulses buffered between two ticks (about 20 at top speed)
const PULSE_CHANNEL_SIZE: usize = 32;

/// Channel capacity for console command letters
const COMMAND_CHANNEL_SIZE: usize = 8;

/// Channel capacity for command responses
const RESPONSE_CHANNEL_SIZE: usize = 4;

/// Channel capacity for persistence work
const PERSIST_CHANNEL_SIZE: usize = 4;

/// Hall-sensor pulses, timestamped at the edge
pub static PULSE_CHANNEL: Channel<CriticalSectionRawMutex, PulseEvent, PULSE_CHANNEL_SIZE> =
    Channel::new();

/// Pulses lost because the tick task fell behind
pub static DROPPED_PULSES: AtomicU32 = AtomicU32::new(0);

/// Command letters from the console
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, char, COMMAND_CHANNEL_SIZE> =
    Channel::new();

/// Responses to console commands, in command order
pub static RESPONSE_CHANNEL: Channel<
    CriticalSectionRawMutex,
    CommandResponse,
    RESPONSE_CHANNEL_SIZE,
> = Channel::new();

/// Records to write or erase
pub static PERSIST_CHANNEL: Channel<CriticalSectionRawMutex, PersistRequest, PERSIST_CHANNEL_SIZE> =
    Channel::new();

/// Latest system snapshot (updated by the tick task once per second)
pub static SYSTEM_STATUS: Signal<CriticalSectionRawMutex, SystemStatus> = Signal::new();
