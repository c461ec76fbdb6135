//! Hall-sensor capture task
//!
//! Timestamps every falling edge of the wheel sensor and queues it for
//! the tick task, which is the single consumer of pulses.

use defmt::*;
use embassy_rp::gpio::Input;
use embassy_time::Instant;
use portable_atomic::Ordering;

use trolley_core::motion::PulseEvent;

use crate::channels::{DROPPED_PULSES, PULSE_CHANNEL};

/// Hall task - one pulse per wheel revolution
#[embassy_executor::task]
pub async fn hall_task(mut sensor: Input<'static>) {
    info!("Hall task started");

    loop {
        sensor.wait_for_falling_edge().await;

        let event = PulseEvent {
            timestamp_ms: Instant::now().as_millis(),
        };

        if PULSE_CHANNEL.try_send(event).is_err() {
            let dropped = DROPPED_PULSES.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("Pulse channel full, {} pulses dropped", dropped);
        }
    }
}
