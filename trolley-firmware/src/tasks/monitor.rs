//! Heartbeat monitor task
//!
//! Logs a one-line summary of the latest system snapshot every
//! [`HEARTBEAT_INTERVAL_SECS`], and warns when hall pulses were lost.

use defmt::*;
use embassy_time::{Duration, Ticker};
use portable_atomic::Ordering;

use crate::channels::{DROPPED_PULSES, SYSTEM_STATUS};

/// Heartbeat period
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Monitor task
#[embassy_executor::task]
pub async fn monitor_task() {
    info!("Monitor task started");

    let mut ticker = Ticker::every(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    let mut reported_drops = 0u32;

    loop {
        ticker.next().await;

        match SYSTEM_STATUS.try_take() {
            Some(status) => {
                info!(
                    "Heartbeat: mode={}, sensors={}, ESC={}, speed={} m/s, position={} m, errors={}",
                    status.mode.as_str(),
                    if status.sensors.ready { "validated" } else { "not validated" },
                    status.esc_state(),
                    status.motion.measured_speed,
                    status.motion.position_m,
                    status.error_count
                );
                if !status.healthy {
                    warn!("System unhealthy: {}", status.error.as_str());
                }
            }
            None => warn!("Heartbeat: no status from tick task"),
        }

        let dropped = DROPPED_PULSES.load(Ordering::Relaxed);
        if dropped != reported_drops {
            warn!("{} hall pulses dropped since boot", dropped);
            reported_drops = dropped;
        }
    }
}
