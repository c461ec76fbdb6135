//! Tick task for time-based updates
//!
//! Owns the trolley system and drives it every [`TICK_INTERVAL_MS`]:
//! - Pulses queued by the hall task are fed in first
//! - Console commands run before the tick so stops apply on it
//! - Persistence requests are handed to the persistence task
//! - State transitions are logged as they happen

use defmt::*;
use embassy_rp::i2c::{Blocking, I2c};
use embassy_rp::peripherals::I2C0;
use embassy_rp::pwm::PwmOutput;
use embassy_time::{Duration, Instant, Ticker};

use trolley_core::coordinator::{OperationMode, SensorValidationState};
use trolley_core::traits::SensorError;
use trolley_core::TrolleySystem;
use trolley_drivers::esc::PwmEsc;
use trolley_drivers::sensor::Mpu6050;

use crate::channels::{
    COMMAND_CHANNEL, PERSIST_CHANNEL, PULSE_CHANNEL, RESPONSE_CHANNEL, SYSTEM_STATUS,
};

/// Tick interval in milliseconds
pub const TICK_INTERVAL_MS: u64 = 20;

/// How often the status snapshot is published
const STATUS_INTERVAL_MS: u64 = 1000;

/// How often an uninitialized accelerometer is retried
const ACCEL_RETRY_INTERVAL_MS: u64 = 5000;

/// Name reported to the core for commands from the UART console
const CONSOLE_SOURCE: &str = "console";

pub type TrolleyEsc = PwmEsc<PwmOutput<'static>>;
pub type TrolleyAccel = Mpu6050<I2c<'static, I2C0, Blocking>>;
pub type System = TrolleySystem<TrolleyEsc, TrolleyAccel>;

/// Values whose changes get logged
#[derive(PartialEq)]
struct Observed {
    mode: OperationMode,
    validation: SensorValidationState,
    healthy: bool,
    armed: bool,
}

impl Observed {
    fn capture(system: &System) -> Self {
        Self {
            mode: system.coordinator().current_mode(),
            validation: system.coordinator().validation_state(),
            healthy: system.coordinator().is_system_healthy(),
            armed: system.motion().status().armed,
        }
    }
}

/// Tick task - the only owner of the trolley system
#[embassy_executor::task]
pub async fn tick_task(mut system: System) {
    info!("Tick task started");

    let mut ticker = Ticker::every(Duration::from_millis(TICK_INTERVAL_MS));
    let mut observed = Observed::capture(&system);
    let mut last_status_ms = 0u64;
    let mut last_accel_retry_ms = 0u64;

    loop {
        ticker.next().await;
        let now_ms = Instant::now().as_millis();

        while let Ok(event) = PULSE_CHANNEL.try_receive() {
            system.record_pulse(event);
        }

        while let Ok(c) = COMMAND_CHANNEL.try_receive() {
            let response = system.process_command(c, now_ms, CONSOLE_SOURCE);
            if response.success {
                info!("Command '{}': {}", c, response.as_str());
            } else {
                warn!("Command '{}' failed: {}", c, response.as_str());
            }
            if RESPONSE_CHANNEL.try_send(response).is_err() {
                warn!("Response channel full, dropping response");
            }
        }

        system.tick(now_ms);

        if system.accel_fault() == Some(SensorError::NotInitialized)
            && now_ms.saturating_sub(last_accel_retry_ms) >= ACCEL_RETRY_INTERVAL_MS
        {
            last_accel_retry_ms = now_ms;
            match system.accelerometer_mut().init() {
                Ok(()) => info!("Accelerometer initialized"),
                Err(e) => debug!("Accelerometer still unavailable: {:?}", e),
            }
        }

        while let Some(request) = system.take_persist_request() {
            if PERSIST_CHANNEL.try_send(request).is_err() {
                warn!("Persist channel full, dropping {:?}", request);
            }
        }

        let current = Observed::capture(&system);
        if current != observed {
            log_transition(&observed, &current, &system);
            observed = current;
        }

        if now_ms.saturating_sub(last_status_ms) >= STATUS_INTERVAL_MS {
            last_status_ms = now_ms;
            SYSTEM_STATUS.signal(system.status());
        }
    }
}

fn log_transition(before: &Observed, after: &Observed, system: &System) {
    if before.mode != after.mode {
        info!(
            "Mode: {} -> {} ({})",
            before.mode.as_str(),
            after.mode.as_str(),
            system.coordinator().mode_status_message()
        );
    }
    if before.validation != after.validation {
        info!(
            "Sensor validation: {} -> {}",
            before.validation.as_str(),
            after.validation.as_str()
        );
    }
    if before.armed != after.armed {
        info!("ESC {}", if after.armed { "armed" } else { "disarmed" });
    }
    if before.healthy != after.healthy {
        if after.healthy {
            info!("System healthy again");
        } else {
            error!(
                "System unhealthy after {} errors: {}",
                system.coordinator().error_count(),
                system.coordinator().error_message()
            );
        }
    }
}
