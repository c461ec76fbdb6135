//! Trolley - Wire Trolley Controller Firmware
//!
//! Main firmware binary for an RP2040 driving a single-wheel trolley on a
//! fixed wire. The board-agnostic logic lives in `trolley-core`; this
//! crate wires it to the pins and spawns the tasks around it.
//!
//! Pin map (Raspberry Pi Pico):
//! - GPIO 18: ESC signal (PWM slice 1 A, 50 Hz)
//! - GPIO 19: hall sensor (pull-up, one falling edge per revolution)
//! - GPIO 4/5: MPU-6050 on I2C0 (SDA/SCL, 400 kHz)
//! - GPIO 0/1: console on UART0 (TX/RX, 115200 baud)

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Pull};
use embassy_rp::i2c::{Config as I2cConfig, I2c};
use embassy_rp::peripherals::UART0;
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use embassy_time::Instant;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use trolley_core::config::TrolleyConfig;
use trolley_core::TrolleySystem;
use trolley_drivers::esc::PwmEsc;
use trolley_drivers::sensor::{Mpu6050, Mpu6050Config};
use trolley_hal_rp2040::flash::Rp2040FlashStorage;

mod channels;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

/// 125 MHz / 40 = 3.125 MHz PWM clock
const ESC_PWM_DIVIDER: u8 = 40;

/// 62 500 counts per 20 ms period
const ESC_PWM_TOP: u16 = 62_499;

/// I2C bus speed for the accelerometer
const I2C_FREQUENCY_HZ: u32 = 400_000;

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Trolley firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Learned records must be back before the first availability check
    let mut storage = Rp2040FlashStorage::new(p.FLASH, p.DMA_CH0);
    let records = tasks::persistence::load_records(&mut storage).await;

    // ESC signal: neutral is written by the system init below
    let mut pwm_config = PwmConfig::default();
    pwm_config.divider = ESC_PWM_DIVIDER.into();
    pwm_config.top = ESC_PWM_TOP;
    let pwm = Pwm::new_output_a(p.PWM_SLICE1, p.PIN_18, pwm_config);
    let (esc_output, _) = pwm.split();
    let esc = PwmEsc::new(unwrap!(esc_output));
    info!("ESC PWM initialized");

    let mut i2c_config = I2cConfig::default();
    i2c_config.frequency = I2C_FREQUENCY_HZ;
    let i2c = I2c::new_blocking(p.I2C0, p.PIN_5, p.PIN_4, i2c_config);
    let mut accel = Mpu6050::new(i2c, Mpu6050Config::default());
    match accel.init() {
        Ok(()) => info!("MPU-6050 initialized"),
        // The tick task keeps retrying; sensor validation stays blocked until then
        Err(e) => warn!("MPU-6050 init failed: {:?}", e),
    }

    let hall = Input::new(p.PIN_19, Pull::Up);

    let mut system = unwrap!(TrolleySystem::new(TrolleyConfig::default(), esc, accel));
    system.restore(records.wire, records.coasting);
    unwrap!(system.init(Instant::now().as_millis()));
    info!(
        "Trolley system ready, mode={}, validation={}",
        system.coordinator().current_mode().as_str(),
        system.coordinator().validation_state().as_str()
    );

    // Console on UART0 (115200 baud default)
    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 64]);
    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, UartConfig::default());
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (tx, rx) = uart.split();
    info!("UART initialized for console");

    // Spawn tasks
    spawner.spawn(tasks::persistence_task(storage)).unwrap();
    spawner.spawn(tasks::hall_task(hall)).unwrap();
    spawner.spawn(tasks::tick_task(system)).unwrap();
    spawner.spawn(tasks::console_task(rx, tx)).unwrap();
    spawner.spawn(tasks::monitor_task()).unwrap();

    info!("All tasks spawned, firmware running");
}
