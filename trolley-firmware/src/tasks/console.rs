//! Serial console task
//!
//! Reads single-character commands from UART0 and writes each response
//! back on its own line. Line endings and spaces are ignored, so commands
//! can be typed one per line or all at once.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use embedded_io_async::{Read, Write};

use trolley_core::command::CommandResponse;

use crate::channels::{COMMAND_CHANNEL, RESPONSE_CHANNEL};

/// Buffer size for UART receive
const RX_BUF_SIZE: usize = 32;

const BANNER: &str = "Trolley console ready - V validates sensors, T prints status\r\n";

/// Console task - forwards command letters and relays responses
#[embassy_executor::task]
pub async fn console_task(mut rx: BufferedUartRx, mut tx: BufferedUartTx) {
    info!("Console task started");

    write_text(&mut tx, BANNER).await;

    let mut buf = [0u8; RX_BUF_SIZE];

    loop {
        match select(rx.read(&mut buf), RESPONSE_CHANNEL.receive()).await {
            Either::First(Ok(n)) => {
                for &byte in &buf[..n] {
                    forward(byte).await;
                }
            }
            Either::First(Err(e)) => {
                warn!("UART read error: {:?}", e);
            }
            Either::Second(response) => {
                write_response(&mut tx, &response).await;
            }
        }
    }
}

/// Queue one received byte as a command letter
async fn forward(byte: u8) {
    if !byte.is_ascii() || byte.is_ascii_whitespace() || byte.is_ascii_control() {
        return;
    }
    let c = byte as char;

    if c.eq_ignore_ascii_case(&'e') {
        // Never drop an emergency stop
        COMMAND_CHANNEL.send(c).await;
    } else if COMMAND_CHANNEL.try_send(c).is_err() {
        warn!("Command channel full, dropping '{}'", c);
    }
}

async fn write_response(tx: &mut BufferedUartTx, response: &CommandResponse) {
    let tag = if response.success { "[OK] " } else { "[FAIL] " };
    write_text(tx, tag).await;
    write_text(tx, response.as_str()).await;
    write_text(tx, "\r\n").await;
}

async fn write_text(tx: &mut BufferedUartTx, text: &str) {
    if let Err(e) = tx.write_all(text.as_bytes()).await {
        warn!("UART write error: {:?}", e);
    }
}
