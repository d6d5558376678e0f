//! Output poller task
//!
//! Drains text the engine pushes during a computation and copies it to
//! the console, acknowledging each message so the engine may push again.

use defmt::*;
use embassy_time::Duration;

use owlcalc_core::OutputMessage;

use crate::channels::{OUTPUT, TERMINAL};

/// ANSI sequence that clears the terminal and homes the cursor
const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

/// Output poller task - forwards engine pushes to the console
#[embassy_executor::task]
pub async fn output_poll_task(poll_interval: Duration) {
    info!("Output poller started");

    loop {
        let Some(message) = OUTPUT.poll(poll_interval).await else {
            continue;
        };

        match &message {
            OutputMessage::Text(text) => {
                trace!("Engine output: {} bytes", text.len());
                TERMINAL.write_all(text.as_bytes()).await;
            }
            OutputMessage::Clear => {
                debug!("Engine cleared the screen");
                TERMINAL.write_all(CLEAR_SCREEN).await;
            }
        }

        OUTPUT.done();
    }
}
