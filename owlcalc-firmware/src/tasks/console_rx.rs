//! Console UART receive task
//!
//! The console is the caller side of the compute protocol: it collects a
//! line of input, submits it to the compute task and writes the answer
//! back to the terminal.

use core::str;

use defmt::*;
use embassy_rp::uart::BufferedUartRx;
use embedded_io_async::Read;
use heapless::Vec;

use owlcalc_core::config::INPUT_LEN;
use owlcalc_core::{CalcConfig, CallError};

use crate::channels::{CALC, TERMINAL};

/// Buffer size for UART receive
const RX_BUF_SIZE: usize = 64;

/// Input prompt
const PROMPT: &[u8] = b">: ";

/// Line buffer; one byte over the request capacity so overlong input
/// reaches the channel and is rejected there
type LineBuffer = Vec<u8, { INPUT_LEN + 1 }>;

/// Console RX task - reads expressions and prints results
#[embassy_executor::task]
pub async fn console_rx_task(mut rx: BufferedUartRx, config: CalcConfig) {
    info!("Console RX task started");

    let mut line = LineBuffer::new();
    let mut buf = [0u8; RX_BUF_SIZE];

    TERMINAL.write_all(PROMPT).await;

    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("UART read error: {:?}", e);
                continue;
            }
        };

        trace!("RX: {} bytes", n);

        for &byte in &buf[..n] {
            match byte {
                b'\r' | b'\n' => {
                    TERMINAL.write_all(b"\n").await;
                    if !line.is_empty() {
                        submit_line(&line, &config).await;
                        line.clear();
                    }
                    TERMINAL.write_all(PROMPT).await;
                }
                // Backspace / DEL
                0x08 | 0x7f => {
                    if line.pop().is_some() {
                        TERMINAL.write_all(b"\x08 \x08").await;
                    }
                }
                _ => {
                    // Input beyond the buffer is dropped, not echoed
                    if line.push(byte).is_ok() {
                        TERMINAL.write_all(&[byte]).await;
                    }
                }
            }
        }
    }
}

/// Submit one line and print the outcome
async fn submit_line(line: &[u8], config: &CalcConfig) {
    let Ok(expression) = str::from_utf8(line) else {
        warn!("Discarding non UTF-8 input line");
        TERMINAL.write_all(b"<: error: invalid input\n").await;
        return;
    };

    debug!("Submitting {} byte expression", expression.len());

    match CALC
        .call(expression, config.lock_timeout(), config.result_timeout())
        .await
    {
        Ok(response) => {
            debug!("Answered in {} ms", response.elapsed_ms());
            TERMINAL.write_all(response.as_str().as_bytes()).await;
        }
        Err(CallError::LockTimeout) => {
            TERMINAL.write_all(b"<: busy\n").await;
        }
        Err(CallError::ResultTimeout) => {
            TERMINAL.write_all(b"<: timeout\n").await;
        }
        Err(CallError::LengthExceeded(e)) => {
            warn!("Expression too long: {} > {} bytes", e.len, e.capacity);
            TERMINAL.write_all(b"<: error: expression too long\n").await;
        }
    }
}
