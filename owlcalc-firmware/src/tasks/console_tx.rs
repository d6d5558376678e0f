//! Console UART transmit task
//!
//! Writes everything queued on the terminal pipe to the UART, expanding
//! bare `\n` into `\r\n` for serial terminals.

use defmt::*;
use embassy_rp::uart::BufferedUartTx;
use embedded_io_async::Write;

use crate::channels::TERMINAL;

/// Buffer size for one pipe read
const TX_BUF_SIZE: usize = 64;

/// Console TX task - drains the terminal pipe
#[embassy_executor::task]
pub async fn console_tx_task(mut tx: BufferedUartTx) {
    info!("Console TX task started");

    let mut buf = [0u8; TX_BUF_SIZE];

    loop {
        let n = TERMINAL.read(&mut buf).await;

        for line in buf[..n].split_inclusive(|&b| b == b'\n') {
            let (text, newline) = match line.split_last() {
                Some((b'\n', text)) => (text, true),
                _ => (line, false),
            };

            if let Err(e) = tx.write_all(text).await {
                warn!("UART write error: {:?}", e);
                break;
            }
            if newline {
                if let Err(e) = tx.write_all(b"\r\n").await {
                    warn!("UART write error: {:?}", e);
                    break;
                }
            }
        }
    }
}
