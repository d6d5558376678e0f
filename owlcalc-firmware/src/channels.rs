//! Inter-task communication channels
//!
//! Defines the static channels used for communication between Embassy tasks.
//! Uses the owlcalc-core protocol primitives and embassy-sync.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;

use owlcalc_core::config::{INPUT_LEN, MESSAGE_LEN, OUTPUT_LEN};
use owlcalc_core::{CalcChannel, OutputChannel};

/// Console output buffer size
const TERMINAL_LEN: usize = 1024;

/// Expression requests from the console to the compute task
pub static CALC: CalcChannel<INPUT_LEN, OUTPUT_LEN> = CalcChannel::new();

/// Unsolicited engine output, drained by the output poller
pub static OUTPUT: OutputChannel<MESSAGE_LEN> = OutputChannel::new();

/// Text waiting to be written to the console UART
pub static TERMINAL: Pipe<CriticalSectionRawMutex, TERMINAL_LEN> = Pipe::new();
