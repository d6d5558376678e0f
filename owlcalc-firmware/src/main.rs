//! owlcalc - Calculator Firmware
//!
//! Main firmware binary for RP2040-based calculator boards. A console on
//! UART0 hands expressions to a dedicated compute task that drives the
//! precompiled expression engine.
//!
//! Executors:
//! - thread mode: the compute task (engine calls block for a long time)
//! - SWI_IRQ_1 interrupt executor: console RX/TX and the output poller

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::bind_interrupts;
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::config::load_config;
use crate::storage::FlashEnvStorage;

mod channels;
mod config;
mod engine;
mod flash;
mod power;
mod storage;
mod tasks;

/// Embedded default configuration (compiled into firmware)
/// Edit calc.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../calc.toml");

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

/// Executor for the latency-sensitive console tasks
static EXECUTOR_CONSOLE: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_CONSOLE.on_interrupt()
}

// Static cells for UART buffers (must live forever)
static TX_BUF: StaticCell<[u8; 256]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 256]> = StaticCell::new();

// Environment storage outlives the engine that borrows it
static ENV_STORAGE: StaticCell<FlashEnvStorage> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("owlcalc firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Load configuration from flash (or use embedded defaults)
    let mut flash = flash::Flash::new(p.FLASH, p.DMA_CH0);
    let config = load_config(&mut flash, EMBEDDED_CONFIG).await;
    info!("Configuration loaded");

    // Setup UART for the console (115200 baud default)
    let tx_buf = TX_BUF.init([0u8; 256]);
    let rx_buf = RX_BUF.init([0u8; 256]);

    let uart = BufferedUart::new(
        p.UART0,
        p.PIN_0,
        p.PIN_1,
        Irqs,
        tx_buf,
        rx_buf,
        UartConfig::default(),
    );
    let (tx, rx) = uart.split();

    info!("UART initialized for console");

    // Console tasks preempt the compute task
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let console = EXECUTOR_CONSOLE.start(interrupt::SWI_IRQ_1);

    console.spawn(tasks::console_tx_task(tx)).unwrap();
    console
        .spawn(tasks::console_rx_task(rx, config.clone()))
        .unwrap();
    console
        .spawn(tasks::output_poll_task(config.poll_interval()))
        .unwrap();

    let storage = ENV_STORAGE.init(FlashEnvStorage::new(flash));
    spawner.spawn(tasks::compute_task(storage, config)).unwrap();

    info!("All tasks spawned, firmware running");

    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!(
            "Heartbeat: {} performance holds, clock floor {:?}",
            power::performance_holds(),
            power::clock_floor()
        );
    }
}
