//! Compute task
//!
//! Owns the expression engine. Runs on the thread-mode executor so a long
//! blocking engine call never starves the console tasks, which run on the
//! interrupt executor.

use defmt::*;

use owlcalc_core::{CalcConfig, ComputeTask};

use crate::channels::{CALC, OUTPUT};
use crate::engine::HexowlEngine;
use crate::power::Rp2040Power;
use crate::storage::FlashEnvStorage;

/// Heap handed to the engine runtime
const ENGINE_HEAP_SIZE: usize = 96 * 1024;

/// Compute task - serves expression requests forever
#[embassy_executor::task]
pub async fn compute_task(storage: &'static mut FlashEnvStorage, config: CalcConfig) {
    info!("Compute task started");

    let task = ComputeTask::start(&CALC, &OUTPUT, Rp2040Power::new(), storage, &config, |hooks| {
        HexowlEngine::init(hooks, ENGINE_HEAP_SIZE)
    });

    let mut task = match task {
        Ok(task) => task,
        Err(e) => {
            // Callers see result timeouts from here on
            error!("Compute task startup failed: {:?}", e);
            return;
        }
    };

    task.run().await;
}
