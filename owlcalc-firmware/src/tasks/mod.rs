//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod compute;
pub mod console_rx;
pub mod console_tx;
pub mod output_poll;

pub use compute::compute_task;
pub use console_rx::console_rx_task;
pub use console_tx::console_tx_task;
pub use output_poll::output_poll_task;
