//! Board-agnostic compute protocol for the calculator firmware
//!
//! This crate contains the coordination logic between the UI/console
//! tasks and the dedicated compute task, independent of any board:
//!
//! - Bounded text buffers
//! - Request/response mailbox with ownership exclusion
//! - Ack-gated output side channel for engine pushes
//! - Performance lock coordination around engine calls
//! - Engine boundary and response formatting
//! - Compute task loop
//! - Configuration type definitions and parser

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub(crate) mod log;

pub mod buffer;
pub mod config;
pub mod engine;
pub mod power;
pub mod protocol;
pub mod storage;
pub mod task;

pub use buffer::{utf8_prefix, BoundedText, LengthExceeded};
pub use config::CalcConfig;
pub use engine::{Computation, Engine, EngineHooks, EngineInitError, Outcome};
pub use power::{PerformanceLock, PowerCoordinator};
pub use protocol::{
    CalcChannel, CallError, EmitError, Emitter, OutputChannel, OutputMessage, PendingCall,
    Request, Response,
};
pub use storage::{fit_name_list, LazyStorage};
pub use task::{ComputeTask, StartupError};
