//! owlcalc Hardware Abstraction Layer
//!
//! This crate defines the capability traits the compute protocol calls
//! through. Board crates implement them against real hardware; host
//! builds and tests use the no-op implementations provided here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  owlcalc-core (compute protocol)        │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  owlcalc-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │   firmware    │       │  NoopPower /  │
//! │ (RP2040 impl) │       │  NoStorage    │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`power::PowerControl`] - Performance floor lock and clock floor
//! - [`storage::EnvStorage`] - Named environment files for the engine

#![no_std]
#![deny(unsafe_code)]

pub mod power;
pub mod storage;

// Re-export key traits at crate root for convenience
pub use power::{ClockLevel, NoopPower, PowerControl, PowerError};
pub use storage::{EnvStorage, NoStorage, OpenMode, StorageStatus, MAX_ENV_NAME};
