//! Configuration types
//!
//! Board-agnostic configuration for the compute protocol, plus a parser for
//! the TOML subset the firmware embeds and stores in flash.

pub mod toml;
pub mod types;

pub use toml::{parse_config, ParseError};
pub use types::*;
