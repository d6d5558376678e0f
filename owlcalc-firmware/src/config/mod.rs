//! Configuration loading
//!
//! Loads configuration from flash or the embedded `calc.toml`.
//! Parsing uses the no_std TOML subset parser in owlcalc-core.

pub mod loader;

pub use loader::load_config;
