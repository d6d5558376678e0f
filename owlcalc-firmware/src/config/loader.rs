//! Configuration persistence
//!
//! Loads compute configuration from flash storage.
//! Falls back to the embedded defaults if flash is empty.

use core::str;
use defmt::*;

use owlcalc_core::config::{parse_config, CalcConfig, ParseError, CONFIG_VERSION};

use crate::flash::{self, Flash, FlashError, CONFIG_RANGE};

/// Maximum serialized config size (binary)
const MAX_CONFIG_SIZE: usize = 256;

/// Maximum TOML config size
const MAX_TOML_SIZE: usize = 2048;

/// Flash key of the TOML configuration
const TOML_KEY: u8 = 1;

/// Flash key of the postcard configuration
const BINARY_KEY: u8 = 2;

/// Configuration persistence errors
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Flash operation failed
    Flash(FlashError),
    /// Deserialization failed
    Deserialize,
    /// TOML parsing failed
    TomlParse(ParseError),
    /// Invalid UTF-8 in TOML data
    InvalidUtf8,
    /// Config version mismatch
    VersionMismatch,
    /// Values are out of range
    Invalid,
}

impl From<FlashError> for ConfigError {
    fn from(e: FlashError) -> Self {
        ConfigError::Flash(e)
    }
}

impl From<ParseError> for ConfigError {
    fn from(e: ParseError) -> Self {
        ConfigError::TomlParse(e)
    }
}

/// Configuration persistence manager
///
/// Borrows the flash driver while loading; the driver is handed
/// on to environment storage afterwards.
pub struct ConfigPersistence<'f> {
    flash: &'f mut Flash,
}

impl<'f> ConfigPersistence<'f> {
    /// Create a new config persistence manager
    pub fn new(flash: &'f mut Flash) -> Self {
        Self { flash }
    }

    /// Load configuration from flash
    ///
    /// Tries to load TOML config first, falls back to binary postcard format.
    pub async fn load(&mut self) -> Result<CalcConfig, ConfigError> {
        info!("Loading configuration from flash...");

        match self.load_toml().await {
            Ok(config) => {
                info!("Loaded configuration from TOML");
                return Ok(config);
            }
            Err(ConfigError::Flash(FlashError::NotFound)) => {
                debug!("No TOML config found, trying binary format");
            }
            Err(e) => {
                warn!("Failed to load TOML config: {:?}, trying binary", e);
            }
        }

        self.load_binary().await
    }

    /// Load configuration from TOML format
    async fn load_toml(&mut self) -> Result<CalcConfig, ConfigError> {
        let mut buffer = [0u8; MAX_TOML_SIZE];
        let len = flash::read_item(self.flash, CONFIG_RANGE, &TOML_KEY, &mut buffer).await?;

        debug!("Read {} bytes of TOML from flash", len);

        let toml_str = str::from_utf8(&buffer[..len]).map_err(|_| ConfigError::InvalidUtf8)?;
        let config = parse_config(toml_str)?;

        log_config_summary(&config);
        Ok(config)
    }

    /// Load configuration from binary postcard format
    async fn load_binary(&mut self) -> Result<CalcConfig, ConfigError> {
        let mut buffer = [0u8; MAX_CONFIG_SIZE];
        let len = flash::read_item(self.flash, CONFIG_RANGE, &BINARY_KEY, &mut buffer).await?;

        debug!("Read {} bytes of binary config from flash", len);

        let config: CalcConfig =
            postcard::from_bytes(&buffer[..len]).map_err(|_| ConfigError::Deserialize)?;

        if config.version != CONFIG_VERSION {
            warn!(
                "Config version mismatch: found {}, expected {}",
                config.version, CONFIG_VERSION
            );
            return Err(ConfigError::VersionMismatch);
        }
        if !config.is_valid() {
            return Err(ConfigError::Invalid);
        }

        log_config_summary(&config);
        Ok(config)
    }
}

/// Load the active configuration
///
/// Flash TOML, then flash postcard, then the embedded `calc.toml`, then
/// built-in defaults.
pub async fn load_config(flash: &mut Flash, embedded: &str) -> CalcConfig {
    let mut persistence = ConfigPersistence::new(flash);

    match persistence.load().await {
        Ok(config) => {
            info!("Loaded configuration from flash");
            return config;
        }
        Err(e) => {
            info!("No valid configuration in flash ({:?}), using embedded defaults", e);
        }
    }

    match parse_config(embedded) {
        Ok(config) => {
            log_config_summary(&config);
            config
        }
        Err(e) => {
            // build.rs validates calc.toml, so this only happens if the
            // validator and the parser disagree
            error!("Failed to parse embedded config: {:?}", e);
            CalcConfig::default()
        }
    }
}

/// Log a summary of the loaded configuration
fn log_config_summary(config: &CalcConfig) {
    info!("Configuration loaded successfully");
    debug!(
        "  lock {} ms, result {} ms",
        config.lock_timeout_ms, config.result_timeout_ms
    );
    debug!(
        "  ack {} ms, poll {} ms",
        config.ack_timeout_ms, config.poll_interval_ms
    );
    debug!(
        "  clock {:?} -> {:?}, storage {}",
        config.warmup_clock, config.ready_clock, config.storage_enabled
    );
}
