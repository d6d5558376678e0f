//! Simple TOML parser for compute configuration
//!
//! This is a minimal TOML parser that handles only the subset needed for
//! the calculator configuration. It does NOT support the full TOML spec.
//!
//! Supported features:
//! - Key = value pairs (string, integer, boolean)
//! - [section] headers
//! - Comments (# ...)
//!
//! Unknown keys are ignored so older firmware accepts newer files.
//! Unknown sections are rejected.
//!
//! ```toml
//! [calc]
//! lock_timeout_ms = 2500
//! result_timeout_ms = 10000
//!
//! [output]
//! ack_timeout_ms = 500
//! poll_interval_ms = 150
//!
//! [power]
//! warmup_clock = "low"
//! ready_clock = "max"
//!
//! [storage]
//! enabled = true
//! ```

use owlcalc_hal::ClockLevel;

use super::types::CalcConfig;

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Invalid or unknown section header
    InvalidSection,
    /// Invalid value type
    InvalidValue,
    /// Values parse but the combination is unusable
    InvalidConfig,
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Calc,
    Output,
    Power,
    Storage,
}

/// Parse TOML configuration into CalcConfig
///
/// Keys that are absent keep their default values.
pub fn parse_config(input: &str) -> Result<CalcConfig, ParseError> {
    let mut config = CalcConfig::new();
    let mut section = Section::Root;

    for line in input.lines() {
        let line = strip_comment(line);

        if line.is_empty() {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = parse_section_header(&line[1..line.len() - 1])?;
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(section, key, value, &mut config)?;
        }
    }

    if !config.is_valid() {
        return Err(ParseError::InvalidConfig);
    }

    Ok(config)
}

/// Remove a trailing `#` comment and surrounding whitespace
fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(hash_pos) => line[..hash_pos].trim(),
        None => line.trim(),
    }
}

/// Parse section header like "calc" or "power"
fn parse_section_header(header: &str) -> Result<Section, ParseError> {
    match header.trim() {
        "calc" => Ok(Section::Calc),
        "output" => Ok(Section::Output),
        "power" => Ok(Section::Power),
        "storage" => Ok(Section::Storage),
        _ => Err(ParseError::InvalidSection),
    }
}

/// Parse "key = value" line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key, value))
}

/// Parse a string value (quoted or unquoted)
fn parse_string(value: &str) -> &str {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        &value[1..value.len() - 1]
    } else {
        // Allow unquoted strings for simple values
        value
    }
}

/// Parse an integer value, allowing `_` digit separators
fn parse_u32(value: &str) -> Result<u32, ParseError> {
    let mut result: u32 = 0;
    let mut digits = 0;

    for c in value.chars() {
        match c {
            '_' => continue,
            '0'..='9' => {
                result = result
                    .checked_mul(10)
                    .and_then(|r| r.checked_add(c as u32 - '0' as u32))
                    .ok_or(ParseError::InvalidValue)?;
                digits += 1;
            }
            _ => return Err(ParseError::InvalidValue),
        }
    }

    if digits == 0 {
        return Err(ParseError::InvalidValue);
    }

    Ok(result)
}

/// Parse a boolean value
fn parse_bool(value: &str) -> Result<bool, ParseError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParseError::InvalidValue),
    }
}

/// Parse a clock level name
fn parse_clock(value: &str) -> Result<ClockLevel, ParseError> {
    ClockLevel::from_name(parse_string(value)).ok_or(ParseError::InvalidValue)
}

/// Apply a key-value pair to the current section
fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut CalcConfig,
) -> Result<(), ParseError> {
    match section {
        Section::Root => {} // Ignore root-level keys
        Section::Calc => match key {
            "lock_timeout_ms" => config.lock_timeout_ms = parse_u32(value)?,
            "result_timeout_ms" => config.result_timeout_ms = parse_u32(value)?,
            _ => {} // Ignore unknown keys
        },
        Section::Output => match key {
            "ack_timeout_ms" => config.ack_timeout_ms = parse_u32(value)?,
            "poll_interval_ms" => config.poll_interval_ms = parse_u32(value)?,
            _ => {}
        },
        Section::Power => match key {
            "warmup_clock" => config.warmup_clock = parse_clock(value)?,
            "ready_clock" => config.ready_clock = parse_clock(value)?,
            _ => {}
        },
        Section::Storage => match key {
            "enabled" => config.storage_enabled = parse_bool(value)?,
            _ => {}
        },
    }

    Ok(())
}
