//! Build script for owlcalc-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Links the precompiled expression engine library
//! - Validates calc.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sections the firmware's config parser understands
const SECTIONS: &[&str] = &["calc", "output", "power", "storage"];

/// Clock level names accepted by `warmup_clock` / `ready_clock`
const CLOCK_LEVELS: &[&str] = &["low", "medium", "max"];

fn main() {
    setup_linker();
    link_engine();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Link the engine static library
///
/// `HEXOWL_LIB_DIR` points at the directory holding `libhexowl.a`, built
/// separately with the engine's own toolchain.
fn link_engine() {
    println!("cargo:rerun-if-env-changed=HEXOWL_LIB_DIR");

    let lib_dir = match env::var("HEXOWL_LIB_DIR") {
        Ok(dir) => dir,
        Err(_) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: HEXOWL_LIB_DIR is not set                                ║\n\
                ║                                                                  ║\n\
                ║  Point it at the directory containing libhexowl.a                ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n"
            );
        }
    };

    if !Path::new(&lib_dir).join("libhexowl.a").exists() {
        println!("cargo:warning=libhexowl.a not found in {}", lib_dir);
    }

    println!("cargo:rustc-link-search=native={}", lib_dir);
    println!("cargo:rustc-link-lib=static=hexowl");
}

/// Validate calc.toml configuration at compile time
fn validate_config() {
    println!("cargo:rerun-if-changed=calc.toml");

    let config_path = Path::new("calc.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: calc.toml not found!                                     ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds calc.toml as its default configuration.     ║\n\
            ║  Please create one in the owlcalc-firmware directory.            ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read calc.toml                                 ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in calc.toml                         ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let mut errors = Vec::new();
    validate_sections(&config, &mut errors);
    validate_timeouts(&config, &mut errors);
    validate_power(&config, &mut errors);
    validate_storage(&config, &mut errors);

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid configuration in calc.toml                       ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=calc.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reject sections the runtime parser would reject
fn validate_sections(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(table) = config.as_table() else {
        return;
    };

    for (name, value) in table {
        match value {
            toml::Value::Table(_) if SECTIONS.contains(&name.as_str()) => {}
            toml::Value::Table(_) => errors.push(format!("unknown section [{}]", name)),
            // Root-level keys are ignored at runtime
            _ => {}
        }
    }
}

/// Read `[section] key` as a non-negative integer
fn get_ms(config: &toml::Value, section: &str, key: &str, errors: &mut Vec<String>) -> Option<i64> {
    match config.get(section).and_then(|s| s.get(key)) {
        Some(toml::Value::Integer(v)) if *v >= 0 && *v <= u32::MAX as i64 => Some(*v),
        Some(_) => {
            errors.push(format!("[{}] {} must be 0-{}", section, key, u32::MAX));
            None
        }
        None => None,
    }
}

/// Validate timeouts and intervals
fn validate_timeouts(config: &toml::Value, errors: &mut Vec<String>) {
    for key in ["lock_timeout_ms", "result_timeout_ms"] {
        if get_ms(config, "calc", key, errors) == Some(0) {
            errors.push(format!("[calc] {} must be greater than 0", key));
        }
    }

    get_ms(config, "output", "ack_timeout_ms", errors);
    if get_ms(config, "output", "poll_interval_ms", errors) == Some(0) {
        errors.push("[output] poll_interval_ms must be greater than 0".to_string());
    }
}

/// Validate clock floors
fn validate_power(config: &toml::Value, errors: &mut Vec<String>) {
    let level = |key: &str| -> Option<usize> {
        match config.get("power").and_then(|p| p.get(key)) {
            Some(toml::Value::String(name)) => CLOCK_LEVELS.iter().position(|l| l == name),
            _ => None,
        }
    };

    for key in ["warmup_clock", "ready_clock"] {
        if config.get("power").and_then(|p| p.get(key)).is_some() && level(key).is_none() {
            errors.push(format!(
                "[power] {} must be 'low', 'medium' or 'max'",
                key
            ));
        }
    }

    let warmup = level("warmup_clock").unwrap_or(0);
    let ready = level("ready_clock").unwrap_or(CLOCK_LEVELS.len() - 1);
    if warmup > ready {
        errors.push("[power] warmup_clock must not exceed ready_clock".to_string());
    }
}

/// Validate storage options
fn validate_storage(config: &toml::Value, errors: &mut Vec<String>) {
    if let Some(value) = config.get("storage").and_then(|s| s.get("enabled")) {
        if !value.is_bool() {
            errors.push("[storage] enabled must be true or false".to_string());
        }
    }
}
