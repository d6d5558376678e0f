//! Engine boundary
//!
//! The expression engine (parsing, arbitrary-precision arithmetic, base
//! conversion) is an external collaborator. This module defines the call
//! boundary the compute task uses to reach it, and the hooks the engine
//! receives once at initialization.

pub mod format;

use core::future::Future;

use crate::protocol::Emitter;

pub use format::{format_response, ERROR_PREFIX, RESULT_PREFIX};

/// Outcome of one engine computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    /// Computation succeeded; empty representations are omitted from output
    Value {
        decimal: &'a str,
        hex: &'a str,
        binary: &'a str,
    },
    /// Engine reported a failure with an explanatory message
    Error(&'a str),
}

/// Result of one engine computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Computation<'a> {
    pub outcome: Outcome<'a>,
    /// Time the engine spent computing
    pub elapsed_ms: u32,
}

impl<'a> Computation<'a> {
    /// Successful computation
    pub fn value(decimal: &'a str, hex: &'a str, binary: &'a str, elapsed_ms: u32) -> Self {
        Self {
            outcome: Outcome::Value {
                decimal,
                hex,
                binary,
            },
            elapsed_ms,
        }
    }

    /// Failed computation
    pub fn error(message: &'a str, elapsed_ms: u32) -> Self {
        Self {
            outcome: Outcome::Error(message),
            elapsed_ms,
        }
    }

    /// Check if the engine reported success
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Value { .. })
    }
}

/// Errors from engine initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineInitError {
    /// The engine runtime could not be started
    RuntimeStart,
    /// Not enough memory for the engine heap
    OutOfMemory,
}

/// Everything the engine is given at initialization
///
/// - `emitter`: the ack-gated push path for unsolicited output
/// - `output_capacity`: bytes per push; longer text must be split
/// - `storage`: environment storage primitives, status codes passed through
pub struct EngineHooks<'a, const N: usize, S> {
    pub emitter: Emitter<'a, N>,
    pub output_capacity: usize,
    pub storage: S,
}

/// Trait for expression engines
///
/// The compute task never calls `compute` reentrantly: at most one
/// computation is in flight at a time.
pub trait Engine {
    /// Evaluate one expression
    ///
    /// Engine-level failures (syntax errors, unknown functions) are data,
    /// reported through [`Outcome::Error`], not faults.
    fn compute<'a>(&'a mut self, expression: &'a str)
        -> impl Future<Output = Computation<'a>> + 'a;
}
