//! Response formatting
//!
//! ```text
//! <: 255          decimal
//!    0xFF         hex
//!    0b11111111   binary
//! ```
//!
//! Failures become a single `<: error: ...` line. The response always ends
//! with a newline.

use crate::buffer::{BoundedText, LengthExceeded};

use super::{Computation, Outcome};

/// Prefix of the first result line
pub const RESULT_PREFIX: &str = "<: ";

/// Prefix of an engine error line
pub const ERROR_PREFIX: &str = "<: error: ";

/// Indent of continuation lines
const CONTINUATION: &str = "   ";

/// Replacement text when the formatted result does not fit
const TOO_LONG: &str = "<: error: result too long\n";

/// Format a computation into `out`
///
/// If the formatted text does not fit, `out` holds a short error line
/// instead and the overflow is returned for logging.
pub fn format_response<const N: usize>(
    computation: &Computation<'_>,
    out: &mut BoundedText<N>,
) -> Result<(), LengthExceeded> {
    out.clear();

    match write_response(computation, out) {
        Ok(()) => Ok(()),
        Err(e) => {
            out.clear();
            // A response buffer too small for this line is a build error
            let _ = out.push_str(TOO_LONG);
            Err(e)
        }
    }
}

fn write_response<const N: usize>(
    computation: &Computation<'_>,
    out: &mut BoundedText<N>,
) -> Result<(), LengthExceeded> {
    match computation.outcome {
        Outcome::Error(message) => {
            out.push_str(ERROR_PREFIX)?;
            out.push_str(message)?;
        }
        Outcome::Value {
            decimal,
            hex,
            binary,
        } => {
            let mut first = true;
            for repr in [decimal, hex, binary] {
                if repr.is_empty() {
                    continue;
                }
                if first {
                    out.push_str(RESULT_PREFIX)?;
                    first = false;
                } else {
                    if !out.ends_with('\n') {
                        out.push('\n')?;
                    }
                    out.push_str(CONTINUATION)?;
                }
                out.push_str(repr)?;
            }
        }
    }

    if !out.ends_with('\n') {
        out.push('\n')?;
    }

    Ok(())
}
