//! Logging macros
//!
//! Forward to `defmt` when the `defmt` feature is enabled. Without it the
//! macros only borrow their arguments, so host builds and tests need no
//! global logger.

#[cfg(feature = "defmt")]
#[allow(unused_imports)]
pub(crate) use defmt::{debug, error, info, trace, warn};

#[cfg(not(feature = "defmt"))]
macro_rules! trace_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $(let _ = &$arg;)*
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! debug_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $(let _ = &$arg;)*
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! info_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $(let _ = &$arg;)*
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $(let _ = &$arg;)*
    }};
}

#[cfg(not(feature = "defmt"))]
macro_rules! error_noop {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        $(let _ = &$arg;)*
    }};
}

#[cfg(not(feature = "defmt"))]
pub(crate) use debug_noop as debug;
#[cfg(not(feature = "defmt"))]
pub(crate) use error_noop as error;
#[cfg(not(feature = "defmt"))]
pub(crate) use info_noop as info;
#[cfg(not(feature = "defmt"))]
#[allow(unused_imports)]
pub(crate) use trace_noop as trace;
#[cfg(not(feature = "defmt"))]
pub(crate) use warn_noop as warn;
