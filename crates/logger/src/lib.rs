//! Shared tracing setup for the vigil binaries.

pub mod tracing;

pub use self::tracing::{LogFormat, LogOptions, ParseLogFormatError, init_tracing};
