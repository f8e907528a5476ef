//! Logging setup for the `toyfactory` binary.
//!
//! Logging format is controlled via `TOYFACTORY_LOG_FORMAT`:
//! - `json` - Structured JSON output
//! - `pretty` - Human-readable multi-line output (default for TTY)
//! - `compact` - Compact single-line format (default for non-TTY)
//!
//! The filter comes from `RUST_LOG`, or from the `-v` count when it is unset.

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig};
pub use tracing_setup::init_tracing;
