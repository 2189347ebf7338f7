//! Logging setup. Stdout is reserved for response bodies, so logs go to stderr.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
