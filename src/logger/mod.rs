//! Process-wide `tracing` setup. The filter starts at `info` (or `RUST_LOG`)
//! and is swapped for the configured one once settings are parsed.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
