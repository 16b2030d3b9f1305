//! Settings are read from a TOML file; `--settings` picks a different one.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
