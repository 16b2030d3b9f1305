mod app;
mod command;

pub use app::*;
pub use command::*;
