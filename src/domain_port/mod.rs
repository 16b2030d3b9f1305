// storage

mod session_persistence;

pub use session_persistence::*;

// network

mod token_refresh_client;

pub use token_refresh_client::*;

// host

mod app_lifecycle;
mod clock;
mod navigator;

pub use app_lifecycle::*;
pub use clock::*;
pub use navigator::*;
