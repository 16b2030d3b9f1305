mod clock_impl;
mod lifecycle_signal;
mod navigator_impl;
mod session_manager;
mod session_store;
mod token_client_fake;

pub use clock_impl::*;
pub use lifecycle_signal::*;
pub use navigator_impl::*;
pub use session_manager::*;
pub use session_store::*;
pub use token_client_fake::*;
