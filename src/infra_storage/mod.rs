mod encrypted_file_store;
mod memory_store;

pub use encrypted_file_store::*;
pub use memory_store::*;
