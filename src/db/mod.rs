pub mod connection;
pub mod models;
pub mod repositories;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use connection::*;
pub use models::*;
pub use repositories::*;
pub use store::*;

#[cfg(test)]
pub use memory::MemoryPollStore;
