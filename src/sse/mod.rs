pub mod models;

mod broadcaster;
mod connection;
mod registry;

pub use broadcaster::Broadcaster;
pub use registry::Registry;

mod poll_updates_sse;

pub use poll_updates_sse::poll_updates_sse;
