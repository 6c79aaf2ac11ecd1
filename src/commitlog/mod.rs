//! Storage-agnostic append-only log. Nodes consume it through the `Log` trait; `InMemoryLog` is
//! the implementation the cluster is wired with today.

mod in_memory;
mod log;

pub use in_memory::InMemoryLog;
pub use log::Entry;
pub use log::Index;
pub use log::Log;
