//! Replication Link: a secondary's pull of the primary's operation log.

mod backoff;
mod link;

pub(crate) use link::spawn_link;
pub(crate) use link::LinkConfig;
pub(crate) use link::LinkHandle;
pub(crate) use link::LinkOptions;
