//! The Log Store: a node's ordered, append-only record of accepted writes, with lazy readers
//! that suspend while caught up.

mod operation;
mod store;

pub use operation::Operation;
pub use operation::SeqNo;
pub use store::LogReader;
pub use store::OpLog;

pub(crate) use operation::OpLogEntry;
pub(crate) use store::ApplyReplicatedError;
