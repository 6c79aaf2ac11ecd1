//! A single replica set member: role manager, write router and read gate behind an actor.

mod document;
mod node;
mod node_api;
mod read_gate;
mod role_manager;
mod wiring;
mod write_router;

pub use document::Document;
pub use document::DocumentError;
pub use document::Filter;
pub use node_api::NodeStatus;
pub use wiring::NodeCreationError;

pub(crate) use node::Node;
pub(crate) use node_api::{
    ApplyError, ApplyInput, ControlError, ControlOutput, LinkReport, ReadError, ReadInput, ReadOutput,
    RollbackInput, RollbackOutput, StreamError, StreamInput, StreamOutput, WriteError, WriteInput, WriteOutput,
};
pub(crate) use wiring::spawn_node;
pub(crate) use wiring::NodeHandle;
pub(crate) use wiring::NodeSpawnConfig;
