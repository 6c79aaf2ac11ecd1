//! Types shared by every node and the cluster controller.

mod command;
mod events;
mod types;
mod view;

pub use command::CommandKind;
pub use command::ControlCommand;
pub use events::ClusterEvent;
pub use types::Epoch;
pub use types::MemberInfo;
pub use types::NodeId;
pub use types::Role;
pub use view::ClusterView;
pub use view::NodeRecord;

pub(crate) use events::event_channel;
pub(crate) use events::ClusterEventPublisher;
pub(crate) use events::ClusterEventStream;
pub(crate) use types::PrimaryLease;
