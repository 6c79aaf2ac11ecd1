mod actor;
mod client;
mod cluster;
mod commitlog;
mod controller;
mod node;
mod oplog;
mod replication;
mod server;
mod grpc {
    include!("../generated/replset.rs");
}

pub use client::ClientError;
pub use client::NodeClient;
pub use client::Session;
pub use client::NOT_PRIMARY_CODE;
pub use client::NOT_PRIMARY_NO_STALE_READS_CODE;
pub use cluster::ClusterEvent;
pub use cluster::ClusterView;
pub use cluster::CommandKind;
pub use cluster::ControlCommand;
pub use cluster::Epoch;
pub use cluster::MemberInfo;
pub use cluster::NodeId;
pub use cluster::NodeRecord;
pub use cluster::Role;
pub use controller::ClusterConfig;
pub use controller::ClusterController;
pub use controller::ControllerError;
pub use controller::ReplSetOptions;
pub use node::Document;
pub use node::DocumentError;
pub use node::Filter;
pub use node::NodeCreationError;
pub use node::NodeStatus;
pub use oplog::Operation;
pub use oplog::SeqNo;

// Root modules hold only `mod` and `pub use` statements. Nothing below the root is `pub mod`;
// types leave the crate one `pub use` at a time.
