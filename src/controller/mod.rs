//! Cluster Controller: starts the replica set and drives role changes, including failover.

mod controller;
mod options;

pub use controller::ClusterConfig;
pub use controller::ClusterController;
pub use controller::ControllerError;
pub use options::ReplSetOptions;
