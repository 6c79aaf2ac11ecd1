mod error;
mod node_client;
mod session;

pub use error::ClientError;
pub use error::NOT_PRIMARY_CODE;
pub use error::NOT_PRIMARY_NO_STALE_READS_CODE;
pub use node_client::NodeClient;
pub use session::Session;
