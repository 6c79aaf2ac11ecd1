use crate::client::error::ClientError;
use crate::client::node_client::NodeClient;
use crate::cluster::Epoch;
use crate::node::{Document, DocumentError, Filter, NodeStatus};
use crate::oplog::SeqNo;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::time::Duration;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(500);

/// Session is one client connection to one node, like a shell connected with `new Mongo(host)`.
///
/// The stale-reads flag lives here, not on the server: two sessions to the same secondary can
/// disagree. Writes are tagged with the highest epoch this session has seen, so a node that
/// has fallen behind a failover can't accept them. A session that has fallen behind is fine:
/// the new primary accepts its writes and the reply carries the newer epoch.
pub struct Session {
    client: NodeClient,
    allow_stale: bool,
    observed_epoch: Epoch,
}

impl Session {
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::connect_with_timeout(addr, DEFAULT_RPC_TIMEOUT).await
    }

    pub async fn connect_with_timeout(addr: SocketAddr, rpc_timeout: Duration) -> Result<Self, ClientError> {
        let client = NodeClient::connect(addr, rpc_timeout).await?;
        let mut session = Session {
            client,
            allow_stale: false,
            observed_epoch: Epoch::default(),
        };

        // Handshake, the way drivers send isMaster on connect.
        session.is_master().await?;
        Ok(session)
    }

    /// Same as `rs.secondaryOk()` / `setSlaveOk()` in the shell.
    pub fn set_allow_stale_reads(&mut self, allow: bool) {
        self.allow_stale = allow;
    }

    pub fn allow_stale_reads(&self) -> bool {
        self.allow_stale
    }

    pub fn observed_epoch(&self) -> Epoch {
        self.observed_epoch
    }

    /// Insert one document. `body` must be a JSON object.
    pub async fn write(&mut self, collection: &str, body: Value) -> Result<SeqNo, ClientError> {
        let document = match body {
            Value::Object(body) => Document::new(collection, body),
            _ => return Err(ClientError::InvalidDocument(DocumentError::NotAnObject)),
        };

        let tag = if self.observed_epoch == Epoch::default() {
            None
        } else {
            Some(self.observed_epoch)
        };

        let (seq, epoch) = self.client.write(&document, tag).await?;
        self.observe(epoch);
        Ok(seq)
    }

    pub async fn read(&self, filter: &Filter) -> Result<Vec<Document>, ClientError> {
        let (documents, _) = self.client.read(filter, self.allow_stale).await?;
        Ok(documents)
    }

    pub async fn is_master(&mut self) -> Result<NodeStatus, ClientError> {
        let status = self.client.status().await?;
        self.observe(status.epoch);
        Ok(status)
    }

    /// `db.adminCommand({shutdown: 1})`
    pub async fn admin_shutdown(&self) -> Result<(), ClientError> {
        self.client.shutdown().await
    }

    fn observe(&mut self, epoch: Epoch) {
        if epoch > self.observed_epoch {
            self.observed_epoch = epoch;
        }
    }
}
