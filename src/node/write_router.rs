use crate::node::node_api::{WriteError, WriteInput, WriteOutput};
use crate::node::role_manager::RoleManager;
use crate::oplog::OpLog;

/// WriteRouter accepts client writes on a Primary and refuses them anywhere else.
///
/// Write concern is "local": a write returns as soon as it is in this node's operation log.
/// Replication fan-out is driven by the append waking every suspended `LogReader`, so the write
/// path never waits on a secondary.
pub(crate) struct WriteRouter {
    logger: slog::Logger,
}

impl WriteRouter {
    pub(crate) fn new(logger: slog::Logger) -> Self {
        WriteRouter { logger }
    }

    pub(crate) fn write(&self, roles: &RoleManager, oplog: &OpLog, input: WriteInput) -> Result<WriteOutput, WriteError> {
        let lease = roles
            .primary_lease()
            .map_err(|primary| WriteError::NotPrimary { primary })?;

        if roles.is_superseded(input.epoch) {
            slog::info!(
                self.logger,
                "Rejecting write tagged {:?}; my epoch is {:?}",
                input.epoch,
                roles.epoch()
            );
            return Err(WriteError::NotPrimary { primary: None });
        }

        let payload = input.document.to_payload()?;
        let op = oplog.append(&lease, payload)?;

        slog::debug!(self.logger, "Accepted write {:?} in epoch {:?}", op.seq, op.epoch);
        Ok(WriteOutput {
            seq: op.seq,
            epoch: op.epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ControlCommand, Epoch, NodeId};
    use crate::commitlog::InMemoryLog;
    use crate::node::document::Document;
    use crate::oplog::SeqNo;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn setup(me: &str, primary: &str) -> (RoleManager, Arc<OpLog>) {
        let members = vec![
            (NodeId::from("a"), SocketAddr::from(([127, 0, 0, 1], 1))),
            (NodeId::from("b"), SocketAddr::from(([127, 0, 0, 1], 2))),
        ]
        .into_iter()
        .collect();
        let mut roles = RoleManager::new(test_logger(), NodeId::from(me), members);
        roles
            .apply_command(ControlCommand::promote(Epoch::initial(), NodeId::from(primary)))
            .unwrap();

        (roles, OpLog::new(test_logger(), Box::new(InMemoryLog::new())))
    }

    fn input(count: u64, epoch: Option<Epoch>) -> WriteInput {
        let body = match json!({ "count": count }) {
            Value::Object(body) => body,
            _ => unreachable!(),
        };
        WriteInput {
            document: Document::new("coll", body),
            epoch,
        }
    }

    #[test]
    fn primary_accepts_writes_in_order() {
        let (roles, oplog) = setup("a", "a");
        let router = WriteRouter::new(test_logger());

        for i in 1..=10 {
            let output = router.write(&roles, &oplog, input(i, None)).unwrap();
            assert_eq!(output.seq, SeqNo::new(i));
            assert_eq!(output.epoch, Epoch::initial());
        }
        assert_eq!(oplog.snapshot().unwrap().len(), 10);
    }

    #[test]
    fn secondary_rejects_writes() {
        let (roles, oplog) = setup("b", "a");
        let router = WriteRouter::new(test_logger());

        match router.write(&roles, &oplog, input(1, None)) {
            Err(WriteError::NotPrimary { primary }) => assert_eq!(primary, Some(NodeId::from("a"))),
            other => panic!("Expected NotPrimary, got {:?}", other),
        }
        assert_eq!(oplog.last_seq(), SeqNo::ZERO);
    }

    #[test]
    fn epoch_tags_are_enforced() {
        let (mut roles, oplog) = setup("a", "a");
        roles
            .apply_command(ControlCommand::promote(Epoch::new(2), NodeId::from("a")))
            .unwrap();
        let router = WriteRouter::new(test_logger());

        // Client is newer than us
        assert!(matches!(
            router.write(&roles, &oplog, input(1, Some(Epoch::new(3)))),
            Err(WriteError::NotPrimary { primary: None })
        ));
        assert_eq!(oplog.last_seq(), SeqNo::ZERO);

        assert_eq!(router.write(&roles, &oplog, input(1, Some(Epoch::new(2)))).unwrap().seq, SeqNo::new(1));
    }

    #[test]
    fn client_behind_a_failover_can_write_to_new_primary() {
        // "b" was a secondary at epoch 1 and is promoted at epoch 2.
        let (mut roles, oplog) = setup("b", "a");
        roles
            .apply_command(ControlCommand::promote(Epoch::new(2), NodeId::from("b")))
            .unwrap();
        let router = WriteRouter::new(test_logger());

        let output = router.write(&roles, &oplog, input(1, Some(Epoch::initial()))).unwrap();
        assert_eq!(output.seq, SeqNo::new(1));
        assert_eq!(output.epoch, Epoch::new(2));
    }
}
