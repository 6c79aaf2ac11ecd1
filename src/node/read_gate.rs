use crate::cluster::Role;
use crate::node::document::Document;
use crate::node::node_api::{ReadError, ReadInput, ReadOutput};
use crate::oplog::{OpLog, SeqNo};

/// ReadGate decides whether this node may serve a read, then serves it from the local
/// operation log.
///
/// A Primary always serves. Anything else serves only if the connection opted into stale reads.
pub(crate) struct ReadGate;

impl ReadGate {
    pub(crate) fn read(role: Role, oplog: &OpLog, input: ReadInput) -> Result<ReadOutput, ReadError> {
        match role {
            Role::Primary => {}
            Role::Removed => return Err(ReadError::NodeRemoved),
            Role::Secondary | Role::Uninitialized => {
                if !input.allow_stale {
                    return Err(ReadError::NotPrimaryNoStaleReadsAllowed);
                }
            }
        }

        let ops = oplog.snapshot()?;
        let last_seq = ops.last().map(|op| op.seq).unwrap_or(SeqNo::ZERO);

        let mut documents = vec![];
        for op in ops {
            let doc = Document::from_payload(&op.payload)?;
            if input.filter.matches(&doc) {
                documents.push(doc);
            }
        }

        Ok(ReadOutput { documents, last_seq })
    }
}
