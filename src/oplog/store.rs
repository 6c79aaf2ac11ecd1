use crate::cluster::{Epoch, PrimaryLease};
use crate::commitlog::Log;
use crate::oplog::operation::{OpLogEntry, Operation, SeqNo};
use bytes::Bytes;
use chrono::Utc;
use std::fmt;
use std::io;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// OpLog is a node's operation log: the ordered, gap-free record of every accepted write.
///
/// Appends are serialized behind a single-writer lock. Reads take the read side of the same lock,
/// so a reader sees every operation up to the call, and never a half-written one. Every append
/// bumps `tail`, which is what suspended `LogReader`s wait on.
pub struct OpLog {
    logger: slog::Logger,
    log: RwLock<Box<dyn Log<OpLogEntry>>>,
    tail: watch::Sender<SeqNo>,
    // Kept so `tail.send()` never fails for lack of receivers; readers clone it.
    tail_rx: watch::Receiver<SeqNo>,
    closed: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApplyReplicatedError {
    #[error("Sequence gap: expected {expected:?}, received {received:?}")]
    SequenceGap { expected: SeqNo, received: SeqNo },
    #[error("Failed to persist replicated operation")]
    Io(#[from] io::Error),
}

impl OpLog {
    pub fn new(logger: slog::Logger, log: Box<dyn Log<OpLogEntry>>) -> Arc<Self> {
        let last = log.last_index().map(SeqNo::from_index).unwrap_or(SeqNo::ZERO);
        let (tail, tail_rx) = watch::channel(last);

        Arc::new(OpLog {
            logger,
            log: RwLock::new(log),
            tail,
            tail_rx,
            closed: CancellationToken::new(),
        })
    }

    /// Append a client write. Only a Primary holds a `PrimaryLease`, so only a Primary can get here.
    pub(crate) fn append(&self, lease: &PrimaryLease, payload: Bytes) -> Result<Operation, io::Error> {
        let entry = OpLogEntry {
            epoch: lease.epoch(),
            timestamp_millis: Utc::now().timestamp_millis(),
            payload,
        };

        let mut log = self.log.write().expect("OpLog.append() lock poison");
        let index = log.append(entry.clone())?;
        let seq = SeqNo::from_index(index);
        let _ = self.tail.send(seq);
        drop(log);

        entry.into_operation(seq)
    }

    /// Append an operation received from the primary. It must land exactly at `last + 1`;
    /// duplicates and gaps are refused.
    pub(crate) fn apply_replicated(&self, op: &Operation) -> Result<(), ApplyReplicatedError> {
        let mut log = self.log.write().expect("OpLog.apply_replicated() lock poison");

        let expected = SeqNo::from_index(log.next_index());
        if op.seq != expected {
            return Err(ApplyReplicatedError::SequenceGap {
                expected,
                received: op.seq,
            });
        }

        let index = log.append(OpLogEntry::from_operation(op))?;
        let _ = self.tail.send(SeqNo::from_index(index));

        Ok(())
    }

    /// Drop every operation after `seq`. Returns how many were dropped.
    ///
    /// Only a node that is not Primary may call this, and it must not have open readers:
    /// readers positioned past `seq` would otherwise skip re-written operations.
    pub(crate) fn truncate_after(&self, seq: SeqNo) -> Result<u64, io::Error> {
        let mut log = self.log.write().expect("OpLog.truncate_after() lock poison");

        let last = log.last_index().map(SeqNo::from_index).unwrap_or(SeqNo::ZERO);
        if seq >= last {
            return Ok(0);
        }

        // `seq < last`, so `seq + 1` is a real index.
        if let Some(first_dropped) = seq.next().to_index() {
            log.truncate(first_dropped)?;
        }
        let _ = self.tail.send(seq);

        let dropped = last.as_u64() - seq.as_u64();
        slog::warn!(
            self.logger,
            "Rolled back {} operation(s); log now ends at {:?}",
            dropped,
            seq
        );
        Ok(dropped)
    }

    pub fn last_seq(&self) -> SeqNo {
        *self.tail_rx.borrow()
    }

    /// Sequence number and epoch of the newest operation.
    pub fn last_entry(&self) -> Result<Option<(SeqNo, Epoch)>, io::Error> {
        let log = self.log.read().expect("OpLog.last_entry() lock poison");

        match log.last_index() {
            Some(index) => Ok(log.read(index)?.map(|entry| (SeqNo::from_index(index), entry.epoch))),
            None => Ok(None),
        }
    }

    /// Epoch of the operation at `seq`, or `None` if there is no such operation.
    pub fn epoch_at(&self, seq: SeqNo) -> Result<Option<Epoch>, io::Error> {
        match seq.to_index() {
            Some(index) => {
                let log = self.log.read().expect("OpLog.epoch_at() lock poison");
                Ok(log.read(index)?.map(|entry| entry.epoch))
            }
            None => Ok(None),
        }
    }

    pub fn read(&self, seq: SeqNo) -> Result<Option<Operation>, io::Error> {
        let index = match seq.to_index() {
            Some(index) => index,
            None => return Ok(None),
        };

        let entry = self.log.read().expect("OpLog.read() lock poison").read(index)?;
        match entry {
            Some(entry) => entry.into_operation(seq).map(Some),
            None => Ok(None),
        }
    }

    /// Every operation present at the time of the call, in order.
    pub fn snapshot(&self) -> Result<Vec<Operation>, io::Error> {
        let log = self.log.read().expect("OpLog.snapshot() lock poison");

        let last = log.last_index().map(SeqNo::from_index).unwrap_or(SeqNo::ZERO);
        let mut ops = Vec::with_capacity(last.as_u64() as usize);
        let mut seq = SeqNo::new(1);
        while seq <= last {
            // `seq >= 1` inside this loop.
            if let Some(index) = seq.to_index() {
                if let Some(entry) = log.read(index)? {
                    ops.push(entry.into_operation(seq)?);
                }
            }
            seq = seq.next();
        }

        Ok(ops)
    }

    /// A lazy reader that yields operations starting at `from`, then suspends until more are
    /// appended. It ends when `cancel` fires or the log is closed.
    pub fn read_from(self: &Arc<Self>, from: SeqNo, cancel: CancellationToken) -> LogReader {
        LogReader {
            log: Arc::clone(self),
            next: if from == SeqNo::ZERO { SeqNo::new(1) } else { from },
            tail: self.tail_rx.clone(),
            cancel,
        }
    }

    /// Ends every reader. Appends are still accepted; this only releases waiters.
    pub fn close(&self) {
        self.closed.cancel();
    }
}

/// LogReader walks an `OpLog` forward from a starting sequence number. It is restartable: to
/// resume elsewhere, ask the log for a new reader at `position()`.
pub struct LogReader {
    log: Arc<OpLog>,
    next: SeqNo,
    tail: watch::Receiver<SeqNo>,
    cancel: CancellationToken,
}

impl LogReader {
    /// Sequence number the next call to `next()` will return.
    pub fn position(&self) -> SeqNo {
        self.next
    }

    /// Returns the next operation, suspending while the reader is caught up.
    /// `Ok(None)` means the reader was cancelled or the log closed.
    pub async fn next(&mut self) -> Result<Option<Operation>, io::Error> {
        loop {
            if self.cancel.is_cancelled() || self.log.closed.is_cancelled() {
                return Ok(None);
            }

            if let Some(op) = self.log.read(self.next)? {
                self.next = self.next.next();
                return Ok(Some(op));
            }

            // Caught up. `changed()` resolves immediately if an append raced with the read above.
            tokio::select! {
                changed = self.tail.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                }
                _ = self.cancel.cancelled() => return Ok(None),
                _ = self.log.closed.cancelled() => return Ok(None),
            }
        }
    }
}

impl fmt::Debug for LogReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogReader").field("next", &self.next).finish()
    }
}
