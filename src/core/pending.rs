//! The pending-operation queue: mutations admitted by the event actor and
//! waiting for their log slot to commit.
//!
//! This is the only structure the two tracker actors share. The event
//! actor pushes admitted operations and sweeps the queue after every
//! commit; the proposer actor peeks at the head when it needs a value for
//! the slot it is running. A plain mutex is enough: every touch is a short
//! push, peek or scan.
use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::oneshot;

use super::error::Error;
use crate::shared::rpc::messages::Operation;

/// The channel on which an admitted caller eventually learns its fate.
pub type UpdateTx = oneshot::Sender<Result<(), Error>>;

struct PendingOp {
    op: Operation,
    reply: UpdateTx,
}

/// Queue of admitted-but-uncommitted mutations.
#[derive(Default)]
pub struct PendingQueue {
    inner: Mutex<VecDeque<PendingOp>>,
}

impl PendingQueue {
    pub fn push(&self, op: Operation, reply: UpdateTx) {
        self.inner
            .lock()
            .expect("pending queue lock poisoned")
            .push_back(PendingOp { op, reply });
    }

    /// The operation the proposer should put in the next slot, if any.
    #[must_use]
    pub fn head(&self) -> Option<Operation> {
        self.inner
            .lock()
            .expect("pending queue lock poisoned")
            .front()
            .map(|pending| pending.op.clone())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("pending queue lock poisoned").is_empty()
    }

    /// Settles every queued entry the committed operation satisfies,
    /// answering `Ok` on its reply channel. The committed value may have
    /// been proposed by another replica; entries that do not match stay
    /// queued for a later slot. Returns how many entries were settled.
    pub fn sweep(&self, committed: &Operation) -> usize {
        let mut queue = self.inner.lock().expect("pending queue lock poisoned");
        let mut kept = VecDeque::with_capacity(queue.len());
        let mut settled = 0;
        while let Some(pending) = queue.pop_front() {
            if settles(&pending.op, committed) {
                // The caller may have hung up; that only means nobody is
                // waiting for the answer any more.
                let _ = pending.reply.send(Ok(()));
                settled += 1;
            } else {
                kept.push_back(pending);
            }
        }
        *queue = kept;
        settled
    }
}

/// Whether a committed operation satisfies a pending one. Ownership
/// changes must match on chunk and peer; creates match on the torrent
/// identity.
fn settles(pending: &Operation, committed: &Operation) -> bool {
    match (pending, committed) {
        (
            Operation::Add { chunk: pc, peer: pp },
            Operation::Add { chunk: cc, peer: cp },
        )
        | (
            Operation::Delete { chunk: pc, peer: pp },
            Operation::Delete { chunk: cc, peer: cp },
        ) => pc == cc && pp == cp,
        (Operation::Create { metainfo: pm }, Operation::Create { metainfo: cm }) => pm.id == cm.id,
        _ => false,
    }
}
