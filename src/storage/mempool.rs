// Pending transaction queue

use crate::core::Transaction;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Producer side of the mempool. Cheap to clone; every connection handler
/// and the submit path hold one. Unbounded, no backpressure.
#[derive(Debug, Clone)]
pub struct Mempool {
    sender: mpsc::UnboundedSender<Transaction>,
    pending: Arc<AtomicUsize>,
}

/// Consumer side, owned by the mining worker
#[derive(Debug)]
pub struct MempoolReceiver {
    receiver: mpsc::UnboundedReceiver<Transaction>,
    pending: Arc<AtomicUsize>,
}

impl Mempool {
    pub fn new() -> (Mempool, MempoolReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        (
            Mempool { sender, pending: pending.clone() },
            MempoolReceiver { receiver, pending },
        )
    }

    /// Queue a transaction. Returns false once the miner has gone away.
    pub fn push(&self, transaction: Transaction) -> bool {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(transaction).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Transactions queued but not yet picked up by the miner
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MempoolReceiver {
    /// Wait for the next transaction; `None` when every producer is gone
    pub async fn recv(&mut self) -> Option<Transaction> {
        let transaction = self.receiver.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(transaction)
    }
}
