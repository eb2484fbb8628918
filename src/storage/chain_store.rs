// Owner task for a node's chain state

use super::{Blockchain, CandidateOutcome, ChainState};
use crate::consensus::ValidationError;
use crate::core::{Block, Hash256, Transaction};
use tokio::sync::{mpsc, oneshot};

/// The chain task has stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreClosed;

impl std::fmt::Display for StoreClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Chain store is no longer running")
    }
}

impl std::error::Error for StoreClosed {}

/// Summary of the chain slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStatus {
    pub primary_len: usize,
    pub staged_len: usize,
    pub syncing: bool,
}

enum ChainCommand {
    Balance {
        address: String,
        initial: f64,
        reply: oneshot::Sender<f64>,
    },
    Snapshot {
        reply: oneshot::Sender<Blockchain>,
    },
    Status {
        reply: oneshot::Sender<ChainStatus>,
    },
    OfferCandidate {
        candidate: Blockchain,
        reply: oneshot::Sender<CandidateOutcome>,
    },
    PrepareBlock {
        transaction: Transaction,
        miner: String,
        reward_rate: f64,
        reply: oneshot::Sender<Block>,
    },
    CommitBlock {
        block: Block,
        proof: Hash256,
        reply: oneshot::Sender<Result<Option<Blockchain>, ValidationError>>,
    },
}

/// Handle to the task that owns a [`ChainState`]. All reads and writes go
/// through it, so chain mutations are serialized.
#[derive(Debug, Clone)]
pub struct ChainHandle {
    sender: mpsc::Sender<ChainCommand>,
}

impl std::fmt::Debug for ChainCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ChainCommand::Balance { .. } => "Balance",
            ChainCommand::Snapshot { .. } => "Snapshot",
            ChainCommand::Status { .. } => "Status",
            ChainCommand::OfferCandidate { .. } => "OfferCandidate",
            ChainCommand::PrepareBlock { .. } => "PrepareBlock",
            ChainCommand::CommitBlock { .. } => "CommitBlock",
        };
        f.write_str(name)
    }
}

impl ChainHandle {
    /// Spawn the owner task on the current runtime
    pub fn spawn(state: ChainState) -> Self {
        let (sender, receiver) = mpsc::channel(64);
        tokio::spawn(run(state, receiver));
        Self { sender }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ChainCommand) -> Result<T, StoreClosed> {
        let (reply, response) = oneshot::channel();
        self.sender.send(build(reply)).await.map_err(|_| StoreClosed)?;
        response.await.map_err(|_| StoreClosed)
    }

    pub async fn balance(&self, address: &str, initial: f64) -> Result<f64, StoreClosed> {
        let address = address.to_string();
        self.request(|reply| ChainCommand::Balance { address, initial, reply }).await
    }

    /// Copy of the primary chain
    pub async fn snapshot(&self) -> Result<Blockchain, StoreClosed> {
        self.request(|reply| ChainCommand::Snapshot { reply }).await
    }

    pub async fn status(&self) -> Result<ChainStatus, StoreClosed> {
        self.request(|reply| ChainCommand::Status { reply }).await
    }

    /// Offer a peer's chain for adoption
    pub async fn offer_candidate(&self, candidate: Blockchain) -> Result<CandidateOutcome, StoreClosed> {
        self.request(|reply| ChainCommand::OfferCandidate { candidate, reply }).await
    }

    pub async fn prepare_block(
        &self,
        transaction: Transaction,
        miner: &str,
        reward_rate: f64,
    ) -> Result<Block, StoreClosed> {
        let miner = miner.to_string();
        self.request(|reply| ChainCommand::PrepareBlock { transaction, miner, reward_rate, reply })
            .await
    }

    pub async fn commit_block(
        &self,
        block: Block,
        proof: Hash256,
    ) -> Result<Result<Option<Blockchain>, ValidationError>, StoreClosed> {
        self.request(|reply| ChainCommand::CommitBlock { block, proof, reply }).await
    }
}

async fn run(mut state: ChainState, mut receiver: mpsc::Receiver<ChainCommand>) {
    while let Some(command) = receiver.recv().await {
        log::trace!("Chain command: {:?}", command);
        // A dropped reply receiver only means the caller stopped waiting
        match command {
            ChainCommand::Balance { address, initial, reply } => {
                let _ = reply.send(state.primary.balance(&address, initial));
            }
            ChainCommand::Snapshot { reply } => {
                let _ = reply.send(state.primary.clone());
            }
            ChainCommand::Status { reply } => {
                let _ = reply.send(ChainStatus {
                    primary_len: state.primary.len(),
                    staged_len: state.staged.len(),
                    syncing: state.syncing,
                });
            }
            ChainCommand::OfferCandidate { candidate, reply } => {
                let _ = reply.send(state.offer_candidate(candidate));
            }
            ChainCommand::PrepareBlock { transaction, miner, reward_rate, reply } => {
                let _ = reply.send(state.prepare_block(transaction, &miner, reward_rate));
            }
            ChainCommand::CommitBlock { block, proof, reply } => {
                let _ = reply.send(state.commit_block(block, &proof));
            }
        }
    }
    log::debug!("Chain store stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_round_trip() {
        let handle = ChainHandle::spawn(ChainState::new(1));

        let status = handle.status().await.unwrap();
        assert_eq!(status.primary_len, 1);
        assert!(!status.syncing);

        let mut block = handle
            .prepare_block(Transaction::new(100.0, "a", "b"), "b", 0.1)
            .await
            .unwrap();
        let proof = handle.snapshot().await.unwrap().proof_of_work(&mut block);

        let broadcast = handle.commit_block(block, proof).await.unwrap().unwrap();
        assert_eq!(broadcast.map(|c| c.len()), Some(2));

        assert_eq!(handle.balance("a", 1000.0).await.unwrap(), 890.0);
        assert_eq!(handle.balance("b", 1000.0).await.unwrap(), 1110.0);
    }

    #[tokio::test]
    async fn test_offer_through_handle() {
        let handle = ChainHandle::spawn(ChainState::new(1));
        let mut longer = Blockchain::new(1);
        longer.add_new_transaction(Transaction::new(1.0, "a", "b"), "m", 0.1).unwrap();

        assert_eq!(handle.offer_candidate(longer.clone()).await.unwrap(), CandidateOutcome::Adopted);
        assert_eq!(handle.offer_candidate(Blockchain::new(1)).await.unwrap(), CandidateOutcome::Shorter);
        assert_eq!(
            handle.offer_candidate(Blockchain::new(5)).await.unwrap(),
            CandidateOutcome::ForeignDifficulty(5)
        );
        assert_eq!(handle.snapshot().await.unwrap(), longer);
    }
}
