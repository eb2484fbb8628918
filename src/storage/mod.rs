// Chain state and mempool

mod chain;
mod chain_store;
mod mempool;

pub use chain::Blockchain;
pub use chain_store::{ChainHandle, ChainStatus, StoreClosed};
pub use mempool::{Mempool, MempoolReceiver};

use crate::consensus::ValidationError;
use crate::core::{Block, Hash256, Transaction};

/// The two chain slots a node keeps.
///
/// `primary` is what the node mines on and reports balances from. `staged`
/// holds the latest accepted network chain. Both are only ever replaced
/// wholesale; `primary` additionally grows by the blocks this node mines.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub primary: Blockchain,
    pub staged: Blockchain,
    /// Set while a received chain is being swapped in. The owning task runs
    /// one command at a time, so through a `ChainHandle` a commit never
    /// observes it set.
    pub syncing: bool,
    /// Configured difficulty; both slots always carry it
    difficulty: usize,
}

/// What happened to a chain offered by a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Adopted,
    Shorter,
    /// Mined under a different difficulty than this node runs with
    ForeignDifficulty(usize),
}

impl ChainState {
    pub fn new(difficulty: usize) -> Self {
        let chain = Blockchain::new(difficulty);
        Self {
            primary: chain.clone(),
            staged: chain,
            syncing: false,
            difficulty,
        }
    }

    /// Accept a chain from a peer when it runs at the configured difficulty
    /// and is not shorter than `staged`. On acceptance both slots end up
    /// equal to the candidate.
    pub fn offer_candidate(&mut self, candidate: Blockchain) -> CandidateOutcome {
        if candidate.difficulty != self.difficulty {
            return CandidateOutcome::ForeignDifficulty(candidate.difficulty);
        }
        if candidate.len() < self.staged.len() {
            return CandidateOutcome::Shorter;
        }
        self.syncing = true;
        self.staged = candidate;
        self.primary = self.staged.clone();
        self.syncing = false;
        CandidateOutcome::Adopted
    }

    /// Mining preamble: a staged chain at least as long as `primary` wins
    pub fn adopt_staged(&mut self) -> bool {
        if self.staged.len() >= self.primary.len() && self.staged != self.primary {
            self.primary = self.staged.clone();
            return true;
        }
        false
    }

    /// Adopt the staged chain if due, then build the next unmined block
    pub fn prepare_block(&mut self, transaction: Transaction, miner: &str, reward_rate: f64) -> Block {
        if self.adopt_staged() {
            log::info!("Replacing local blockchain with staged chain ({} blocks)", self.primary.len());
        }
        self.primary.prepare_block(transaction, miner, reward_rate)
    }

    /// Append a mined block to `primary`. Unless a sync is in progress the
    /// result is mirrored into `staged` and returned for broadcast.
    pub fn commit_block(&mut self, block: Block, proof: &Hash256) -> Result<Option<Blockchain>, ValidationError> {
        self.primary.add_block(block, proof)?;
        if self.syncing {
            return Ok(None);
        }
        self.staged = self.primary.clone();
        Ok(Some(self.primary.clone()))
    }
}
