// In-memory blockchain

use crate::consensus::{BlockValidator, Miner, ValidationError};
use crate::core::{Block, Hash256, Transaction};
use serde::{Deserialize, Serialize};

/// Ordered blocks starting at genesis, plus the difficulty they were mined at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    pub difficulty: usize,
}

impl Blockchain {
    /// Create a chain holding only the genesis block
    pub fn new(difficulty: usize) -> Self {
        Self {
            chain: vec![Block::genesis()],
            difficulty,
        }
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Chain tail. Only a chain received from a peer can be empty.
    pub fn last_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    fn validator(&self) -> BlockValidator {
        BlockValidator::new(self.difficulty)
    }

    /// Search nonces until the block meets this chain's difficulty
    pub fn proof_of_work(&self, block: &mut Block) -> Hash256 {
        Miner::new(self.difficulty).mine(block).hash
    }

    pub fn is_valid_proof(&self, block: &Block, hash: &Hash256) -> bool {
        self.validator().validate_proof(block, hash).is_ok()
    }

    /// Append a mined block. Rejected blocks leave the chain untouched.
    pub fn add_block(&mut self, block: Block, proof: &Hash256) -> Result<(), ValidationError> {
        let tail = self.last_block().ok_or(ValidationError::MissingGenesis)?;
        self.validator().validate_block(tail, &block, proof)?;
        self.chain.push(block);
        Ok(())
    }

    /// Build the unmined block that records `transaction` on top of the tail
    pub fn prepare_block(&self, transaction: Transaction, miner: &str, reward_rate: f64) -> Block {
        let previous = self.last_block().map(Block::hash).unwrap_or_default();
        let reward = transaction.reward(miner, reward_rate);
        Block::next(previous, transaction, reward)
    }

    /// Prepare, mine and append a block in one step
    pub fn add_new_transaction(
        &mut self,
        transaction: Transaction,
        miner: &str,
        reward_rate: f64,
    ) -> Result<Hash256, ValidationError> {
        let mut block = self.prepare_block(transaction, miner, reward_rate);
        let proof = self.proof_of_work(&mut block);
        self.add_block(block, &proof)?;
        Ok(proof)
    }

    /// Starting balance plus every transfer and reward touching `address`
    pub fn balance(&self, address: &str, initial: f64) -> f64 {
        self.chain.iter().fold(initial, |balance, block| {
            balance
                + block.transaction.delta_for(address)
                + block.transaction_reward.delta_for(address)
        })
    }

    /// Structural audit of the whole chain
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validator().validate_chain(&self.chain)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
