// Block data structure

use crate::core::{Hash256, sha256, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

/// Block - one transaction plus the reward its miner collected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Unix time in seconds when the block was assembled
    pub timestamp: f64,
    /// The transfer recorded by this block
    pub transaction: Transaction,
    /// Reward paid by the transfer's payer to the miner
    pub transaction_reward: Transaction,
    /// Hash of the previous block (zero for genesis)
    pub previous_block_hash: Hash256,
    /// Nonce for proof-of-work
    pub nonce: u64,
}

impl Block {
    /// Create a new, unmined block
    pub fn new(
        timestamp: f64,
        transaction: Transaction,
        transaction_reward: Transaction,
        previous_block_hash: Hash256,
    ) -> Self {
        Self {
            timestamp,
            transaction,
            transaction_reward,
            previous_block_hash,
            nonce: 0,
        }
    }

    /// Create an unmined block stamped with the current time
    pub fn next(previous_block_hash: Hash256, transaction: Transaction, transaction_reward: Transaction) -> Self {
        Self::new(now_secs(), transaction, transaction_reward, previous_block_hash)
    }

    /// Create the genesis block. Every node builds the identical block.
    pub fn genesis() -> Self {
        Self::new(
            0.0,
            Transaction::new(0.0, "Genesis", "Creator"),
            Transaction::new(0.0, "0", "0"),
            Hash256::zero(),
        )
    }

    /// Canonical form used for hashing: a JSON object with sorted keys.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // serde_json::Value keeps object keys sorted
        let value = json!({
            "nonce": self.nonce,
            "previous_block_hash": self.previous_block_hash.to_hex(),
            "timestamp": self.timestamp,
            "transaction": canonical_tx(&self.transaction),
            "transaction_reward": canonical_tx(&self.transaction_reward),
        });
        value.to_string().into_bytes()
    }

    /// SHA-256 of the canonical serialization
    pub fn hash(&self) -> Hash256 {
        sha256(&self.canonical_bytes())
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.previous_block_hash.is_zero()
    }
}

fn canonical_tx(tx: &Transaction) -> serde_json::Value {
    json!({
        "amount": tx.amount,
        "payee": tx.payee,
        "payer": tx.payer,
    })
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
