// Proof of Work implementation

use crate::core::{Block, Hash256};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Proof of Work miner
///
/// A hash satisfies the puzzle when its hex form starts with `difficulty`
/// zero characters.
#[derive(Debug, Clone)]
pub struct Miner {
    /// Required number of leading hex zeros
    pub difficulty: usize,
    /// Checked between nonce increments; set it to abandon a search
    stop: Arc<AtomicBool>,
}

impl Miner {
    /// Create a new miner with fixed difficulty
    pub fn new(difficulty: usize) -> Self {
        Self::with_stop_flag(difficulty, Arc::new(AtomicBool::new(false)))
    }

    /// Create a miner sharing an external stop flag
    pub fn with_stop_flag(difficulty: usize, stop: Arc<AtomicBool>) -> Self {
        Self { difficulty, stop }
    }

    /// Ask any search in progress to give up
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Increment the nonce from 0 until the block hash meets the difficulty.
    /// Returns with `success == false` only when stopped.
    pub fn mine(&self, block: &mut Block) -> MiningResult {
        let start_time = Instant::now();
        let mut attempts = 0u64;

        block.nonce = 0;
        loop {
            if self.is_stopped() {
                return MiningResult {
                    success: false,
                    nonce: block.nonce,
                    hash: Hash256::zero(),
                    attempts,
                    duration: start_time.elapsed(),
                };
            }

            let hash = block.hash();
            attempts += 1;

            if self.meets_difficulty(&hash) {
                return MiningResult {
                    success: true,
                    nonce: block.nonce,
                    hash,
                    attempts,
                    duration: start_time.elapsed(),
                };
            }

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!("Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }

            block.nonce = block.nonce.wrapping_add(1);
        }
    }

    /// Check the leading-zero prefix only
    #[inline]
    pub fn meets_difficulty(&self, hash: &Hash256) -> bool {
        hash.leading_zero_digits() >= self.difficulty
    }

    /// `hash` must be the block's actual hash and satisfy the difficulty
    pub fn is_valid_proof(&self, block: &Block, hash: &Hash256) -> bool {
        self.meets_difficulty(hash) && *hash == block.hash()
    }
}

/// Mining result
#[derive(Debug)]
pub struct MiningResult {
    /// Whether mining succeeded
    pub success: bool,
    /// The nonce that was found
    pub nonce: u64,
    /// The resulting hash
    pub hash: Hash256,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64()
    }
}
