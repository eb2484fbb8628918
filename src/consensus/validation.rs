// Block and chain validation

use crate::core::{Block, Hash256};
use crate::consensus::pow::Miner;

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Block does not link to the current chain tail
    InvalidPreviousHash { expected: Hash256, found: Hash256 },
    /// Hash lacks the required leading zeros
    InvalidProofOfWork,
    /// Claimed proof is not the block's hash
    HashMismatch,
    /// Chain does not start with a genesis block
    MissingGenesis,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ValidationError::InvalidPreviousHash { expected, found } => {
                write!(f, "Previous hash mismatch: expected {}, found {}", expected, found)
            }
            ValidationError::InvalidProofOfWork => write!(f, "Invalid proof of work"),
            ValidationError::HashMismatch => write!(f, "Proof does not match block hash"),
            ValidationError::MissingGenesis => write!(f, "Chain has no genesis block"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Block validator
#[derive(Debug, Clone)]
pub struct BlockValidator {
    /// PoW miner for verification
    miner: Miner,
}

impl BlockValidator {
    /// Create a new block validator with fixed difficulty
    pub fn new(difficulty: usize) -> Self {
        Self {
            miner: Miner::new(difficulty),
        }
    }

    /// Validate a block about to be appended after `tail` with claimed `proof`
    pub fn validate_block(&self, tail: &Block, block: &Block, proof: &Hash256) -> Result<(), ValidationError> {
        let expected = tail.hash();
        if block.previous_block_hash != expected {
            return Err(ValidationError::InvalidPreviousHash {
                expected,
                found: block.previous_block_hash,
            });
        }
        self.validate_proof(block, proof)
    }

    /// Validate a claimed proof for a block
    pub fn validate_proof(&self, block: &Block, proof: &Hash256) -> Result<(), ValidationError> {
        if !self.miner.meets_difficulty(proof) {
            return Err(ValidationError::InvalidProofOfWork);
        }
        if !self.miner.is_valid_proof(block, proof) {
            return Err(ValidationError::HashMismatch);
        }
        Ok(())
    }

    /// Audit a whole chain: genesis first, every later block linked to its
    /// predecessor and carrying a valid proof.
    pub fn validate_chain(&self, chain: &[Block]) -> Result<(), ValidationError> {
        let Some(first) = chain.first() else {
            return Err(ValidationError::MissingGenesis);
        };
        if !first.is_genesis() {
            return Err(ValidationError::MissingGenesis);
        }

        for pair in chain.windows(2) {
            let (tail, block) = (&pair[0], &pair[1]);
            self.validate_block(tail, block, &block.hash())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    fn mined_after(tail: &Block, difficulty: usize) -> (Block, Hash256) {
        let mut block = Block::new(
            1.0,
            Transaction::new(10.0, "a", "b"),
            Transaction::new(1.0, "a", "m"),
            tail.hash(),
        );
        let result = Miner::new(difficulty).mine(&mut block);
        (block, result.hash)
    }

    #[test]
    fn test_validate_linked_block() {
        let validator = BlockValidator::new(2);
        let genesis = Block::genesis();
        let (block, proof) = mined_after(&genesis, 2);

        assert!(validator.validate_block(&genesis, &block, &proof).is_ok());
    }

    #[test]
    fn test_reject_wrong_previous_hash() {
        let validator = BlockValidator::new(2);
        let genesis = Block::genesis();
        let (block, proof) = mined_after(&genesis, 2);

        let other_tail = block.clone();
        assert!(matches!(
            validator.validate_block(&other_tail, &block, &proof),
            Err(ValidationError::InvalidPreviousHash { .. })
        ));
    }

    #[test]
    fn test_reject_unmined_block() {
        let validator = BlockValidator::new(64);
        let genesis = Block::genesis();
        let block = Block::new(
            1.0,
            Transaction::new(10.0, "a", "b"),
            Transaction::new(1.0, "a", "m"),
            genesis.hash(),
        );

        assert_eq!(
            validator.validate_block(&genesis, &block, &block.hash()),
            Err(ValidationError::InvalidProofOfWork)
        );
    }

    #[test]
    fn test_reject_forged_proof() {
        let validator = BlockValidator::new(1);
        let genesis = Block::genesis();
        let (block, _) = mined_after(&genesis, 1);

        assert_eq!(
            validator.validate_proof(&block, &Hash256::zero()),
            Err(ValidationError::HashMismatch)
        );
    }

    #[test]
    fn test_validate_chain() {
        let validator = BlockValidator::new(2);
        let genesis = Block::genesis();
        let (b1, _) = mined_after(&genesis, 2);
        let (b2, _) = mined_after(&b1, 2);

        assert!(validator.validate_chain(&[genesis.clone(), b1.clone(), b2.clone()]).is_ok());
        assert_eq!(validator.validate_chain(&[]), Err(ValidationError::MissingGenesis));
        assert_eq!(validator.validate_chain(&[b1.clone(), b2.clone()]), Err(ValidationError::MissingGenesis));
        assert!(validator.validate_chain(&[genesis, b2, b1]).is_err());
    }
}
