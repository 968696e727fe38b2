// Append-only block sequence

use crate::consensus::ChainValidator;
use crate::core::Block;
use crate::error::Result;

/// The local chain. Always holds at least the genesis block.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    /// Start a fresh chain at a new genesis block
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
        }
    }

    /// Adopt an existing block sequence after validating it
    pub fn from_blocks(blocks: Vec<Block>, validator: &ChainValidator) -> Result<Self> {
        validator.validate_chain(&blocks)?;
        Ok(Self { blocks })
    }

    pub fn last_block(&self) -> &Block {
        // genesis is never removed
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Index the next forged block will carry
    pub fn next_index(&self) -> u64 {
        self.last_block().index + 1
    }

    /// Append a block already known to link to the tip
    pub(crate) fn push(&mut self, block: Block) {
        debug_assert_eq!(block.index, self.next_index());
        debug_assert_eq!(block.previous_hash, self.last_block().hash());
        self.blocks.push(block);
    }

    /// Swap in a validated replacement chain
    pub(crate) fn replace(&mut self, chain: Chain) {
        self.blocks = chain.blocks;
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{Difficulty, ProofOfWork};
    use crate::core::Hash256;
    use crate::error::{IntegrityKind, LedgerError};

    #[test]
    fn test_new_chain_has_genesis() {
        let chain = Chain::new();
        assert_eq!(chain.len(), 1);
        assert!(chain.last_block().is_genesis());
        assert_eq!(chain.next_index(), 2);
    }

    #[test]
    fn test_from_blocks_validates() {
        let validator = ChainValidator::new(ProofOfWork::new(Difficulty::trivial()));
        let genesis = Block::genesis();
        let next = Block::new(2, 0, Vec::new(), 0, genesis.hash());
        let chain = Chain::from_blocks(vec![genesis.clone(), next], &validator).unwrap();
        assert_eq!(chain.len(), 2);

        let orphan = Block::new(2, 0, Vec::new(), 0, Hash256::new([9; 32]));
        match Chain::from_blocks(vec![genesis, orphan], &validator) {
            Err(LedgerError::ChainIntegrity(e)) => assert_eq!(e.kind, IntegrityKind::BrokenLink),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_from_blocks_rejects_empty() {
        let validator = ChainValidator::default();
        assert!(Chain::from_blocks(Vec::new(), &validator).is_err());
    }
}
