// Local chain and transaction pool

mod chain;
mod pool;

pub use chain::Chain;
pub use pool::TransactionPool;

use crate::consensus::TransactionRule;
use crate::core::{Block, Hash256, Transaction, unix_now};
use crate::error::{LedgerError, Result};
use std::sync::Arc;

/// Chain and pool, mutated together so that draining the pool and appending
/// a block happen as one step
pub struct Ledger {
    chain: Chain,
    pool: TransactionPool,
}

impl Ledger {
    pub fn new(rules: Arc<dyn TransactionRule>) -> Self {
        Self {
            chain: Chain::new(),
            pool: TransactionPool::new(rules),
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    /// Queue a transaction; returns the index of the block it will land in
    pub fn submit(&mut self, tx: Transaction) -> u64 {
        self.pool.push(tx);
        self.chain.next_index()
    }

    /// Forge the next block from the whole pool.
    ///
    /// `previous_hash` must be the hash of the current tip; otherwise the
    /// proof was computed against a block that is no longer last and
    /// `StaleTip` is returned with nothing mutated.
    pub fn new_block(&mut self, proof: u64, previous_hash: Hash256) -> Result<Block> {
        if previous_hash != self.chain.last_block().hash() {
            return Err(LedgerError::StaleTip);
        }

        let block = Block::new(
            self.chain.next_index(),
            unix_now(),
            self.pool.drain(),
            proof,
            previous_hash,
        );
        self.chain.push(block.clone());

        Ok(block)
    }

    /// Replace the chain wholesale; the pool is left as is
    pub fn replace_chain(&mut self, chain: Chain) {
        self.chain.replace(chain);
    }
}
