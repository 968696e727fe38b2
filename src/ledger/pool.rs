// Pending transaction pool

use crate::consensus::TransactionRule;
use crate::core::Transaction;
use std::sync::Arc;

/// FIFO queue of transactions waiting for the next block
pub struct TransactionPool {
    pending: Vec<Transaction>,
    rules: Arc<dyn TransactionRule>,
}

impl TransactionPool {
    pub fn new(rules: Arc<dyn TransactionRule>) -> Self {
        Self {
            pending: Vec::new(),
            rules,
        }
    }

    /// Queue a transaction in admission order
    pub fn push(&mut self, tx: Transaction) {
        self.pending.push(tx);
    }

    /// True if at least one pending transaction passes the rules
    pub fn validate(&self) -> bool {
        self.pending.iter().any(|tx| match self.rules.check(tx) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Pending transaction from {:?} rejected: {}", tx.sender, e);
                false
            }
        })
    }

    /// Remove and return every pending transaction
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
