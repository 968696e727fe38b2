// Proof of Work implementation

use crate::core::{Block, Hash256, sha256};
use crate::error::{LedgerError, Result};
use std::time::{Duration, Instant};

/// How often the search polls its stop condition
const STOP_CHECK_INTERVAL: u64 = 1024;

/// Number of leading zero hex digits a proof digest must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Difficulty(u32);

impl Difficulty {
    /// SHA256 hex digest has 64 digits
    pub const MAX: u32 = 64;

    pub fn new(zeros: u32) -> Result<Self> {
        if zeros > Self::MAX {
            return Err(LedgerError::Config(format!(
                "difficulty {} exceeds maximum of {}",
                zeros,
                Self::MAX
            )));
        }
        Ok(Self(zeros))
    }

    /// Accepts every candidate
    pub fn trivial() -> Self {
        Self(0)
    }

    pub fn zeros(&self) -> u32 {
        self.0
    }

    /// Check if a digest meets this difficulty
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        hash.leading_zero_nibbles() >= self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self(4)
    }
}

/// Digest binding a candidate proof to the previous block's proof
pub fn proof_digest(last_proof: u64, proof: u64) -> Hash256 {
    let guess = format!("{}{}", last_proof, proof);
    sha256(guess.as_bytes())
}

/// Proof of Work engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofOfWork {
    pub difficulty: Difficulty,
}

impl ProofOfWork {
    pub fn new(difficulty: Difficulty) -> Self {
        Self { difficulty }
    }

    /// Check that `proof` is valid relative to `last_proof`
    pub fn is_valid(&self, last_proof: u64, proof: u64) -> bool {
        self.difficulty.is_met_by(&proof_digest(last_proof, proof))
    }

    /// Scan proofs upward from 0 until one is valid
    ///
    /// `should_stop` is polled every few thousand attempts; returning true
    /// abandons the search and yields `None`.
    pub fn mine(&self, last_proof: u64, should_stop: &dyn Fn() -> bool) -> Option<MiningResult> {
        let start_time = Instant::now();
        let mut attempts = 0u64;

        for proof in 0..=u64::MAX {
            if attempts % STOP_CHECK_INTERVAL == 0 && should_stop() {
                log::debug!("Proof search stopped after {} attempts", attempts);
                return None;
            }

            let hash = proof_digest(last_proof, proof);
            attempts += 1;

            if self.difficulty.is_met_by(&hash) {
                return Some(MiningResult {
                    proof,
                    hash,
                    attempts,
                    duration: start_time.elapsed(),
                });
            }

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!("Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }

        None
    }

    /// Find the proof for the block after `last_block`, without a stop condition
    pub fn proof_of_work(&self, last_block: &Block) -> Option<u64> {
        self.mine(last_block.proof, &|| false).map(|result| result.proof)
    }
}

/// Mining result
#[derive(Debug, Clone)]
pub struct MiningResult {
    /// The first proof that satisfied the difficulty
    pub proof: u64,
    /// Digest of (last_proof, proof)
    pub hash: Hash256,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return self.attempts as f64;
        }
        self.attempts as f64 / secs
    }
}
