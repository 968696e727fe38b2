// Longest-valid-chain conflict resolution

use crate::consensus::validation::ChainValidator;
use crate::core::Block;
use crate::error::{IntegrityError, IntegrityKind, LedgerError, Result};
use crate::network::PeerAddress;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// A peer's chain as reported over the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    /// Length the peer claims
    pub length: u64,
    pub chain: Vec<Block>,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<Block>) -> Self {
        Self {
            length: chain.len() as u64,
            chain,
        }
    }
}

/// Fetches a peer's chain over some transport
pub trait ChainSource: Send + Sync + 'static {
    fn fetch_chain(&self, peer: &PeerAddress) -> impl Future<Output = Result<ChainSnapshot>> + Send;
}

/// A peer chain that passed validation and is longer than the local chain
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Registration order of the peer, used to break ties
    pub position: usize,
    pub peer: PeerAddress,
    pub chain: Vec<Block>,
}

/// Fetches peer chains concurrently and keeps only valid, longer ones
pub struct ConsensusResolver<S> {
    source: Arc<S>,
    validator: ChainValidator,
    peer_timeout: Duration,
}

impl<S: ChainSource> ConsensusResolver<S> {
    pub fn new(source: S, validator: ChainValidator, peer_timeout: Duration) -> Self {
        Self {
            source: Arc::new(source),
            validator,
            peer_timeout,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Check a snapshot's self-consistency and chain integrity
    pub fn check_snapshot(validator: &ChainValidator, snapshot: &ChainSnapshot) -> std::result::Result<(), IntegrityError> {
        if snapshot.length != snapshot.chain.len() as u64 {
            return Err(IntegrityError::new(snapshot.length, IntegrityKind::LengthMismatch));
        }
        validator.validate_chain(&snapshot.chain)
    }

    /// Fetch every peer's chain with a per-peer timeout. Unreachable peers and
    /// invalid chains are skipped; results come back in registration order.
    pub async fn gather(&self, peers: &[PeerAddress], local_len: usize) -> Vec<Candidate> {
        let mut tasks = JoinSet::new();

        for (position, peer) in peers.iter().cloned().enumerate() {
            let source = Arc::clone(&self.source);
            let validator = self.validator;
            let timeout = self.peer_timeout;

            tasks.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, source.fetch_chain(&peer)).await {
                    Ok(fetched) => fetched,
                    Err(_) => Err(LedgerError::PeerUnreachable {
                        peer: peer.to_string(),
                        reason: format!("no response within {:?}", timeout),
                    }),
                };

                let outcome = outcome.and_then(|snapshot| {
                    if snapshot.chain.len() <= local_len {
                        return Ok(None);
                    }
                    Self::check_snapshot(&validator, &snapshot)?;
                    Ok(Some(snapshot.chain))
                });

                (position, peer, outcome)
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (position, peer, outcome) = match joined {
                Ok(result) => result,
                Err(e) => {
                    log::error!("Peer fetch task failed: {}", e);
                    continue;
                }
            };

            match outcome {
                Ok(Some(chain)) => {
                    log::debug!("Peer {} offers valid chain of length {}", peer, chain.len());
                    candidates.push(Candidate { position, peer, chain });
                }
                Ok(None) => log::debug!("Peer {} chain is not longer than ours", peer),
                Err(LedgerError::ChainIntegrity(e)) => {
                    log::warn!("Rejecting chain from {}: {}", peer, e);
                }
                Err(e) => log::warn!("Skipping peer {}: {}", peer, e),
            }
        }

        candidates.sort_by_key(|c| c.position);
        candidates
    }
}

/// Longest candidate strictly longer than `local_len`; the earliest wins ties
pub fn select_longest(candidates: Vec<Candidate>, local_len: usize) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        let best_len = best.as_ref().map_or(local_len, |b| b.chain.len());
        if candidate.chain.len() > best_len {
            best = Some(candidate);
        }
    }
    best
}
