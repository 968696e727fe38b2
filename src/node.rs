// Ledger node - owns the chain, pool and peer registry

use crate::config::NodeConfig;
use crate::consensus::{
    ChainSource, ChainValidator, ConsensusResolver, ProofOfWork, RuleSet, TransactionRule,
    WellFormedRule, select_longest,
};
use crate::core::{Block, Credential, Transaction};
use crate::error::{LedgerError, Result};
use crate::ledger::{Chain, Ledger};
use crate::network::{NodeRegistry, PeerAddress, TcpChainSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

/// One ledger node.
///
/// Every operation takes `&self`; the chain and pool sit behind a single
/// lock so that mining and chain replacement never interleave.
pub struct Node<S = TcpChainSource> {
    id: String,
    ledger: Mutex<Ledger>,
    registry: RwLock<NodeRegistry>,
    pow: ProofOfWork,
    validator: ChainValidator,
    resolver: ConsensusResolver<S>,
    /// Bumped whenever the chain tip changes
    epoch: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl<S: ChainSource> Node<S> {
    /// Create a node at a fresh genesis block with the standard rule set
    pub fn new(config: &NodeConfig, source: S) -> Result<Self> {
        let rules = RuleSet::standard(config.require_signatures);
        Self::with_rules(config, Arc::new(rules), source)
    }

    /// Create a node with a caller-supplied transaction validity rule
    pub fn with_rules(config: &NodeConfig, rules: Arc<dyn TransactionRule>, source: S) -> Result<Self> {
        config.validate()?;

        let pow = ProofOfWork::new(config.difficulty()?);
        let validator = ChainValidator::new(pow);
        let id = hex::encode(rand::random::<[u8; 16]>());

        log::info!("Node {} starting (difficulty {})", id, pow.difficulty.zeros());

        Ok(Self {
            id,
            ledger: Mutex::new(Ledger::new(rules)),
            registry: RwLock::new(NodeRegistry::new()),
            pow,
            validator,
            resolver: ConsensusResolver::new(source, validator, config.peer_timeout()),
            epoch: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn validator(&self) -> &ChainValidator {
        &self.validator
    }

    /// Replace the chain with a previously stored one, regardless of length
    pub async fn restore_chain(&self, blocks: Vec<Block>) -> Result<()> {
        let chain = Chain::from_blocks(blocks, &self.validator)?;
        let mut ledger = self.ledger.lock().await;
        log::info!("Restored chain of length {}", chain.len());
        ledger.replace_chain(chain);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Queue a transaction; returns the index of the block it will land in
    pub async fn submit_transaction(
        &self,
        sender: &str,
        recipient: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<u64> {
        self.submit(Transaction::new(sender, recipient, payload)).await
    }

    /// Queue a transaction carrying a signing credential
    pub async fn submit_signed(
        &self,
        sender: &str,
        recipient: &str,
        payload: impl Into<Vec<u8>>,
        credential: Credential,
    ) -> Result<u64> {
        self.submit(Transaction::new(sender, recipient, payload).with_credential(credential))
            .await
    }

    /// Queue an already built transaction
    pub async fn submit(&self, tx: Transaction) -> Result<u64> {
        // required fields are checked here, before the pool sees the transaction
        WellFormedRule.check(&tx)?;

        let index = self.ledger.lock().await.submit(tx);
        log::debug!("Transaction queued for block {}", index);
        Ok(index)
    }

    /// True if the pool holds at least one valid transaction
    pub async fn validate_pool(&self) -> bool {
        self.ledger.lock().await.pool().validate()
    }

    pub async fn pending_transactions(&self) -> Vec<Transaction> {
        self.ledger.lock().await.pool().pending().to_vec()
    }

    pub async fn last_block(&self) -> Block {
        self.ledger.lock().await.chain().last_block().clone()
    }

    /// Copy of the full chain, genesis first
    pub async fn chain(&self) -> Vec<Block> {
        self.ledger.lock().await.chain().blocks().to_vec()
    }

    pub async fn chain_len(&self) -> usize {
        self.ledger.lock().await.chain().len()
    }

    /// Mine the pending transactions into a new block.
    ///
    /// The proof search runs on a blocking thread without holding the ledger
    /// lock. If the tip changes meanwhile the search is abandoned and
    /// restarted against the new tip.
    pub async fn mine(&self) -> Result<Block> {
        loop {
            let (last_proof, previous_hash, epoch) = {
                let ledger = self.ledger.lock().await;
                if !ledger.pool().validate() {
                    return Err(LedgerError::PoolEmptyOrInvalid);
                }
                let last = ledger.chain().last_block();
                (last.proof, last.hash(), self.epoch.load(Ordering::Acquire))
            };

            let pow = self.pow;
            let current_epoch = Arc::clone(&self.epoch);
            let shutdown = Arc::clone(&self.shutdown);
            let search = tokio::task::spawn_blocking(move || {
                pow.mine(last_proof, &|| {
                    shutdown.load(Ordering::Relaxed)
                        || current_epoch.load(Ordering::Acquire) != epoch
                })
            });

            let result = match search.await {
                Ok(result) => result,
                Err(e) => {
                    log::error!("Proof search task failed: {}", e);
                    return Err(LedgerError::MiningCancelled);
                }
            };

            let Some(result) = result else {
                if self.shutdown.load(Ordering::Relaxed) {
                    return Err(LedgerError::MiningCancelled);
                }
                log::debug!("Chain advanced during proof search, retrying");
                continue;
            };

            log::info!(
                "Found proof {} in {} attempts ({:.0} H/s)",
                result.proof,
                result.attempts,
                result.hash_rate()
            );

            let mut ledger = self.ledger.lock().await;
            match ledger.new_block(result.proof, previous_hash) {
                Ok(block) => {
                    self.epoch.fetch_add(1, Ordering::AcqRel);
                    log::info!(
                        "Forged block {} with {} transactions",
                        block.index,
                        block.transactions.len()
                    );
                    return Ok(block);
                }
                Err(LedgerError::StaleTip) => {
                    log::debug!("Discarding stale proof {}", result.proof);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Register a peer. Duplicate registration is a no-op.
    pub async fn register_node(&self, address: &str) -> Result<()> {
        self.registry.write().await.register(address)?;
        Ok(())
    }

    pub async fn peers(&self) -> Vec<PeerAddress> {
        self.registry.read().await.peers()
    }

    /// Adopt the longest valid peer chain if it is strictly longer than ours.
    /// Returns true if the local chain was replaced.
    pub async fn resolve_conflicts(&self) -> bool {
        let peers = self.peers().await;
        if peers.is_empty() {
            return false;
        }

        let local_len = self.chain_len().await;
        let candidates = self.resolver.gather(&peers, local_len).await;

        // compare against the chain as it is now, not as it was before fetching
        let mut ledger = self.ledger.lock().await;
        let current_len = ledger.chain().len();

        match select_longest(candidates, current_len) {
            Some(winner) => {
                log::info!(
                    "Replacing chain of length {} with {}'s chain of length {}",
                    current_len,
                    winner.peer,
                    winner.chain.len()
                );
                match Chain::from_blocks(winner.chain, &self.validator) {
                    Ok(chain) => {
                        ledger.replace_chain(chain);
                        self.epoch.fetch_add(1, Ordering::AcqRel);
                        true
                    }
                    Err(e) => {
                        log::error!("Winning chain failed revalidation: {}", e);
                        false
                    }
                }
            }
            None => {
                log::info!("Local chain of length {} is authoritative", current_len);
                false
            }
        }
    }

    /// Stop any running proof search
    pub fn shutdown(&self) {
        log::info!("Node {} shutting down", self.id);
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{ChainSnapshot, sign_transaction, sender_id};
    use crate::core::Hash256;
    use crate::error::TransactionError;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Peers served from memory: address -> chain, or absent for unreachable
    #[derive(Clone, Default)]
    struct MemoryPeers {
        chains: Arc<std::sync::Mutex<HashMap<PeerAddress, Vec<Block>>>>,
    }

    impl MemoryPeers {
        fn serve(&self, address: &str, chain: Vec<Block>) {
            let peer = PeerAddress::parse(address).unwrap();
            self.chains.lock().unwrap().insert(peer, chain);
        }
    }

    impl ChainSource for MemoryPeers {
        async fn fetch_chain(&self, peer: &PeerAddress) -> Result<ChainSnapshot> {
            let chain = self.chains.lock().unwrap().get(peer).cloned();
            chain.map(ChainSnapshot::new).ok_or_else(|| LedgerError::PeerUnreachable {
                peer: peer.to_string(),
                reason: "no such peer".to_string(),
            })
        }
    }

    fn config(difficulty: u32) -> NodeConfig {
        NodeConfig {
            difficulty,
            peer_timeout_ms: 500,
            ..NodeConfig::default()
        }
    }

    fn node(difficulty: u32) -> Node<MemoryPeers> {
        Node::new(&config(difficulty), MemoryPeers::default()).unwrap()
    }

    async fn mine_blocks(node: &Node<MemoryPeers>, count: usize) {
        for i in 0..count {
            node.submit_transaction("A", "B", format!("vote{}", i)).await.unwrap();
            node.mine().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_genesis_only_at_startup() {
        let node = node(1);
        let chain = node.chain().await;
        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_genesis());
        assert_eq!(node.id().len(), 32);
    }

    #[tokio::test]
    async fn test_submit_then_mine() {
        let node = node(1);
        let genesis = node.last_block().await;

        let index = node.submit_transaction("A", "B", "vote1").await.unwrap();
        assert_eq!(index, 2);
        assert!(node.validate_pool().await);

        let block = node.mine().await.unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(block.previous_hash, genesis.hash());
        assert_eq!(block.transactions, vec![Transaction::new("A", "B", "vote1")]);
        assert!(node.proof_of_work().is_valid(genesis.proof, block.proof));

        assert_eq!(node.chain_len().await, 2);
        assert!(node.pending_transactions().await.is_empty());
        assert!(node.validator().is_valid(&node.chain().await));
    }

    #[tokio::test]
    async fn test_submit_missing_fields_rejected() {
        let node = node(0);
        let result = node.submit_transaction("", "B", "vote").await;
        assert_eq!(
            result,
            Err(LedgerError::InvalidTransaction(TransactionError::MissingField("sender")))
        );
        assert!(node.pending_transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_mine_empty_pool_refused() {
        let node = node(0);
        assert_eq!(node.mine().await, Err(LedgerError::PoolEmptyOrInvalid));
        assert_eq!(node.chain_len().await, 1);
    }

    #[tokio::test]
    async fn test_mine_all_invalid_pool_refused() {
        let rule = |tx: &Transaction| {
            if tx.payload == b"ok" {
                Ok(())
            } else {
                Err(TransactionError::MissingField("payload"))
            }
        };
        let node = Node::with_rules(&config(0), Arc::new(rule), MemoryPeers::default()).unwrap();
        node.submit_transaction("A", "B", "bad").await.unwrap();

        assert!(!node.validate_pool().await);
        assert_eq!(node.mine().await, Err(LedgerError::PoolEmptyOrInvalid));
        assert_eq!(node.chain_len().await, 1);
        assert_eq!(node.pending_transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_signed_submission() {
        let mut cfg = config(0);
        cfg.require_signatures = true;
        let node = Node::new(&cfg, MemoryPeers::default()).unwrap();

        let secp = secp256k1::Secp256k1::new();
        let secret_key = secp256k1::SecretKey::new(&mut rand::thread_rng());
        let sender = sender_id(&secret_key.public_key(&secp).serialize());
        let signed = sign_transaction(Transaction::new(sender.clone(), "B", "vote"), &secret_key);
        let credential = signed.credential.clone().unwrap();

        node.submit_transaction(&sender, "B", "vote").await.unwrap();
        assert!(!node.validate_pool().await);

        node.submit_signed(&sender, "B", "vote", credential).await.unwrap();
        assert!(node.validate_pool().await);

        let block = node.mine().await.unwrap();
        assert_eq!(block.transactions.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_mining_never_duplicates() {
        let node = Arc::new(node(2));
        for i in 0..4 {
            node.submit_transaction("A", "B", format!("vote{}", i)).await.unwrap();
        }

        let a = tokio::spawn({
            let node = Arc::clone(&node);
            async move { node.mine().await }
        });
        let b = tokio::spawn({
            let node = Arc::clone(&node);
            async move { node.mine().await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let forged: Vec<&Block> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(forged.len(), 1);
        assert!(results.iter().any(|r| r == &Err(LedgerError::PoolEmptyOrInvalid)));

        let chain = node.chain().await;
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].transactions.len(), 4);
        assert!(node.pending_transactions().await.is_empty());
        assert!(node.validator().is_valid(&chain));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_mining() {
        let node = Arc::new(node(64));
        node.submit_transaction("A", "B", "vote").await.unwrap();

        let miner = tokio::spawn({
            let node = Arc::clone(&node);
            async move { node.mine().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        node.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(10), miner).await.unwrap().unwrap();
        assert_eq!(result, Err(LedgerError::MiningCancelled));
        assert_eq!(node.chain_len().await, 1);
        assert_eq!(node.pending_transactions().await.len(), 1);
        assert!(node.is_shut_down());
    }

    #[tokio::test]
    async fn test_register_node() {
        let node = node(0);
        node.register_node("http://127.0.0.1:5001").await.unwrap();
        node.register_node("127.0.0.1:5001").await.unwrap();
        assert_eq!(node.peers().await.len(), 1);

        assert!(matches!(
            node.register_node("ftp://nowhere").await,
            Err(LedgerError::InvalidPeerAddress(_))
        ));
        assert_eq!(node.peers().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_adopts_longer_valid_chain() {
        let n2 = node(1);
        mine_blocks(&n2, 4).await;
        assert_eq!(n2.chain_len().await, 5);

        let peers = MemoryPeers::default();
        peers.serve("127.0.0.1:5002", n2.chain().await);
        let n1 = Node::new(&config(1), peers).unwrap();
        mine_blocks(&n1, 2).await;
        assert_eq!(n1.chain_len().await, 3);

        n1.register_node("http://127.0.0.1:5002").await.unwrap();
        assert!(n1.resolve_conflicts().await);
        assert_eq!(n1.chain_len().await, 5);
        assert_eq!(n1.chain().await, n2.chain().await);
    }

    #[tokio::test]
    async fn test_resolve_rejects_broken_longer_chain() {
        let n2 = node(1);
        mine_blocks(&n2, 4).await;
        let mut broken = n2.chain().await;
        broken[2].previous_hash = Hash256::new([0xaa; 32]);

        let peers = MemoryPeers::default();
        peers.serve("127.0.0.1:5002", broken);
        let n1 = Node::new(&config(1), peers).unwrap();
        mine_blocks(&n1, 2).await;
        let before = n1.chain().await;

        n1.register_node("127.0.0.1:5002").await.unwrap();
        assert!(!n1.resolve_conflicts().await);
        assert_eq!(n1.chain().await, before);
    }

    #[tokio::test]
    async fn test_resolve_keeps_chain_against_equal_or_shorter() {
        let n2 = node(1);
        mine_blocks(&n2, 2).await;
        let n3 = node(1);
        mine_blocks(&n3, 1).await;

        let peers = MemoryPeers::default();
        peers.serve("127.0.0.1:5002", n2.chain().await);
        peers.serve("127.0.0.1:5003", n3.chain().await);
        let n1 = Node::new(&config(1), peers).unwrap();
        mine_blocks(&n1, 2).await;
        let before = n1.chain().await;

        n1.register_node("127.0.0.1:5002").await.unwrap();
        n1.register_node("127.0.0.1:5003").await.unwrap();
        n1.register_node("127.0.0.1:5004").await.unwrap();
        assert!(!n1.resolve_conflicts().await);
        assert_eq!(n1.chain().await, before);
    }

    #[tokio::test]
    async fn test_resolve_without_peers() {
        let node = node(0);
        assert!(!node.resolve_conflicts().await);
    }

    #[tokio::test]
    async fn test_restore_chain() {
        let source = node(1);
        mine_blocks(&source, 2).await;

        let node = node(1);
        node.restore_chain(source.chain().await).await.unwrap();
        assert_eq!(node.chain().await, source.chain().await);

        let mut tampered = source.chain().await;
        tampered[1].transactions.clear();
        assert!(matches!(
            node.restore_chain(tampered).await,
            Err(LedgerError::ChainIntegrity(_))
        ));
        assert_eq!(node.chain().await, source.chain().await);
    }

    #[tokio::test]
    async fn test_mining_after_replacement_extends_new_chain() {
        let n2 = node(1);
        mine_blocks(&n2, 3).await;

        let peers = MemoryPeers::default();
        peers.serve("127.0.0.1:5002", n2.chain().await);
        let n1 = Node::new(&config(1), peers).unwrap();
        n1.register_node("127.0.0.1:5002").await.unwrap();
        assert!(n1.resolve_conflicts().await);

        n1.submit_transaction("C", "D", "vote9").await.unwrap();
        let block = n1.mine().await.unwrap();
        assert_eq!(block.index, 5);
        assert!(n1.validator().is_valid(&n1.chain().await));
    }
}
