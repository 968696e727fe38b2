// Proof-of-work ledger engine
// Hash-chained blocks, a validated transaction pool and longest-valid-chain consensus

pub mod core;
pub mod consensus;
pub mod ledger;
pub mod network;
pub mod storage;
pub mod config;
pub mod error;
pub mod node;
pub mod cli;

// Re-exports for convenience
pub use self::core::{Block, Credential, Hash256, Transaction};
pub use consensus::{ChainSnapshot, ChainSource, ChainValidator, Difficulty, ProofOfWork, TransactionRule};
pub use ledger::{Chain, Ledger, TransactionPool};
pub use network::{ChainServer, NodeClient, NodeRegistry, PeerAddress, TcpChainSource};
pub use storage::ChainStore;
pub use config::NodeConfig;
pub use error::{LedgerError, Result};
pub use node::Node;
pub use cli::{Cli, CliHandler};
