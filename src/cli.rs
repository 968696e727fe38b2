// CLI commands

use crate::config::NodeConfig;
use crate::consensus::sign_transaction;
use crate::core::{Block, Transaction};
use crate::error::{LedgerError, Result};
use crate::network::{ChainServer, NodeClient, PeerAddress, TcpChainSource};
use crate::node::Node;
use crate::storage::ChainStore;
use clap::{Parser, Subcommand};
use secp256k1::SecretKey;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pow-ledger")]
#[command(about = "Proof-of-work ledger node", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the chain store
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Leading zero hex digits required of a proof
    #[arg(long, global = true)]
    pub difficulty: Option<u32>,

    /// Send the command to a running node instead of opening the local store
    #[arg(short, long, global = true)]
    pub node: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the local chain and node operations until interrupted
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        listen: Option<String>,
        /// Peer to register at startup (repeatable)
        #[arg(short, long = "peer")]
        peers: Vec<String>,
    },

    /// Queue a transaction on a running node (requires --node)
    Submit {
        sender: String,
        recipient: String,
        payload: String,
        /// Hex secret key used to sign the transaction
        #[arg(long)]
        private_key: Option<String>,
    },

    /// Submit one transaction and mine it into a block
    Mine {
        sender: String,
        recipient: String,
        payload: String,
        /// Hex secret key used to sign the transaction
        #[arg(long)]
        private_key: Option<String>,
    },

    /// Print the local chain, or a peer's chain
    Chain {
        #[arg(long)]
        peer: Option<String>,
    },

    /// Register peers with a running node (requires --node)
    Register {
        #[arg(required = true)]
        addresses: Vec<String>,
    },

    /// Adopt the longest valid chain among the given peers
    Resolve {
        peers: Vec<String>,
    },
}

#[derive(Serialize)]
struct ChainView<'a> {
    chain: &'a [Block],
    length: usize,
}

/// CLI handler
pub struct CliHandler {
    config: NodeConfig,
    remote: Option<NodeClient>,
}

impl CliHandler {
    /// Merge file configuration with command-line overrides
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut config = NodeConfig::load(cli.config.as_deref())?;
        if let Some(dir) = &cli.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(difficulty) = cli.difficulty {
            config.difficulty = difficulty;
        }
        config.validate()?;

        let remote = match &cli.node {
            Some(address) => Some(NodeClient::new(PeerAddress::parse(address)?, config.peer_timeout())),
            None => None,
        };

        Ok(Self { config, remote })
    }

    /// Handle CLI command
    pub async fn handle(&mut self, cli: Cli) -> Result<()> {
        if let Some(client) = &self.remote {
            return Self::handle_remote(client, cli.command).await;
        }

        // the store is exclusive to one process, so only local commands open it
        let store = Arc::new(self.open_store()?);
        match cli.command {
            Commands::Serve { listen, peers } => self.serve(store, listen, peers).await,
            Commands::Mine { sender, recipient, payload, private_key } => {
                let tx = build_transaction(sender, recipient, payload, private_key)?;
                self.mine(&store, tx).await
            }
            Commands::Chain { peer: Some(address) } => self.show_peer_chain(&address).await,
            Commands::Chain { peer: None } => print_chain(&store.load()?.unwrap_or_default()),
            Commands::Resolve { peers } => self.resolve(&store, peers).await,
            Commands::Submit { .. } | Commands::Register { .. } => Err(LedgerError::Config(
                "submit and register act on a running node; pass --node <addr>".to_string(),
            )),
        }
    }

    async fn handle_remote(client: &NodeClient, command: Commands) -> Result<()> {
        match command {
            Commands::Serve { .. } => Err(LedgerError::Config(
                "serve runs a local node and does not take --node".to_string(),
            )),
            Commands::Submit { sender, recipient, payload, private_key } => {
                let tx = build_transaction(sender, recipient, payload, private_key)?;
                let index = client.submit(tx).await?;
                println!("Transaction will be added to Block {}", index);
                Ok(())
            }
            Commands::Mine { sender, recipient, payload, private_key } => {
                let tx = build_transaction(sender, recipient, payload, private_key)?;
                let index = client.submit(tx).await?;
                println!("Transaction will be added to Block {}", index);

                let block = client.mine().await?;
                println!("New Block Forged");
                println!("{}", to_json(&block)?);
                Ok(())
            }
            Commands::Chain { peer } => {
                let snapshot = match peer {
                    Some(address) => {
                        NodeClient::new(PeerAddress::parse(&address)?, client.timeout())
                            .chain()
                            .await?
                    }
                    None => client.chain().await?,
                };
                print_chain(&snapshot.chain)
            }
            Commands::Register { addresses } => {
                let mut peers = Vec::new();
                for address in &addresses {
                    peers = client.register(address).await?;
                }
                println!("New nodes have been added");
                println!("{}", to_json(&peers)?);
                Ok(())
            }
            Commands::Resolve { peers } => {
                for address in &peers {
                    client.register(address).await?;
                }
                if client.resolve().await? {
                    println!("Node {} replaced its chain", client.addr());
                } else {
                    println!("Node {} chain is authoritative", client.addr());
                }
                Ok(())
            }
        }
    }

    fn open_store(&self) -> Result<ChainStore> {
        ChainStore::open(PathBuf::from(&self.config.data_dir).join("chain"))
    }

    /// Build a node and load the stored chain into it
    async fn open_node(&self, store: &ChainStore) -> Result<Arc<Node>> {
        let node = Node::new(&self.config, TcpChainSource)?;
        if let Some(blocks) = store.load_valid(node.validator())? {
            node.restore_chain(blocks).await?;
        }
        for peer in &self.config.peers {
            node.register_node(peer).await?;
        }
        Ok(Arc::new(node))
    }

    async fn serve(&self, store: Arc<ChainStore>, listen: Option<String>, peers: Vec<String>) -> Result<()> {
        let node = self.open_node(&store).await?;
        for peer in &peers {
            node.register_node(peer).await?;
        }

        if node.resolve_conflicts().await {
            store.save(&node.chain().await)?;
        }

        let listen = listen.unwrap_or_else(|| self.config.listen.clone());
        let server = ChainServer::bind(&listen, Arc::clone(&node))
            .await?
            .with_store(Arc::clone(&store));
        println!("Node {} serving on {}", node.id(), server.local_addr()?);

        tokio::select! {
            result = server.serve() => result?,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
            }
        }

        node.shutdown();
        store.save(&node.chain().await)?;
        Ok(())
    }

    async fn mine(&self, store: &ChainStore, tx: Transaction) -> Result<()> {
        let node = self.open_node(store).await?;

        let index = node.submit(tx).await?;
        println!("Transaction will be added to Block {}", index);

        let block = node.mine().await?;
        store.save(&node.chain().await)?;

        println!("New Block Forged");
        println!("{}", to_json(&block)?);
        Ok(())
    }

    async fn show_peer_chain(&self, address: &str) -> Result<()> {
        let client = NodeClient::new(PeerAddress::parse(address)?, self.config.peer_timeout());
        let snapshot = client.chain().await?;
        print_chain(&snapshot.chain)
    }

    async fn resolve(&self, store: &ChainStore, peers: Vec<String>) -> Result<()> {
        let node = self.open_node(store).await?;
        for peer in &peers {
            node.register_node(peer).await?;
        }

        let replaced = node.resolve_conflicts().await;
        let chain = node.chain().await;
        store.save(&chain)?;

        if replaced {
            println!("Our chain was replaced (length {})", chain.len());
        } else {
            println!("Our chain is authoritative (length {})", chain.len());
        }
        Ok(())
    }
}

/// Build a transaction, signing it when a hex secret key is given
fn build_transaction(
    sender: String,
    recipient: String,
    payload: String,
    private_key: Option<String>,
) -> Result<Transaction> {
    let tx = Transaction::new(sender, recipient, payload);
    let Some(key_hex) = private_key else {
        return Ok(tx);
    };

    let bytes = hex::decode(key_hex.trim())
        .map_err(|e| LedgerError::Config(format!("Invalid private key hex: {}", e)))?;
    let secret_key = SecretKey::from_slice(&bytes)
        .map_err(|e| LedgerError::Config(format!("Invalid private key: {}", e)))?;
    Ok(sign_transaction(tx, &secret_key))
}

fn print_chain(chain: &[Block]) -> Result<()> {
    let view = ChainView {
        chain,
        length: chain.len(),
    };
    println!("{}", to_json(&view)?);
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{SignatureRule, TransactionRule, sender_id};
    use secp256k1::Secp256k1;

    #[test]
    fn test_node_flag_selects_remote() {
        let cli = Cli::parse_from(["pow-ledger", "--node", "http://127.0.0.1:5001", "resolve"]);
        let handler = CliHandler::new(&cli).unwrap();
        let client = handler.remote.as_ref().unwrap();
        assert_eq!(client.addr(), &PeerAddress::new("127.0.0.1", 5001));

        let cli = Cli::parse_from(["pow-ledger", "--node", "bad host", "resolve"]);
        assert!(matches!(CliHandler::new(&cli), Err(LedgerError::InvalidPeerAddress(_))));
    }

    #[tokio::test]
    async fn test_submit_needs_running_node() {
        let dir = std::env::temp_dir().join(format!("pow-ledger-cli-{}", hex::encode(rand::random::<[u8; 8]>())));
        let cli = Cli::parse_from([
            "pow-ledger",
            "--data-dir",
            dir.to_str().unwrap(),
            "submit",
            "A",
            "B",
            "vote1",
        ]);
        let mut handler = CliHandler::new(&cli).unwrap();
        assert!(matches!(handler.handle(cli).await, Err(LedgerError::Config(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_build_signed_transaction() {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::new(&mut rand::thread_rng());
        let sender = sender_id(&secret_key.public_key(&secp).serialize());

        let tx = build_transaction(
            sender,
            "B".to_string(),
            "vote1".to_string(),
            Some(hex::encode(secret_key.secret_bytes())),
        )
        .unwrap();
        assert!(SignatureRule::new().check(&tx).is_ok());

        let result = build_transaction("A".into(), "B".into(), "x".into(), Some("zz".into()));
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }
}
