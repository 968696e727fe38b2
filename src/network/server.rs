// Node server - answers chain requests and drives node operations for clients

use crate::consensus::ChainSource;
use crate::error::{LedgerError, Result};
use crate::network::{Message, Peer};
use crate::node::Node;
use crate::storage::ChainStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// Serves a live node: peers fetch its chain, clients submit, mine,
/// register peers and trigger resolution.
pub struct ChainServer<S> {
    listener: TcpListener,
    shared: Arc<Shared<S>>,
}

struct Shared<S> {
    node: Arc<Node<S>>,
    store: Option<Arc<ChainStore>>,
    // serialises saves so the last writer stores the newest chain
    save_lock: Mutex<()>,
}

impl<S: ChainSource> Shared<S> {
    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let _guard = self.save_lock.lock().await;
        let chain = self.node.chain().await;
        if let Err(e) = store.save(&chain) {
            log::error!("Failed to persist chain of length {}: {}", chain.len(), e);
        }
    }
}

impl<S: ChainSource> ChainServer<S> {
    pub async fn bind(addr: &str, node: Arc<Node<S>>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LedgerError::Network(format!("Failed to bind {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                node,
                store: None,
                save_lock: Mutex::new(()),
            }),
        })
    }

    /// Save the chain to `store` whenever mining or resolution changes it
    pub fn with_store(self, store: Arc<ChainStore>) -> Self {
        let shared = Shared {
            node: Arc::clone(&self.shared.node),
            store: Some(store),
            save_lock: Mutex::new(()),
        };
        Self {
            listener: self.listener,
            shared: Arc::new(shared),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped
    pub async fn serve(self) -> Result<()> {
        log::info!("Node server listening on {}", self.local_addr()?);

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    log::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            log::debug!("New connection from {}", addr);

            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                if let Err(e) = Self::handle_peer(stream, addr, shared).await {
                    log::warn!("Peer {} error: {}", addr, e);
                }
            });
        }
    }

    async fn handle_peer(stream: TcpStream, addr: SocketAddr, shared: Arc<Shared<S>>) -> Result<()> {
        let mut peer = Peer::new(stream, addr.to_string());
        let node = &shared.node;

        while let Some(message) = peer.receive_message().await? {
            let reply = match message {
                Message::GetChain => {
                    let chain = node.chain().await;
                    log::debug!("Sending {} blocks to {}", chain.len(), addr);
                    peer.send_chain(&chain).await?;
                    continue;
                }
                Message::Submit(tx) => match node.submit(tx).await {
                    Ok(index) => Message::Queued(index),
                    Err(e) => Message::Reject(e.to_string()),
                },
                Message::Mine => match node.mine().await {
                    Ok(block) => {
                        shared.persist().await;
                        Message::Mined(block)
                    }
                    Err(e) => Message::Reject(e.to_string()),
                },
                Message::Register(address) => match node.register_node(&address).await {
                    Ok(()) => {
                        let peers = node.peers().await;
                        Message::Peers(peers.iter().map(|p| p.to_string()).collect())
                    }
                    Err(e) => Message::Reject(e.to_string()),
                },
                Message::Resolve => {
                    let replaced = node.resolve_conflicts().await;
                    if replaced {
                        shared.persist().await;
                    }
                    Message::Resolved(replaced)
                }
                other => {
                    log::debug!("Ignoring unsolicited {} from {}", other.message_type().as_str(), addr);
                    continue;
                }
            };

            peer.send_message(&reply).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::core::Transaction;
    use crate::network::{NodeClient, PeerAddress, TcpChainSource};
    use std::time::Duration;

    async fn start(store: Option<Arc<ChainStore>>) -> (Arc<Node>, NodeClient) {
        let config = NodeConfig {
            difficulty: 1,
            peer_timeout_ms: 500,
            ..NodeConfig::default()
        };
        let node = Arc::new(Node::new(&config, TcpChainSource).unwrap());

        let mut server = ChainServer::bind("127.0.0.1:0", Arc::clone(&node)).await.unwrap();
        if let Some(store) = store {
            server = server.with_store(store);
        }
        let port = server.local_addr().unwrap().port();
        tokio::spawn(server.serve());

        let client = NodeClient::new(PeerAddress::new("127.0.0.1", port), Duration::from_secs(2));
        (node, client)
    }

    #[tokio::test]
    async fn test_submit_and_mine_on_live_node() {
        let (node, client) = start(None).await;

        let index = client.submit(Transaction::new("A", "B", b"vote1".to_vec())).await.unwrap();
        assert_eq!(index, 2);

        let block = client.mine().await.unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(block.transactions.len(), 1);

        let snapshot = client.chain().await.unwrap();
        assert_eq!(snapshot.length, 2);
        assert_eq!(snapshot.chain, node.chain().await);
    }

    #[tokio::test]
    async fn test_failures_come_back_as_rejections() {
        let (_node, client) = start(None).await;

        let result = client.submit(Transaction::new("", "B", b"x".to_vec())).await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));

        let result = client.mine().await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));

        let result = client.register("not a host:1").await;
        assert!(matches!(result, Err(LedgerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_register_and_resolve_on_demand() {
        let (longer, longer_client) = start(None).await;
        for i in 0..2 {
            longer_client.submit(Transaction::new("A", "B", format!("vote{}", i))).await.unwrap();
            longer_client.mine().await.unwrap();
        }

        let (node, client) = start(None).await;
        let peers = client.register(&longer_client.addr().to_string()).await.unwrap();
        assert_eq!(peers, vec![longer_client.addr().to_string()]);

        assert!(client.resolve().await.unwrap());
        assert_eq!(node.chain().await, longer.chain().await);

        // already as long as the peer's chain
        assert!(!client.resolve().await.unwrap());
    }

    #[tokio::test]
    async fn test_mined_chain_is_persisted() {
        let store = Arc::new(ChainStore::memory().unwrap());
        let (node, client) = start(Some(Arc::clone(&store))).await;

        client.submit(Transaction::new("A", "B", b"vote1".to_vec())).await.unwrap();
        client.mine().await.unwrap();

        assert_eq!(store.height().unwrap(), 2);
        assert_eq!(store.load().unwrap().unwrap(), node.chain().await);
    }
}
