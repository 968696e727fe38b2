// Client for a running node's server

use crate::consensus::ChainSnapshot;
use crate::core::{Block, Transaction};
use crate::error::{LedgerError, Result};
use crate::network::{Message, Peer, PeerAddress};
use std::future::Future;
use std::time::Duration;

/// Drives the operations of a node that is already serving.
///
/// Plain request/reply calls are bounded by `timeout`. `mine` and `resolve`
/// wait for the remote node to finish, since a proof search has no fixed
/// duration and resolution is already bounded per peer on the remote side.
pub struct NodeClient {
    addr: PeerAddress,
    timeout: Duration,
}

impl NodeClient {
    pub fn new(addr: PeerAddress, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn addr(&self) -> &PeerAddress {
        &self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the node's full chain
    pub async fn chain(&self) -> Result<ChainSnapshot> {
        self.bounded(async {
            let mut connection = Peer::connect(&self.addr).await?;
            connection.send_message(&Message::GetChain).await?;
            connection.receive_chain().await
        })
        .await
    }

    /// Queue a transaction; returns the index of the block it will land in
    pub async fn submit(&self, tx: Transaction) -> Result<u64> {
        match self.bounded(self.exchange(Message::Submit(tx))).await? {
            Message::Queued(index) => Ok(index),
            other => Err(unexpected(&other)),
        }
    }

    /// Ask the node to mine its pending transactions
    pub async fn mine(&self) -> Result<Block> {
        match self.exchange(Message::Mine).await? {
            Message::Mined(block) => Ok(block),
            other => Err(unexpected(&other)),
        }
    }

    /// Register a peer with the node; returns the node's peer list
    pub async fn register(&self, address: &str) -> Result<Vec<String>> {
        match self.bounded(self.exchange(Message::Register(address.to_string()))).await? {
            Message::Peers(peers) => Ok(peers),
            other => Err(unexpected(&other)),
        }
    }

    /// Run one consensus pass on the node
    pub async fn resolve(&self) -> Result<bool> {
        match self.exchange(Message::Resolve).await? {
            Message::Resolved(replaced) => Ok(replaced),
            other => Err(unexpected(&other)),
        }
    }

    async fn exchange(&self, request: Message) -> Result<Message> {
        let mut connection = Peer::connect(&self.addr).await?;
        connection.send_message(&request).await?;

        match connection.receive_message().await? {
            Some(Message::Reject(reason)) => Err(LedgerError::Rejected(reason)),
            Some(reply) => Ok(reply),
            None => Err(LedgerError::Network("connection closed before reply".to_string())),
        }
    }

    async fn bounded<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::PeerUnreachable {
                peer: self.addr.to_string(),
                reason: format!("no response within {:?}", self.timeout),
            }),
        }
    }
}

fn unexpected(reply: &Message) -> LedgerError {
    LedgerError::Network(format!("unexpected reply: {}", reply.message_type().as_str()))
}
