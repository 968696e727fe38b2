// Peer connections and the TCP chain source

use crate::consensus::{ChainSnapshot, ChainSource};
use crate::core::Block;
use crate::error::{LedgerError, Result};
use crate::network::message::HEADER_LEN;
use crate::network::{Message, PeerAddress};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Framed connection to a peer
pub struct Peer {
    pub addr: String,
    stream: TcpStream,
}

impl Peer {
    /// Wrap an established TCP stream
    pub fn new(stream: TcpStream, addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream,
        }
    }

    /// Connect to a peer
    pub async fn connect(peer: &PeerAddress) -> Result<Self> {
        let stream = TcpStream::connect((peer.host.as_str(), peer.port))
            .await
            .map_err(|e| LedgerError::PeerUnreachable {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self::new(stream, peer.to_string()))
    }

    /// Send a message to the peer
    pub async fn send_message(&mut self, message: &Message) -> Result<()> {
        let data = message.serialize().map_err(LedgerError::Network)?;
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Receive a message from the peer. `None` on a clean close before a header.
    pub async fn receive_message(&mut self) -> Result<Option<Message>> {
        let mut header = [0u8; HEADER_LEN];
        match self.stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let (msg_type, payload_len) = Message::parse_header(&header).map_err(LedgerError::Network)?;

        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            self.stream.read_exact(&mut payload).await?;
        }

        Message::from_payload(msg_type, &payload)
            .map(Some)
            .map_err(LedgerError::Network)
    }

    /// Send a whole chain as one or more `chain` frames
    pub async fn send_chain(&mut self, chain: &[Block]) -> Result<()> {
        let frames = Message::chain_frames(chain).map_err(LedgerError::Network)?;
        if frames.len() > 1 {
            log::debug!("Sending {} blocks to {} in {} frames", chain.len(), self.addr, frames.len());
        }
        for frame in &frames {
            self.send_message(frame).await?;
        }
        Ok(())
    }

    /// Read `chain` frames until the advertised length has arrived
    pub async fn receive_chain(&mut self) -> Result<ChainSnapshot> {
        let mut snapshot = match self.receive_message().await? {
            Some(Message::Chain(first)) => first,
            Some(other) => {
                return Err(LedgerError::Network(format!(
                    "expected chain, got {}",
                    other.message_type().as_str()
                )));
            }
            None => return Err(LedgerError::Network("connection closed before reply".to_string())),
        };

        while (snapshot.chain.len() as u64) < snapshot.length {
            match self.receive_message().await? {
                Some(Message::Chain(part)) if part.length == snapshot.length && !part.chain.is_empty() => {
                    snapshot.chain.extend(part.chain);
                }
                Some(Message::Chain(_)) => {
                    return Err(LedgerError::Network("inconsistent chain frame".to_string()));
                }
                Some(other) => {
                    return Err(LedgerError::Network(format!(
                        "expected chain, got {}",
                        other.message_type().as_str()
                    )));
                }
                None => {
                    return Err(LedgerError::Network(format!(
                        "connection closed after {} of {} blocks",
                        snapshot.chain.len(),
                        snapshot.length
                    )));
                }
            }
        }

        Ok(snapshot)
    }
}

/// Fetches chains from peers over TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpChainSource;

impl TcpChainSource {
    async fn request_chain(peer: &PeerAddress) -> Result<ChainSnapshot> {
        let mut connection = Peer::connect(peer).await?;
        connection.send_message(&Message::GetChain).await?;
        connection.receive_chain().await
    }
}

impl ChainSource for TcpChainSource {
    async fn fetch_chain(&self, peer: &PeerAddress) -> Result<ChainSnapshot> {
        Self::request_chain(peer).await.map_err(|e| match e {
            LedgerError::PeerUnreachable { .. } => e,
            other => LedgerError::PeerUnreachable {
                peer: peer.to_string(),
                reason: other.to_string(),
            },
        })
    }
}
