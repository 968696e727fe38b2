// Node protocol messages

use crate::consensus::ChainSnapshot;
use crate::core::{
    Block, Serializable, Transaction, read_var_bytes, read_varint, write_var_bytes, write_varint,
};
use std::io::{Cursor, Read};

/// 12-byte command + 4-byte payload length
pub const HEADER_LEN: usize = 16;

/// Largest payload a frame may carry, enforced on both send and receive
pub const MAX_PAYLOAD_LEN: usize = 32 * 1024 * 1024;

// varint total length + varint block count at the head of a chain frame
const CHAIN_FRAME_OVERHEAD: usize = 18;

/// Network message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    GetChain,
    Chain,
    Submit,
    Queued,
    Mine,
    Mined,
    Register,
    Peers,
    Resolve,
    Resolved,
    Reject,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::GetChain => "getchain",
            MessageType::Chain => "chain",
            MessageType::Submit => "submit",
            MessageType::Queued => "queued",
            MessageType::Mine => "mine",
            MessageType::Mined => "block",
            MessageType::Register => "register",
            MessageType::Peers => "peers",
            MessageType::Resolve => "resolve",
            MessageType::Resolved => "resolved",
            MessageType::Reject => "reject",
        }
    }

    pub fn from_command(s: &str) -> Option<Self> {
        match s {
            "getchain" => Some(MessageType::GetChain),
            "chain" => Some(MessageType::Chain),
            "submit" => Some(MessageType::Submit),
            "queued" => Some(MessageType::Queued),
            "mine" => Some(MessageType::Mine),
            "block" => Some(MessageType::Mined),
            "register" => Some(MessageType::Register),
            "peers" => Some(MessageType::Peers),
            "resolve" => Some(MessageType::Resolve),
            "resolved" => Some(MessageType::Resolved),
            "reject" => Some(MessageType::Reject),
            _ => None,
        }
    }
}

/// Network message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Ask a peer for its full chain
    GetChain,
    /// One frame of a node's chain. `length` is the whole chain's length;
    /// `chain` holds the next run of blocks, genesis first.
    Chain(ChainSnapshot),
    /// Queue a transaction on the remote node
    Submit(Transaction),
    /// Index of the block a submitted transaction will land in
    Queued(u64),
    /// Mine the remote node's pending transactions
    Mine,
    /// Block forged in reply to `Mine`
    Mined(Block),
    /// Register a peer address with the remote node
    Register(String),
    /// Peers known to the remote node after a registration
    Peers(Vec<String>),
    /// Run one consensus pass on the remote node
    Resolve,
    /// Whether the remote node replaced its chain
    Resolved(bool),
    /// Request failed on the remote node
    Reject(String),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::GetChain => MessageType::GetChain,
            Message::Chain(_) => MessageType::Chain,
            Message::Submit(_) => MessageType::Submit,
            Message::Queued(_) => MessageType::Queued,
            Message::Mine => MessageType::Mine,
            Message::Mined(_) => MessageType::Mined,
            Message::Register(_) => MessageType::Register,
            Message::Peers(_) => MessageType::Peers,
            Message::Resolve => MessageType::Resolve,
            Message::Resolved(_) => MessageType::Resolved,
            Message::Reject(_) => MessageType::Reject,
        }
    }

    /// Split a chain into `chain` frames that each fit under the payload cap
    pub fn chain_frames(chain: &[Block]) -> Result<Vec<Message>, String> {
        split_chain(chain, MAX_PAYLOAD_LEN)
    }

    /// Serialize message to a framed byte sequence.
    ///
    /// Fails if the payload exceeds `MAX_PAYLOAD_LEN`, since no peer would
    /// accept the frame.
    pub fn serialize(&self) -> Result<Vec<u8>, String> {
        let payload = self.serialize_payload();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(format!(
                "{} payload too large to send: {} bytes (limit {})",
                self.message_type().as_str(),
                payload.len(),
                MAX_PAYLOAD_LEN
            ));
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());

        // Message type (12 bytes, padded with zeros)
        let command = self.message_type().as_str().as_bytes();
        let mut type_bytes = [0u8; 12];
        type_bytes[..command.len()].copy_from_slice(command);
        bytes.extend_from_slice(&type_bytes);

        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        Ok(bytes)
    }

    fn serialize_payload(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            Message::GetChain | Message::Mine | Message::Resolve => {}
            Message::Chain(snapshot) => {
                write_varint(&mut bytes, snapshot.length);
                write_varint(&mut bytes, snapshot.chain.len() as u64);
                for block in &snapshot.chain {
                    bytes.extend_from_slice(&block.serialize());
                }
            }
            Message::Submit(tx) => bytes = tx.serialize(),
            Message::Queued(index) => bytes.extend_from_slice(&index.to_le_bytes()),
            Message::Mined(block) => bytes = block.serialize(),
            Message::Register(address) | Message::Reject(address) => {
                write_var_bytes(&mut bytes, address.as_bytes());
            }
            Message::Peers(peers) => {
                write_varint(&mut bytes, peers.len() as u64);
                for peer in peers {
                    write_var_bytes(&mut bytes, peer.as_bytes());
                }
            }
            Message::Resolved(replaced) => bytes.push(*replaced as u8),
        }
        bytes
    }

    /// Parse a frame header into its type and payload length
    pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<(MessageType, usize), String> {
        let command = std::str::from_utf8(&header[0..12])
            .map_err(|e| format!("Invalid message type: {}", e))?
            .trim_end_matches('\0');

        let msg_type = MessageType::from_command(command)
            .ok_or_else(|| format!("Unknown message type: {}", command))?;

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[12..16]);
        let payload_len = u32::from_le_bytes(len_bytes) as usize;

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(format!("Payload too large: {} bytes", payload_len));
        }

        Ok((msg_type, payload_len))
    }

    /// Decode a payload of a known type
    pub fn from_payload(msg_type: MessageType, payload: &[u8]) -> Result<Self, String> {
        let mut cursor = Cursor::new(payload);

        let message = match msg_type {
            MessageType::GetChain => Message::GetChain,
            MessageType::Mine => Message::Mine,
            MessageType::Resolve => Message::Resolve,
            MessageType::Chain => {
                let length = read_varint(&mut cursor).map_err(|e| e.to_string())?;
                let count = read_varint(&mut cursor).map_err(|e| e.to_string())?;

                let mut chain = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    chain.push(Block::from_reader(&mut cursor)?);
                }
                Message::Chain(ChainSnapshot { length, chain })
            }
            MessageType::Submit => Message::Submit(Transaction::from_reader(&mut cursor)?),
            MessageType::Queued => {
                let mut bytes = [0u8; 8];
                cursor.read_exact(&mut bytes).map_err(|e| e.to_string())?;
                Message::Queued(u64::from_le_bytes(bytes))
            }
            MessageType::Mined => Message::Mined(Block::from_reader(&mut cursor)?),
            MessageType::Register => Message::Register(read_text(&mut cursor)?),
            MessageType::Reject => Message::Reject(read_text(&mut cursor)?),
            MessageType::Peers => {
                let count = read_varint(&mut cursor).map_err(|e| e.to_string())?;
                let mut peers = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    peers.push(read_text(&mut cursor)?);
                }
                Message::Peers(peers)
            }
            MessageType::Resolved => {
                let mut flag = [0u8; 1];
                cursor.read_exact(&mut flag).map_err(|e| e.to_string())?;
                match flag[0] {
                    0 => Message::Resolved(false),
                    1 => Message::Resolved(true),
                    other => return Err(format!("Invalid resolved flag: {}", other)),
                }
            }
        };

        if cursor.position() as usize != payload.len() {
            return Err(format!("Trailing bytes after {} payload", msg_type.as_str()));
        }

        Ok(message)
    }

    /// Deserialize a complete frame
    pub fn deserialize(data: &[u8]) -> Result<Self, String> {
        if data.len() < HEADER_LEN {
            return Err("Message too short".to_string());
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&data[..HEADER_LEN]);
        let (msg_type, payload_len) = Self::parse_header(&header)?;

        if data.len() < HEADER_LEN + payload_len {
            return Err("Incomplete payload".to_string());
        }

        Self::from_payload(msg_type, &data[HEADER_LEN..HEADER_LEN + payload_len])
    }
}

fn read_text(cursor: &mut Cursor<&[u8]>) -> Result<String, String> {
    let bytes = read_var_bytes(cursor).map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| format!("Invalid UTF-8: {}", e))
}

fn split_chain(chain: &[Block], limit: usize) -> Result<Vec<Message>, String> {
    let length = chain.len() as u64;
    let mut frames = Vec::new();
    let mut batch = Vec::new();
    let mut size = CHAIN_FRAME_OVERHEAD;

    for block in chain {
        let encoded = block.serialize().len();
        if encoded + CHAIN_FRAME_OVERHEAD > limit {
            return Err(format!(
                "Block {} too large to send: {} bytes (limit {})",
                block.index, encoded, limit
            ));
        }
        if size + encoded > limit {
            frames.push(Message::Chain(ChainSnapshot {
                length,
                chain: std::mem::take(&mut batch),
            }));
            size = CHAIN_FRAME_OVERHEAD;
        }
        batch.push(block.clone());
        size += encoded;
    }

    if !batch.is_empty() || frames.is_empty() {
        frames.push(Message::Chain(ChainSnapshot { length, chain: batch }));
    }

    Ok(frames)
}
