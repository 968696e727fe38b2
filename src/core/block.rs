// Block data structures

use crate::core::{Hash256, sha256, Transaction, Serializable};
use std::io::{Read, Cursor};
use super::serialize::{write_varint, read_varint, read_u64};

/// Proof recorded in every genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Upper bound on transactions accepted when decoding a block
pub const MAX_BLOCK_TRANSACTIONS: u64 = 100_000;

/// Block - a batch of transactions linked to its predecessor by digest
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    /// Position in the chain, genesis = 1
    pub index: u64,
    /// Unix time in seconds when the block was forged
    pub timestamp: u64,
    /// Transactions in admission order
    pub transactions: Vec<Transaction>,
    /// Proof-of-work linking this block to its predecessor's proof
    pub proof: u64,
    /// Hash of the previous block (zero for genesis)
    pub previous_hash: Hash256,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        proof: u64,
        previous_hash: Hash256,
    ) -> Self {
        Self {
            index,
            timestamp,
            transactions,
            proof,
            previous_hash,
        }
    }

    /// Create the genesis block, stamped with the current time
    pub fn genesis() -> Self {
        Self::new(1, unix_now(), Vec::new(), GENESIS_PROOF, Hash256::zero())
    }

    /// Check the fixed genesis form: index 1, sentinel proof and link, no transactions
    pub fn is_genesis(&self) -> bool {
        self.index == 1
            && self.proof == GENESIS_PROOF
            && self.previous_hash.is_zero()
            && self.transactions.is_empty()
    }

    /// SHA256 of the canonical encoding
    pub fn hash(&self) -> Hash256 {
        sha256(&self.serialize())
    }

    /// Decode one block from a stream
    pub fn from_reader(reader: &mut dyn Read) -> Result<Self, String> {
        let index = read_u64(reader).map_err(|e| e.to_string())?;
        let timestamp = read_u64(reader).map_err(|e| e.to_string())?;

        let tx_count = read_varint(reader).map_err(|e| e.to_string())?;
        if tx_count > MAX_BLOCK_TRANSACTIONS {
            return Err(format!("Too many transactions in block: {}", tx_count));
        }

        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            transactions.push(Transaction::from_reader(reader)?);
        }

        let proof = read_u64(reader).map_err(|e| e.to_string())?;

        let mut hash_bytes = [0u8; 32];
        reader.read_exact(&mut hash_bytes).map_err(|e| e.to_string())?;

        Ok(Self {
            index,
            timestamp,
            transactions,
            proof,
            previous_hash: Hash256::new(hash_bytes),
        })
    }
}

impl Serializable for Block {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&self.index.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());

        write_varint(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.serialize());
        }

        buf.extend_from_slice(&self.proof.to_le_bytes());
        buf.extend_from_slice(self.previous_hash.as_bytes());

        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self, String> {
        let mut cursor = Cursor::new(data);
        let block = Self::from_reader(&mut cursor)?;

        if cursor.position() as usize != data.len() {
            return Err(format!(
                "Trailing bytes after block: {}",
                data.len() - cursor.position() as usize
            ));
        }

        Ok(block)
    }
}

/// Current Unix time in seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block::new(
            2,
            1_700_000_000,
            vec![
                Transaction::new("A", "B", b"vote1".to_vec()),
                Transaction::new("C", "D", b"vote2".to_vec()),
            ],
            35293,
            Hash256::new([3; 32]),
        )
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.proof, GENESIS_PROOF);
        assert!(genesis.transactions.is_empty());
    }

    #[test]
    fn test_block_serialization() {
        let block = sample_block();
        let deserialized = Block::deserialize(&block.serialize()).unwrap();
        assert_eq!(block, deserialized);
    }

    #[test]
    fn test_block_hash_is_pure() {
        let block = sample_block();
        assert_eq!(block.hash(), block.clone().hash());
    }

    #[test]
    fn test_block_hash_changes_with_any_field() {
        let base = sample_block();
        let base_hash = base.hash();

        let mut changed = base.clone();
        changed.index += 1;
        assert_ne!(changed.hash(), base_hash);

        let mut changed = base.clone();
        changed.timestamp += 1;
        assert_ne!(changed.hash(), base_hash);

        let mut changed = base.clone();
        changed.proof += 1;
        assert_ne!(changed.hash(), base_hash);

        let mut changed = base.clone();
        changed.previous_hash = Hash256::zero();
        assert_ne!(changed.hash(), base_hash);

        let mut changed = base.clone();
        changed.transactions[0].payload = b"vote3".to_vec();
        assert_ne!(changed.hash(), base_hash);
    }

    #[test]
    fn test_block_hash_depends_on_transaction_order() {
        let base = sample_block();
        let mut swapped = base.clone();
        swapped.transactions.swap(0, 1);
        assert_ne!(base.hash(), swapped.hash());
    }

    #[test]
    fn test_json_view_alongside_canonical_encoding() {
        let block = sample_block();
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["index"], 2);
        assert_eq!(json["previous_hash"], Hash256::new([3; 32]).to_hex());

        let from_json: Block = serde_json::from_value(json).unwrap();
        assert_eq!(from_json.serialize(), block.serialize());
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let mut bytes = sample_block().serialize();
        bytes.push(0);
        assert!(Block::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_deserialize_rejects_truncated() {
        let bytes = sample_block().serialize();
        assert!(Block::deserialize(&bytes[..bytes.len() - 1]).is_err());
    }
}
