// Chain store using sled

use crate::consensus::ChainValidator;
use crate::core::{Block, Serializable};
use crate::error::{IntegrityError, IntegrityKind, LedgerError, Result};
use sled::Db;
use std::path::Path;

/// Persists a node's chain as one record per block plus a height record
pub struct ChainStore {
    db: Db,
}

impl ChainStore {
    /// Open (or create) a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            LedgerError::Storage(format!("Failed to open {}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db })
    }

    /// Create an in-memory store (for testing)
    pub fn memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Overwrite the stored chain with `blocks`
    pub fn save(&self, blocks: &[Block]) -> Result<()> {
        let mut batch = sled::Batch::default();

        // drop blocks beyond the new height
        let old_height = self.height()?;
        for index in (blocks.len() as u64 + 1)..=old_height {
            batch.remove(Self::block_key(index).to_vec());
        }

        for block in blocks {
            batch.insert(Self::block_key(block.index).to_vec(), block.serialize());
        }
        batch.insert(b"height".to_vec(), (blocks.len() as u64).to_le_bytes().to_vec());

        self.db.apply_batch(batch)?;
        self.db.flush()?;

        log::debug!("Saved chain of length {}", blocks.len());
        Ok(())
    }

    /// Stored chain height (0 if nothing has been saved)
    pub fn height(&self) -> Result<u64> {
        match self.db.get(b"height")? {
            Some(data) => {
                let bytes: [u8; 8] = data[..]
                    .try_into()
                    .map_err(|_| LedgerError::Storage(format!("Invalid height record length: {}", data.len())))?;
                Ok(u64::from_le_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Load the stored chain, or `None` if the store is empty
    pub fn load(&self) -> Result<Option<Vec<Block>>> {
        let height = self.height()?;
        if height == 0 {
            return Ok(None);
        }

        let mut blocks = Vec::with_capacity(height as usize);
        for index in 1..=height {
            let data = self
                .db
                .get(Self::block_key(index))?
                .ok_or(IntegrityError::new(index, IntegrityKind::IndexGap))?;
            let block = Block::deserialize(&data).map_err(LedgerError::Storage)?;
            blocks.push(block);
        }

        Ok(Some(blocks))
    }

    /// Load and validate the stored chain
    pub fn load_valid(&self, validator: &ChainValidator) -> Result<Option<Vec<Block>>> {
        match self.load()? {
            Some(blocks) => {
                validator.validate_chain(&blocks)?;
                Ok(Some(blocks))
            }
            None => Ok(None),
        }
    }

    // Helper: key for a block record
    fn block_key(index: u64) -> [u8; 9] {
        let mut key = [0u8; 9];
        key[0] = b'b'; // 'b' for block
        key[1..].copy_from_slice(&index.to_be_bytes());
        key
    }
}
