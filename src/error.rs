// Error types for the ledger engine

use std::fmt;

/// Why a single transaction was judged invalid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// A required field is empty
    MissingField(&'static str),
    /// A signature rule is active but no credential was supplied
    MissingCredential,
    /// The credential's public key does not parse
    BadPublicKey,
    /// The public key does not hash to the sender id
    SenderMismatch,
    /// The signature does not verify over the signing digest
    BadSignature,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransactionError::MissingField(field) => write!(f, "Missing field: {}", field),
            TransactionError::MissingCredential => write!(f, "Missing signing credential"),
            TransactionError::BadPublicKey => write!(f, "Malformed public key"),
            TransactionError::SenderMismatch => write!(f, "Public key does not match sender"),
            TransactionError::BadSignature => write!(f, "Invalid signature"),
        }
    }
}

impl std::error::Error for TransactionError {}

/// Structural violation found while walking a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityKind {
    /// Chain has no blocks
    EmptyChain,
    /// First block is not in genesis form
    BadGenesis,
    /// Block index does not follow its predecessor
    IndexGap,
    /// previous_hash does not match the predecessor's hash
    BrokenLink,
    /// Proof does not satisfy the difficulty relative to the predecessor's proof
    InvalidProof,
    /// Advertised length disagrees with the blocks supplied
    LengthMismatch,
}

/// First integrity violation in a candidate chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityError {
    /// Index of the offending block (0 when the chain is empty)
    pub index: u64,
    pub kind: IntegrityKind,
}

impl IntegrityError {
    pub fn new(index: u64, kind: IntegrityKind) -> Self {
        Self { index, kind }
    }
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let what = match self.kind {
            IntegrityKind::EmptyChain => "chain is empty",
            IntegrityKind::BadGenesis => "malformed genesis block",
            IntegrityKind::IndexGap => "non-sequential index",
            IntegrityKind::BrokenLink => "previous_hash mismatch",
            IntegrityKind::InvalidProof => "invalid proof of work",
            IntegrityKind::LengthMismatch => "length does not match block count",
        };
        write!(f, "{} at block {}", what, self.index)
    }
}

impl std::error::Error for IntegrityError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Caller supplied a structurally incomplete transaction
    InvalidTransaction(TransactionError),
    /// Peer address could not be parsed
    InvalidPeerAddress(String),
    /// Mining refused: pool is empty or holds no admissible transaction
    PoolEmptyOrInvalid,
    /// Candidate chain failed validation
    ChainIntegrity(IntegrityError),
    /// Chain advanced between proof search and commit
    StaleTip,
    /// Proof search stopped by shutdown
    MiningCancelled,
    /// Peer fetch failed or timed out
    PeerUnreachable { peer: String, reason: String },
    Network(String),
    /// A remote node refused a request
    Rejected(String),
    Storage(String),
    Encoding(String),
    Config(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::InvalidTransaction(e) => write!(f, "Invalid transaction: {}", e),
            LedgerError::InvalidPeerAddress(msg) => write!(f, "Invalid peer address: {}", msg),
            LedgerError::PoolEmptyOrInvalid => {
                write!(f, "Transaction pool is empty or holds no valid transactions")
            }
            LedgerError::ChainIntegrity(e) => write!(f, "Chain integrity error: {}", e),
            LedgerError::StaleTip => write!(f, "Chain advanced during proof search"),
            LedgerError::MiningCancelled => write!(f, "Mining cancelled"),
            LedgerError::PeerUnreachable { peer, reason } => {
                write!(f, "Peer {} unreachable: {}", peer, reason)
            }
            LedgerError::Network(msg) => write!(f, "Network error: {}", msg),
            LedgerError::Rejected(msg) => write!(f, "Request rejected: {}", msg),
            LedgerError::Storage(msg) => write!(f, "Storage error: {}", msg),
            LedgerError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            LedgerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<TransactionError> for LedgerError {
    fn from(err: TransactionError) -> Self {
        LedgerError::InvalidTransaction(err)
    }
}

impl From<IntegrityError> for LedgerError {
    fn from(err: IntegrityError) -> Self {
        LedgerError::ChainIntegrity(err)
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Encoding(err.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = LedgerError::ChainIntegrity(IntegrityError::new(3, IntegrityKind::BrokenLink));
        assert_eq!(err.to_string(), "Chain integrity error: previous_hash mismatch at block 3");

        let err: LedgerError = TransactionError::MissingField("sender").into();
        assert_eq!(err.to_string(), "Invalid transaction: Missing field: sender");
    }
}
