// Transaction and chain validation

use crate::core::{Block, Credential, Transaction, hash160};
use crate::consensus::pow::ProofOfWork;
use crate::error::{IntegrityError, IntegrityKind, TransactionError};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, VerifyOnly};

/// Pluggable validity predicate for pending transactions
pub trait TransactionRule: Send + Sync {
    fn check(&self, tx: &Transaction) -> Result<(), TransactionError>;
}

impl<F> TransactionRule for F
where
    F: Fn(&Transaction) -> Result<(), TransactionError> + Send + Sync,
{
    fn check(&self, tx: &Transaction) -> Result<(), TransactionError> {
        self(tx)
    }
}

/// Sender, recipient and payload must all be present
#[derive(Debug, Clone, Copy, Default)]
pub struct WellFormedRule;

impl TransactionRule for WellFormedRule {
    fn check(&self, tx: &Transaction) -> Result<(), TransactionError> {
        if tx.sender.trim().is_empty() {
            return Err(TransactionError::MissingField("sender"));
        }
        if tx.recipient.trim().is_empty() {
            return Err(TransactionError::MissingField("recipient"));
        }
        if tx.payload.is_empty() {
            return Err(TransactionError::MissingField("payload"));
        }
        Ok(())
    }
}

/// Sender id for a serialized public key: hex(RIPEMD160(SHA256(pubkey)))
pub fn sender_id(public_key: &[u8]) -> String {
    hex::encode(hash160(public_key))
}

/// Requires a secp256k1 credential whose key hashes to the sender
/// and whose signature covers the transaction's signing digest
pub struct SignatureRule {
    secp: Secp256k1<VerifyOnly>,
}

impl SignatureRule {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for SignatureRule {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionRule for SignatureRule {
    fn check(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let credential = tx.credential.as_ref().ok_or(TransactionError::MissingCredential)?;

        let public_key = PublicKey::from_slice(&credential.public_key)
            .map_err(|_| TransactionError::BadPublicKey)?;

        if sender_id(&credential.public_key) != tx.sender {
            return Err(TransactionError::SenderMismatch);
        }

        let signature = Signature::from_compact(&credential.signature)
            .map_err(|_| TransactionError::BadSignature)?;
        let message = Message::from_digest(*tx.signing_digest().as_bytes());

        self.secp
            .verify_ecdsa(&message, &signature, &public_key)
            .map_err(|_| TransactionError::BadSignature)
    }
}

/// Attach a compact ECDSA credential made with `secret_key`
pub fn sign_transaction(tx: Transaction, secret_key: &SecretKey) -> Transaction {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(*tx.signing_digest().as_bytes());
    let signature = secp.sign_ecdsa(&message, secret_key);
    let public_key = secret_key.public_key(&secp);

    tx.with_credential(Credential::new(
        public_key.serialize().to_vec(),
        signature.serialize_compact().to_vec(),
    ))
}

/// Every contained rule must pass; the first failure is reported
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn TransactionRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with(mut self, rule: impl TransactionRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Well-formedness, plus signatures when `require_signatures` is set
    pub fn standard(require_signatures: bool) -> Self {
        let rules = Self::new().with(WellFormedRule);
        if require_signatures {
            rules.with(SignatureRule::new())
        } else {
            rules
        }
    }
}

impl TransactionRule for RuleSet {
    fn check(&self, tx: &Transaction) -> Result<(), TransactionError> {
        self.rules.iter().try_for_each(|rule| rule.check(tx))
    }
}

/// Chain validator
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainValidator {
    pow: ProofOfWork,
}

impl ChainValidator {
    pub fn new(pow: ProofOfWork) -> Self {
        Self { pow }
    }

    /// Walk the chain from genesis and report the first violation
    pub fn validate_chain(&self, chain: &[Block]) -> Result<(), IntegrityError> {
        let genesis = chain
            .first()
            .ok_or(IntegrityError::new(0, IntegrityKind::EmptyChain))?;

        if !genesis.is_genesis() {
            return Err(IntegrityError::new(genesis.index, IntegrityKind::BadGenesis));
        }

        for pair in chain.windows(2) {
            let (prev, block) = (&pair[0], &pair[1]);

            if block.index != prev.index + 1 {
                return Err(IntegrityError::new(block.index, IntegrityKind::IndexGap));
            }
            if block.previous_hash != prev.hash() {
                return Err(IntegrityError::new(block.index, IntegrityKind::BrokenLink));
            }
            if !self.pow.is_valid(prev.proof, block.proof) {
                return Err(IntegrityError::new(block.index, IntegrityKind::InvalidProof));
            }
        }

        Ok(())
    }

    pub fn is_valid(&self, chain: &[Block]) -> bool {
        self.validate_chain(chain).is_ok()
    }
}
