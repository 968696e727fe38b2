// Consensus: proof of work, validation, conflict resolution

pub mod pow;
pub mod validation;
pub mod resolver;

pub use pow::{Difficulty, MiningResult, ProofOfWork, proof_digest};
pub use validation::{
    ChainValidator, RuleSet, SignatureRule, TransactionRule, WellFormedRule, sender_id,
    sign_transaction,
};
pub use resolver::{Candidate, ChainSnapshot, ChainSource, ConsensusResolver, select_longest};
