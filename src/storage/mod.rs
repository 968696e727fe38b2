// Chain snapshot storage

mod chain_store;

pub use chain_store::ChainStore;
