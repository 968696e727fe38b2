// Peer networking

mod client;
mod message;
mod peer;
mod registry;
mod server;

pub use client::NodeClient;
pub use message::{Message, MessageType, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use peer::{Peer, TcpChainSource};
pub use registry::{NodeRegistry, PeerAddress, DEFAULT_PORT};
pub use server::ChainServer;
