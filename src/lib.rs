// Peer-to-peer proof-of-work ledger

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod network;
pub mod storage;

// Re-exports for convenience
pub use cli::{Cli, CliHandler};
pub use config::{ConsensusParams, NodeConfig, TrackerConfig};
pub use consensus::{BlockValidator, Miner, ValidationError};
pub use core::{Block, Hash256, Transaction};
pub use network::{Message, NetworkError, Node, Peer, PeerEntry, Tracker, TransactionError};
pub use storage::{Blockchain, ChainState, Mempool};
