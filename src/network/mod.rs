// P2P networking

mod error;
mod message;
mod miner;
mod node;
mod peer;
mod tracker;

pub use error::{NetworkError, TransactionError};
pub use message::{
    AttendanceReply, ExistencePayload, Frame, LegacyCommand, LegacyVerb, Message, PeerEntry, PING, PONG,
};
pub use node::{BroadcastReport, Node, NodeStatus};
pub use peer::{FrameReader, FrameWriter, MAX_FRAME_LEN, Peer, PeerInfo};
pub use tracker::Tracker;
