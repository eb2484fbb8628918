// Network and request errors

use crate::storage::StoreClosed;
use std::fmt;

/// Transport-level failures. Only `Bind` is fatal; everything else is
/// logged and the affected peer or frame is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Could not bind a listening socket
    Bind(String),
    /// Peer or tracker unreachable, or the connection broke
    Connection(String),
    /// Malformed frame or payload
    Decode(String),
    /// A connect, send or round trip ran out of time
    Timeout(String),
    /// No live tracker connection
    TrackerUnavailable,
    /// The remote side closed the connection
    Closed,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkError::Bind(msg) => write!(f, "Failed to bind: {}", msg),
            NetworkError::Connection(msg) => write!(f, "Connection error: {}", msg),
            NetworkError::Decode(msg) => write!(f, "Decode error: {}", msg),
            NetworkError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            NetworkError::TrackerUnavailable => write!(f, "No tracker connection"),
            NetworkError::Closed => write!(f, "Connection closed by peer"),
        }
    }
}

impl std::error::Error for NetworkError {}

impl From<serde_json::Error> for NetworkError {
    fn from(e: serde_json::Error) -> Self {
        NetworkError::Decode(e.to_string())
    }
}

/// Reasons a transaction request is refused. Always reported back to the
/// requester.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionError {
    /// Amount is not a positive number
    InvalidAmount(f64),
    /// Amount plus miner reward exceeds the sender's balance
    InsufficientFunds { required: f64, available: f64 },
    /// Recipient is not in the tracker's attendance list
    RecipientNotFound(String),
    /// Node is disconnected from the network
    Inactive,
    /// Chain state could not be read
    Unavailable,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransactionError::InvalidAmount(amount) => {
                write!(f, "Invalid amount {}: must be greater than zero", amount)
            }
            TransactionError::InsufficientFunds { required, available } => {
                write!(f, "Insufficient funds: required {}, available {}", required, available)
            }
            TransactionError::RecipientNotFound(recipient) => {
                write!(f, "Recipient not found or not available: {}", recipient)
            }
            TransactionError::Inactive => write!(f, "Node is not connected to the network"),
            TransactionError::Unavailable => write!(f, "Chain state unavailable"),
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<StoreClosed> for TransactionError {
    fn from(_: StoreClosed) -> Self {
        TransactionError::Unavailable
    }
}
