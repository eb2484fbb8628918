// Network protocol messages

use crate::core::Transaction;
use crate::network::NetworkError;
use crate::storage::Blockchain;
use serde::{Deserialize, Serialize};

/// Liveness probe understood by trackers and nodes
pub const PING: &str = "PING";
/// Answer to [`PING`]
pub const PONG: &str = "PONG";

/// Payload of an existence notification: where the sender accepts peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistencePayload {
    #[serde(rename = "IP")]
    pub ip: String,
    pub port: u16,
}

/// One entry of the tracker's attendance list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerEntry {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "Port")]
    pub port: u16,
}

impl PeerEntry {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// Node address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Does `recipient` name this entry? A full `host:port` must match
    /// exactly; a bare host matches on the host part.
    pub fn matches(&self, recipient: &str) -> bool {
        self.address() == recipient || self.ip == recipient
    }
}

impl From<ExistencePayload> for PeerEntry {
    fn from(payload: ExistencePayload) -> Self {
        Self { ip: payload.ip, port: payload.port }
    }
}

/// Reply to an attendance request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceReply {
    pub payload: Vec<PeerEntry>,
}

/// Network message, discriminated by `msg_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", content = "payload")]
pub enum Message {
    #[serde(rename = "existence notification")]
    ExistenceNotification(ExistencePayload),
    #[serde(rename = "attendance request")]
    AttendanceRequest,
    #[serde(rename = "disconnect")]
    Disconnect,
    #[serde(rename = "transaction broadcast")]
    TransactionBroadcast(Transaction),
    #[serde(rename = "updated blockchain")]
    UpdatedBlockchain(Blockchain),
}

impl Message {
    /// Wire name of this message kind
    pub fn message_type(&self) -> &'static str {
        match self {
            Message::ExistenceNotification(_) => "existence notification",
            Message::AttendanceRequest => "attendance request",
            Message::Disconnect => "disconnect",
            Message::TransactionBroadcast(_) => "transaction broadcast",
            Message::UpdatedBlockchain(_) => "updated blockchain",
        }
    }

    /// Serialize to compact JSON (no trailing newline)
    pub fn to_json(&self) -> Result<String, NetworkError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Verb of a legacy plain-text command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyVerb {
    Send,
    Request,
}

/// Plain-text command sent by old console clients:
/// `"<send|request> <recipientId> <amount> <clientId>"`
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyCommand {
    pub verb: LegacyVerb,
    pub recipient: String,
    pub amount: f64,
    pub client_id: String,
}

impl LegacyCommand {
    /// Accepts exactly four fields, a known verb and a positive amount
    pub fn parse(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        let [verb, recipient, amount, client_id] = parts.as_slice() else {
            return None;
        };
        let verb = match *verb {
            "send" => LegacyVerb::Send,
            "request" => LegacyVerb::Request,
            _ => return None,
        };
        let amount: f64 = amount.parse().ok()?;
        if !(amount > 0.0) {
            return None;
        }
        Some(Self {
            verb,
            recipient: recipient.to_string(),
            amount,
            client_id: client_id.to_string(),
        })
    }
}

/// Anything that can arrive on a connection
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(Message),
    Ping,
    Pong,
    Legacy(LegacyCommand),
}

impl Frame {
    /// Classify one received line
    pub fn parse(line: &str) -> Result<Frame, NetworkError> {
        let text = line.trim();
        match text {
            PING => return Ok(Frame::Ping),
            PONG => return Ok(Frame::Pong),
            _ => {}
        }
        if text.starts_with('{') {
            return Ok(Frame::Message(serde_json::from_str(text)?));
        }
        LegacyCommand::parse(text)
            .map(Frame::Legacy)
            .ok_or_else(|| NetworkError::Decode(format!("Unrecognized frame: {:?}", truncate(text))))
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(64) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
