// Tracker - rendezvous directory for nodes

use crate::config::TrackerConfig;
use crate::network::{AttendanceReply, Frame, FrameWriter, Message, NetworkError, Peer, PeerEntry, PONG};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type ConnectionId = u64;

/// What the per-connection readers report to the registry task
#[derive(Debug)]
enum TrackerEvent {
    Line(ConnectionId, String),
    Closed(ConnectionId, Option<NetworkError>),
}

/// A monitored connection and, once it announced itself, its directory entry
struct Connection {
    addr: SocketAddr,
    writer: FrameWriter,
    reader_task: JoinHandle<()>,
    entry: Option<PeerEntry>,
}

/// The directory. Only the registry loop touches it.
struct Registry {
    connections: BTreeMap<ConnectionId, Connection>,
    reply_timeout: Duration,
}

impl Registry {
    fn new(reply_timeout: Duration) -> Self {
        Self {
            connections: BTreeMap::new(),
            reply_timeout,
        }
    }

    /// Registered entries in connection order, requester included
    fn attendance(&self) -> Vec<PeerEntry> {
        self.connections
            .values()
            .filter_map(|conn| conn.entry.clone())
            .collect()
    }

    fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(&id)?;
        conn.reader_task.abort();
        Some(conn)
    }

    /// Write one line to a connection. A write that fails or does not
    /// finish within `reply_timeout` drops the connection.
    async fn reply(&mut self, id: ConnectionId, line: &str) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        let result = tokio::time::timeout(self.reply_timeout, conn.writer.send_line(line))
            .await
            .unwrap_or_else(|_| Err(NetworkError::Timeout(format!("reply to {}", conn.addr))));
        if let Err(e) = result {
            log::warn!("Dropping {} after failed reply: {}", conn.addr, e);
            self.remove(id);
        }
    }

    async fn handle_line(&mut self, id: ConnectionId, line: String) {
        let Some(addr) = self.connections.get(&id).map(|c| c.addr) else {
            return;
        };

        let frame = match Frame::parse(&line) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Failed to decode message from {}: {}", addr, e);
                return;
            }
        };

        match frame {
            Frame::Message(Message::ExistenceNotification(payload)) => {
                let entry = PeerEntry::from(payload);
                log::info!("{} registered as {}", addr, entry.address());
                if let Some(conn) = self.connections.get_mut(&id) {
                    conn.entry = Some(entry);
                }
            }
            Frame::Message(Message::AttendanceRequest) => {
                let reply = AttendanceReply { payload: self.attendance() };
                log::debug!("Attendance for {}: {} entries", addr, reply.payload.len());
                match serde_json::to_string(&reply) {
                    Ok(json) => self.reply(id, &json).await,
                    Err(e) => log::error!("Failed to encode attendance: {}", e),
                }
            }
            Frame::Message(Message::Disconnect) => {
                if let Some(mut conn) = self.remove(id) {
                    conn.writer.shutdown().await;
                    log::info!("Client {} disconnected", addr);
                }
            }
            Frame::Message(other) => {
                log::debug!("Ignoring {} from {}", other.message_type(), addr);
            }
            Frame::Ping => self.reply(id, PONG).await,
            Frame::Pong => {}
            Frame::Legacy(command) => {
                log::info!("Relaying {:?} from client {}", command.verb, command.client_id);
                self.relay(id, &line).await;
            }
        }
    }

    /// Forward a raw line to every connection except its sender
    async fn relay(&mut self, sender: ConnectionId, line: &str) {
        let targets: Vec<ConnectionId> = self
            .connections
            .keys()
            .copied()
            .filter(|id| *id != sender)
            .collect();
        for id in targets {
            self.reply(id, line).await;
        }
    }
}

/// Rendezvous service. All registry state lives on one task; accepts and
/// reads only forward events to it.
pub struct Tracker {
    listener: TcpListener,
    local_addr: SocketAddr,
    reply_timeout: Duration,
}

impl Tracker {
    /// Bind the listening socket
    pub async fn bind(config: &TrackerConfig) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|e| NetworkError::Bind(format!("{}: {}", config.listen, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NetworkError::Bind(e.to_string()))?;

        Ok(Self {
            listener,
            local_addr,
            reply_timeout: config.reply_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the task is dropped
    pub async fn run(self) {
        log::info!("Tracker running and listening on {}", self.local_addr);

        let (events, mut inbox) = mpsc::unbounded_channel();
        let mut registry = Registry::new(self.reply_timeout);
        let mut next_id: ConnectionId = 0;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        log::info!("Connected by {}", addr);
                        let id = next_id;
                        next_id += 1;

                        let (_, mut reader, writer) = Peer::new(stream, addr).into_split();
                        let events = events.clone();
                        let reader_task = tokio::spawn(async move {
                            loop {
                                match reader.next_line().await {
                                    Ok(Some(line)) => {
                                        if events.send(TrackerEvent::Line(id, line)).is_err() {
                                            break;
                                        }
                                    }
                                    Ok(None) => {
                                        let _ = events.send(TrackerEvent::Closed(id, None));
                                        break;
                                    }
                                    Err(NetworkError::Decode(e)) => {
                                        log::warn!("Dropping undecodable frame from {}: {}", addr, e);
                                    }
                                    Err(e) => {
                                        let _ = events.send(TrackerEvent::Closed(id, Some(e)));
                                        break;
                                    }
                                }
                            }
                        });

                        registry.connections.insert(id, Connection {
                            addr,
                            writer,
                            reader_task,
                            entry: None,
                        });
                    }
                    Err(e) => log::warn!("Failed to accept connection: {}", e),
                },
                Some(event) = inbox.recv() => match event {
                    TrackerEvent::Line(id, line) => registry.handle_line(id, line).await,
                    TrackerEvent::Closed(id, reason) => {
                        if let Some(conn) = registry.remove(id) {
                            match reason {
                                Some(e) => log::warn!("Connection with {} dropped: {}", conn.addr, e),
                                None => log::info!("Removed client {}", conn.addr),
                            }
                        }
                    }
                },
            }
        }
    }
}
