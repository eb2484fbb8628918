// Network node - tracker registration, peer gossip and the public operations

use crate::config::{ConsensusParams, NodeConfig};
use crate::core::Transaction;
use crate::network::miner;
use crate::network::{
    AttendanceReply, ExistencePayload, Frame, FrameReader, FrameWriter, Message, NetworkError,
    Peer, PeerEntry, PeerInfo, TransactionError, PONG,
};
use crate::storage::{Blockchain, CandidateOutcome, ChainHandle, ChainState, Mempool, StoreClosed};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};

/// Persistent connection to the tracker
struct TrackerLink {
    reader: FrameReader,
    writer: FrameWriter,
}

impl TrackerLink {
    async fn attendance(&mut self) -> Result<Vec<PeerEntry>, NetworkError> {
        self.writer.send_message(&Message::AttendanceRequest).await?;
        // The tracker may also relay unrelated frames on this link
        loop {
            let line = match self.reader.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Err(NetworkError::Closed),
                Err(NetworkError::Decode(e)) => {
                    log::debug!("Skipping undecodable tracker frame: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match serde_json::from_str::<AttendanceReply>(&line) {
                Ok(reply) => return Ok(reply.payload),
                Err(_) => log::debug!("Skipping unsolicited tracker frame: {}", line),
            }
        }
    }
}

/// Snapshot of a node for status displays
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub address: String,
    pub active: bool,
    pub syncing: bool,
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub inbound_peers: usize,
}

/// Outcome of one broadcast round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Everything a node's tasks share. Built once in [`Node::start`].
struct NodeContext {
    config: NodeConfig,
    /// `host:port` this node is known by on the network
    address: String,
    local_addr: SocketAddr,
    chain: ChainHandle,
    mempool: Mempool,
    active: AtomicBool,
    /// Stops the miner, including a proof-of-work search in progress
    stop: Arc<AtomicBool>,
    tracker: Mutex<Option<TrackerLink>>,
    /// Attendance list from the last successful tracker query
    known_peers: RwLock<Vec<PeerEntry>>,
    /// Open inbound connections
    inbound: RwLock<HashMap<SocketAddr, PeerInfo>>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    miner_task: Mutex<Option<JoinHandle<()>>>,
}

/// Network node
#[derive(Clone)]
pub struct Node {
    ctx: Arc<NodeContext>,
}

impl Node {
    /// Bind the peer listener, start the miner and register with the
    /// tracker. Only a failed bind is an error; an unreachable tracker
    /// leaves the node running but undiscoverable.
    pub async fn start(config: NodeConfig) -> Result<Node, NetworkError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|e| NetworkError::Bind(format!("{}: {}", config.listen, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NetworkError::Bind(e.to_string()))?;
        let address = format!("{}:{}", config.advertise_host, local_addr.port());

        let chain = ChainHandle::spawn(ChainState::new(config.consensus.difficulty));
        let (mempool, mempool_rx) = Mempool::new();

        let node = Node {
            ctx: Arc::new(NodeContext {
                config,
                address,
                local_addr,
                chain,
                mempool,
                active: AtomicBool::new(false),
                stop: Arc::new(AtomicBool::new(false)),
                tracker: Mutex::new(None),
                known_peers: RwLock::new(Vec::new()),
                inbound: RwLock::new(HashMap::new()),
                listener_task: Mutex::new(None),
                miner_task: Mutex::new(None),
            }),
        };

        log::info!("Node receiving on {} (address {})", local_addr, node.address());
        node.spawn_listener(listener).await;
        *node.ctx.miner_task.lock().await = Some(tokio::spawn(miner::run(node.clone(), mempool_rx)));

        if let Err(e) = node.register().await {
            log::error!("Could not register with tracker {}: {}", node.ctx.config.tracker, e);
        }

        Ok(node)
    }

    /// This node's network address (`host:port`)
    pub fn address(&self) -> &str {
        &self.ctx.address
    }

    /// Socket the peer listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.ctx.local_addr
    }

    pub fn consensus(&self) -> ConsensusParams {
        self.ctx.config.consensus
    }

    pub fn is_active(&self) -> bool {
        self.ctx.active.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        self.ctx.stop.clone()
    }

    pub(crate) fn chain_handle(&self) -> &ChainHandle {
        &self.ctx.chain
    }

    pub(crate) fn mempool_poll(&self) -> std::time::Duration {
        self.ctx.config.mempool_poll
    }

    // ---- listener --------------------------------------------------------

    async fn spawn_listener(&self, listener: TcpListener) {
        let node = self.clone();
        let task = tokio::spawn(async move { node.accept_loop(listener).await });
        *self.ctx.listener_task.lock().await = Some(task);
    }

    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    log::debug!("New connection from {}", addr);
                    let node = self.clone();
                    tokio::spawn(async move { node.handle_peer(Peer::new(stream, addr)).await });
                }
                Err(e) => {
                    log::warn!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// One handler per inbound connection
    async fn handle_peer(self, mut peer: Peer) {
        let addr = peer.addr();
        self.ctx.inbound.write().await.insert(addr, peer.info.clone());

        loop {
            match peer.receive_frame().await {
                Ok(Frame::Message(message)) => {
                    log::debug!("Received {} from {}", message.message_type(), addr);
                    if let Err(e) = self.handle_message(message, &mut peer).await {
                        log::warn!("Failed to handle message from {}: {}", addr, e);
                        break;
                    }
                }
                Ok(Frame::Ping) => {
                    if let Err(e) = peer.send_line(PONG).await {
                        log::warn!("Failed to answer ping from {}: {}", addr, e);
                        break;
                    }
                }
                Ok(Frame::Pong) => {}
                Ok(Frame::Legacy(command)) => {
                    log::debug!("Ignoring legacy {:?} command from {}", command.verb, addr);
                }
                Err(NetworkError::Decode(e)) => {
                    log::warn!("Dropping malformed frame from {}: {}", addr, e);
                }
                Err(NetworkError::Closed) => break,
                Err(e) => {
                    log::warn!("Connection with {} failed: {}", addr, e);
                    break;
                }
            }
        }

        self.ctx.inbound.write().await.remove(&addr);
    }

    async fn handle_message(&self, message: Message, peer: &mut Peer) -> Result<(), NetworkError> {
        match message {
            Message::TransactionBroadcast(transaction) => {
                log::info!("Queued transaction from peer: {}", transaction);
                if !self.ctx.mempool.push(transaction) {
                    log::warn!("Mempool closed; transaction dropped");
                }
            }
            Message::UpdatedBlockchain(candidate) => {
                self.receive_chain(candidate).await;
            }
            Message::AttendanceRequest => {
                // Peers get this node's local view of the network
                let payload = self.ctx.known_peers.read().await.clone();
                peer.send_json(&AttendanceReply { payload }).await?;
            }
            Message::ExistenceNotification(_) | Message::Disconnect => {
                log::debug!("Ignoring tracker-bound {} from {}", message.message_type(), peer.addr());
            }
        }
        Ok(())
    }

    async fn receive_chain(&self, candidate: Blockchain) {
        if let Err(e) = candidate.validate() {
            log::warn!("Received chain fails audit: {}", e);
        }
        let length = candidate.len();
        match self.ctx.chain.offer_candidate(candidate).await {
            Ok(CandidateOutcome::Adopted) => {
                log::info!("Replaced staged blockchain in {} ({} blocks)", self.address(), length)
            }
            Ok(CandidateOutcome::Shorter) => log::debug!("Ignored shorter chain ({} blocks)", length),
            Ok(CandidateOutcome::ForeignDifficulty(difficulty)) => log::warn!(
                "Ignored chain mined at difficulty {} (this node runs at {})",
                difficulty,
                self.consensus().difficulty
            ),
            Err(e) => log::error!("{}", e),
        }
    }

    // ---- tracker ---------------------------------------------------------

    /// Announce this node to the tracker over a fresh connection, retrying
    /// a bounded number of times.
    async fn register(&self) -> Result<(), NetworkError> {
        let attempts = self.ctx.config.registration_attempts.max(1);
        let mut last_error = NetworkError::TrackerUnavailable;

        for attempt in 1..=attempts {
            match self.notify_existence().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("Registration attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.ctx.config.registration_backoff).await;
            }
        }

        Err(last_error)
    }

    async fn notify_existence(&self) -> Result<(), NetworkError> {
        let config = &self.ctx.config;
        let peer = Peer::connect(config.tracker, config.tracker_timeout).await?;
        let (_, reader, mut writer) = peer.into_split();

        let payload = ExistencePayload {
            ip: config.advertise_host.clone(),
            port: self.ctx.local_addr.port(),
        };
        writer.send_message(&Message::ExistenceNotification(payload)).await?;

        *self.ctx.tracker.lock().await = Some(TrackerLink { reader, writer });
        self.ctx.active.store(true, Ordering::SeqCst);
        log::info!("Existence notification sent to tracker {}", config.tracker);
        Ok(())
    }

    /// Ask the tracker who is online. Failures are logged and yield an
    /// empty list.
    pub async fn request_attendance(&self) -> Vec<PeerEntry> {
        match self.query_tracker().await {
            Ok(peers) => {
                if peers.is_empty() {
                    log::info!("No nodes are currently active");
                }
                *self.ctx.known_peers.write().await = peers.clone();
                peers
            }
            Err(e) => {
                log::warn!("Attendance request failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn query_tracker(&self) -> Result<Vec<PeerEntry>, NetworkError> {
        let mut guard = self.ctx.tracker.lock().await;
        let link = guard.as_mut().ok_or(NetworkError::TrackerUnavailable)?;
        let timeout = self.ctx.config.tracker_timeout;

        let result = tokio::time::timeout(timeout, link.attendance())
            .await
            .unwrap_or_else(|_| Err(NetworkError::Timeout("attendance request".to_string())));

        if result.is_err() {
            // A half-read exchange would desynchronize later replies. Without
            // the link the node is off the network until `reconnect`.
            *guard = None;
            self.ctx.active.store(false, Ordering::SeqCst);
            log::warn!("Tracker link dropped; reconnect to rejoin the network");
        }
        result
    }

    /// Last attendance list fetched from the tracker
    pub async fn known_peers(&self) -> Vec<PeerEntry> {
        self.ctx.known_peers.read().await.clone()
    }

    // ---- gossip ----------------------------------------------------------

    /// Send `message` to every listed peer except this node. Each target
    /// gets its own connection and `broadcast_timeout`; failures are logged
    /// and never stop the rest of the round.
    pub async fn broadcast(&self, peers: &[PeerEntry], message: &Message) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let line = match message.to_json() {
            Ok(line) => Arc::new(line),
            Err(e) => {
                log::error!("Failed to encode {}: {}", message.message_type(), e);
                return report;
            }
        };

        let timeout = self.ctx.config.broadcast_timeout;
        let mut sends = JoinSet::new();
        for entry in peers.iter().filter(|entry| entry.address() != self.address()) {
            let entry = entry.clone();
            let line = line.clone();
            sends.spawn(async move {
                let result = tokio::time::timeout(timeout, async {
                    let mut peer = Peer::connect_host(&entry.ip, entry.port, timeout).await?;
                    peer.send_line(&line).await?;
                    peer.shutdown().await;
                    Ok::<(), NetworkError>(())
                })
                .await
                .unwrap_or_else(|_| Err(NetworkError::Timeout(format!("send to {}", entry.address()))));
                (entry, result)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((entry, Err(e))) => {
                    log::warn!("Failed to send data to {}: {}", entry.address(), e);
                    report.failed += 1;
                }
                Err(e) => {
                    log::error!("Broadcast task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        log::debug!("Broadcast {}: {:?}", message.message_type(), report);
        report
    }

    // ---- public operations -----------------------------------------------

    /// Balance of `address` according to this node's primary chain
    pub async fn balance(&self, address: &str) -> Result<f64, StoreClosed> {
        self.ctx
            .chain
            .balance(address, self.ctx.config.consensus.initial_balance)
            .await
    }

    /// This node's own balance
    pub async fn own_balance(&self) -> Result<f64, StoreClosed> {
        self.balance(self.address()).await
    }

    /// Queue a transfer to `recipient` and gossip it. `recipient` is a
    /// `host:port` address or a bare host from the attendance list; this
    /// node itself is never a valid recipient.
    pub async fn submit_transaction(&self, amount: f64, recipient: &str) -> Result<Transaction, TransactionError> {
        if !self.is_active() {
            return Err(TransactionError::Inactive);
        }
        if !(amount > 0.0) || !amount.is_finite() {
            return Err(TransactionError::InvalidAmount(amount));
        }

        let available = self.own_balance().await?;
        let required = self.consensus().transfer_cost(amount);
        if required > available {
            return Err(TransactionError::InsufficientFunds { required, available });
        }

        let peers = self.request_attendance().await;
        let payee = peers
            .iter()
            .filter(|entry| entry.address() != self.address())
            .find(|entry| entry.matches(recipient))
            .ok_or_else(|| TransactionError::RecipientNotFound(recipient.to_string()))?;

        let transaction = Transaction::new(amount, self.address(), payee.address());
        if !self.ctx.mempool.push(transaction.clone()) {
            return Err(TransactionError::Unavailable);
        }

        let report = self
            .broadcast(&peers, &Message::TransactionBroadcast(transaction.clone()))
            .await;
        log::info!(
            "Transaction {} queued and broadcast to {} peers ({} failed)",
            transaction,
            report.delivered,
            report.failed
        );

        Ok(transaction)
    }

    /// Leave the network: tell the tracker and drop the link. The peer
    /// listener keeps running.
    pub async fn disconnect(&self) {
        self.ctx.active.store(false, Ordering::SeqCst);

        let Some(mut link) = self.ctx.tracker.lock().await.take() else {
            log::warn!("No tracker connection found");
            return;
        };
        match link.writer.send_message(&Message::Disconnect).await {
            Ok(()) => log::info!("Sent disconnect message to tracker"),
            Err(e) => log::warn!("Error sending disconnect message: {}", e),
        }
        link.writer.shutdown().await;
        log::info!("Tracker connection closed");
    }

    /// Rejoin after [`disconnect`](Self::disconnect): restart the listener
    /// if it died and announce this node again.
    pub async fn reconnect(&self) -> Result<(), NetworkError> {
        if self.is_active() {
            log::info!("Node is already connected");
            return Ok(());
        }

        let listener_alive = self
            .ctx
            .listener_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        if !listener_alive {
            let listener = TcpListener::bind(self.ctx.local_addr)
                .await
                .map_err(|e| NetworkError::Bind(format!("{}: {}", self.ctx.local_addr, e)))?;
            self.spawn_listener(listener).await;
            log::info!("Listener restarted on {}", self.ctx.local_addr);
        }

        self.ctx.active.store(true, Ordering::SeqCst);
        if let Err(e) = self.register().await {
            self.ctx.active.store(false, Ordering::SeqCst);
            return Err(e);
        }
        log::info!("Node reconnected successfully");
        Ok(())
    }

    pub async fn status(&self) -> Result<NodeStatus, StoreClosed> {
        let chain = self.ctx.chain.status().await?;
        Ok(NodeStatus {
            address: self.address().to_string(),
            active: self.is_active(),
            syncing: chain.syncing,
            chain_length: chain.primary_len,
            pending_transactions: self.ctx.mempool.len(),
            inbound_peers: self.ctx.inbound.read().await.len(),
        })
    }

    /// Copy of the primary chain
    pub async fn chain(&self) -> Result<Blockchain, StoreClosed> {
        self.ctx.chain.snapshot().await
    }

    pub async fn inbound_peers(&self) -> Vec<PeerInfo> {
        self.ctx.inbound.read().await.values().cloned().collect()
    }

    /// Stop mining and accepting peers, and leave the tracker
    pub async fn shutdown(&self) {
        self.ctx.stop.store(true, Ordering::SeqCst);
        if let Some(task) = self.ctx.listener_task.lock().await.take() {
            task.abort();
        }
        if self.is_active() {
            self.disconnect().await;
        }
        if let Some(task) = self.ctx.miner_task.lock().await.take() {
            if let Err(e) = task.await {
                log::error!("Miner task failed: {}", e);
            }
        }
        log::info!("Node {} stopped", self.address());
    }
}
