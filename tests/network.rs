// End-to-end tests: tracker, nodes and raw peers over loopback

use chimchain::config::{NodeConfig, TrackerConfig};
use chimchain::network::{
    AttendanceReply, ExistencePayload, Frame, Message, Node, Peer, PeerEntry, Tracker, TransactionError,
};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

const WAIT: Duration = Duration::from_secs(20);

async fn start_tracker() -> SocketAddr {
    let config = TrackerConfig::new("127.0.0.1:0".parse().unwrap());
    let tracker = Tracker::bind(&config).await.unwrap();
    let addr = tracker.local_addr();
    tokio::spawn(tracker.run());
    addr
}

async fn start_node(tracker: SocketAddr) -> Node {
    let mut config = NodeConfig::new("127.0.0.1:0".parse().unwrap(), tracker);
    config.consensus.difficulty = 2;
    config.mempool_poll = Duration::from_millis(20);
    let node = Node::start(config).await.unwrap();
    assert!(node.is_active());
    node
}

/// Poll `check` until it holds or `WAIT` runs out
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// A bare listener announced to the tracker, standing in for a remote node
struct FakePeer {
    listener: TcpListener,
    entry: PeerEntry,
    _registration: Peer,
}

impl FakePeer {
    async fn register(tracker: SocketAddr) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut registration = Peer::connect(tracker, Duration::from_secs(5)).await.unwrap();
        let payload = ExistencePayload { ip: "127.0.0.1".to_string(), port };
        registration.send_message(&Message::ExistenceNotification(payload)).await.unwrap();
        // Round trip so the announcement is processed before anyone looks us up
        registration.send_message(&Message::AttendanceRequest).await.unwrap();
        let _: AttendanceReply = registration.receive_json().await.unwrap();

        Self {
            listener,
            entry: PeerEntry::new("127.0.0.1", port),
            _registration: registration,
        }
    }

    /// Accept one connection and read the message it carries
    async fn next_message(&self) -> Message {
        let accepted = tokio::time::timeout(WAIT, self.listener.accept()).await.unwrap();
        let (stream, addr) = accepted.unwrap();
        match Peer::new(stream, addr).receive_frame().await.unwrap() {
            Frame::Message(message) => message,
            other => panic!("Expected a message, got {:?}", other),
        }
    }
}

async fn attendance(tracker: SocketAddr) -> Vec<PeerEntry> {
    let mut peer = Peer::connect(tracker, Duration::from_secs(5)).await.unwrap();
    peer.send_message(&Message::AttendanceRequest).await.unwrap();
    let reply: AttendanceReply = peer.receive_json().await.unwrap();
    reply.payload
}

#[tokio::test]
async fn test_transaction_is_mined_and_gossiped() {
    let tracker = start_tracker().await;
    let node = start_node(tracker).await;
    let fake = FakePeer::register(tracker).await;

    let tx = node.submit_transaction(100.0, &fake.entry.address()).await.unwrap();
    assert_eq!(tx.payer, node.address());
    assert_eq!(tx.payee, fake.entry.address());

    assert!(eventually(|| async { node.own_balance().await.unwrap() == 890.0 }).await);
    assert_eq!(node.balance(&fake.entry.address()).await.unwrap(), 1100.0);

    let chain = node.chain().await.unwrap();
    assert_eq!(chain.len(), 2);
    assert!(chain.validate().is_ok());
    assert!(chain.chain[1].hash().to_hex().starts_with("00"));

    // The transaction and the new chain arrive on separate connections,
    // in either order
    let mut saw_transaction = false;
    let mut saw_chain = false;
    for _ in 0..2 {
        match fake.next_message().await {
            Message::TransactionBroadcast(received) => {
                assert_eq!(received, tx);
                saw_transaction = true;
            }
            Message::UpdatedBlockchain(received) => {
                assert!(received.len() >= 2);
                saw_chain = true;
            }
            other => panic!("Unexpected {}", other.message_type()),
        }
    }
    assert!(saw_transaction && saw_chain);

    node.shutdown().await;
}

#[tokio::test]
async fn test_recipient_by_bare_host() {
    let tracker = start_tracker().await;
    let node = start_node(tracker).await;
    let fake = FakePeer::register(tracker).await;

    // The node itself shares the host but is never its own recipient
    let tx = node.submit_transaction(10.0, "127.0.0.1").await.unwrap();
    assert_eq!(tx.payee, fake.entry.address());

    // The lookup refreshed the cached attendance list
    let known = node.known_peers().await;
    assert_eq!(known.len(), 2);
    assert!(known.contains(&fake.entry));

    node.shutdown().await;
}

#[tokio::test]
async fn test_submit_rejections() {
    let tracker = start_tracker().await;
    let node = start_node(tracker).await;
    let fake = FakePeer::register(tracker).await;
    let recipient = fake.entry.address();

    assert_eq!(
        node.submit_transaction(0.0, &recipient).await,
        Err(TransactionError::InvalidAmount(0.0))
    );
    assert_eq!(
        node.submit_transaction(-5.0, &recipient).await,
        Err(TransactionError::InvalidAmount(-5.0))
    );
    assert!(matches!(
        node.submit_transaction(1000.0, &recipient).await,
        Err(TransactionError::InsufficientFunds { .. })
    ));
    assert_eq!(
        node.submit_transaction(5.0, "10.9.9.9:1").await,
        Err(TransactionError::RecipientNotFound("10.9.9.9:1".to_string()))
    );
    assert!(matches!(
        node.submit_transaction(5.0, node.address()).await,
        Err(TransactionError::RecipientNotFound(_))
    ));

    // Nothing was queued or mined
    assert_eq!(node.own_balance().await.unwrap(), 1000.0);
    assert_eq!(node.chain().await.unwrap().len(), 1);

    node.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_and_reconnect() {
    let tracker = start_tracker().await;
    let node = start_node(tracker).await;
    let own = PeerEntry::new("127.0.0.1", node.local_addr().port());

    assert!(eventually(|| async { attendance(tracker).await.contains(&own) }).await);

    node.disconnect().await;
    assert!(!node.is_active());
    assert!(eventually(|| async { !attendance(tracker).await.contains(&own) }).await);
    assert_eq!(
        node.submit_transaction(1.0, "127.0.0.1").await,
        Err(TransactionError::Inactive)
    );

    node.reconnect().await.unwrap();
    assert!(node.is_active());
    assert!(eventually(|| async { attendance(tracker).await.contains(&own) }).await);

    node.shutdown().await;
}

#[tokio::test]
async fn test_two_nodes_converge() {
    let tracker = start_tracker().await;
    let a = start_node(tracker).await;
    let b = start_node(tracker).await;

    assert!(eventually(|| async { a.request_attendance().await.len() == 2 }).await);

    a.submit_transaction(100.0, b.address()).await.unwrap();

    // Either node may mine the transfer, possibly both
    assert!(eventually(|| async { a.own_balance().await.unwrap() <= 890.0 }).await);
    assert!(eventually(|| async { b.chain().await.unwrap().len() >= 2 }).await);

    for node in [&a, &b] {
        let chain = node.chain().await.unwrap();
        assert!(chain.validate().is_ok());
        assert!(node.balance(b.address()).await.unwrap() >= 1100.0);
    }

    a.shutdown().await;
    b.shutdown().await;
}
