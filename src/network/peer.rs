// Peer connection management

use crate::network::{Frame, Message, NetworkError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Upper bound for one frame. A full chain snapshot is the largest thing
/// sent over the wire.
pub const MAX_FRAME_LEN: u64 = 32 * 1024 * 1024;

/// Peer information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub addr: SocketAddr,
    pub connected_at: SystemTime,
}

impl PeerInfo {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connected_at: SystemTime::now(),
        }
    }
}

/// Reading half of a connection: one frame per line
#[derive(Debug)]
pub struct FrameReader {
    reader: BufReader<OwnedReadHalf>,
}

impl FrameReader {
    /// Next raw line without its terminator; `None` at end of stream.
    /// A final unterminated line is still returned.
    /// A line that is not UTF-8 is consumed and reported as `Decode`.
    pub async fn next_line(&mut self) -> Result<Option<String>, NetworkError> {
        let mut buf = Vec::new();
        let read = (&mut self.reader)
            .take(MAX_FRAME_LEN)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| NetworkError::Connection(format!("Failed to read frame: {}", e)))?;

        if read == 0 {
            return Ok(None);
        }
        if read as u64 == MAX_FRAME_LEN && buf.last() != Some(&b'\n') {
            return Err(NetworkError::Connection(format!(
                "Frame exceeds {} bytes",
                MAX_FRAME_LEN
            )));
        }
        let line = String::from_utf8(buf)
            .map_err(|e| NetworkError::Decode(format!("Frame is not UTF-8: {}", e)))?;
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Next classified frame. `Closed` at end of stream; `Decode` leaves the
    /// connection usable.
    pub async fn receive_frame(&mut self) -> Result<Frame, NetworkError> {
        let line = self.next_line().await?.ok_or(NetworkError::Closed)?;
        Frame::parse(&line)
    }

    /// Next line decoded as `T`
    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> Result<T, NetworkError> {
        let line = self.next_line().await?.ok_or(NetworkError::Closed)?;
        Ok(serde_json::from_str(&line)?)
    }
}

/// Writing half of a connection
#[derive(Debug)]
pub struct FrameWriter {
    writer: OwnedWriteHalf,
}

impl FrameWriter {
    /// Write `line` followed by a newline and flush
    pub async fn send_line(&mut self, line: &str) -> Result<(), NetworkError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        self.writer
            .write_all(&data)
            .await
            .map_err(|e| NetworkError::Connection(format!("Failed to send message: {}", e)))?;

        self.writer
            .flush()
            .await
            .map_err(|e| NetworkError::Connection(format!("Failed to flush: {}", e)))?;

        Ok(())
    }

    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), NetworkError> {
        let line = serde_json::to_string(value)?;
        self.send_line(&line).await
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), NetworkError> {
        self.send_line(&message.to_json()?).await
    }

    /// Half-close the connection
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            log::debug!("Shutdown failed: {}", e);
        }
    }
}

/// Peer connection
#[derive(Debug)]
pub struct Peer {
    pub info: PeerInfo,
    reader: FrameReader,
    writer: FrameWriter,
}

impl Peer {
    /// Create a new peer from a TCP stream
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            info: PeerInfo::new(addr),
            reader: FrameReader { reader: BufReader::new(read_half) },
            writer: FrameWriter { writer: write_half },
        }
    }

    /// Connect to a peer, giving up after `timeout`
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, NetworkError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetworkError::Timeout(format!("connect to {}", addr)))?
            .map_err(|e| NetworkError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

        Ok(Self::new(stream, addr))
    }

    /// Resolve `host:port` and connect, giving up after `timeout`
    pub async fn connect_host(host: &str, port: u16, timeout: Duration) -> Result<Self, NetworkError> {
        let target = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| NetworkError::Timeout(format!("connect to {}", target)))?
            .map_err(|e| NetworkError::Connection(format!("Failed to connect to {}: {}", target, e)))?;
        let addr = stream
            .peer_addr()
            .map_err(|e| NetworkError::Connection(format!("No peer address for {}: {}", target, e)))?;

        Ok(Self::new(stream, addr))
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), NetworkError> {
        self.writer.send_message(message).await
    }

    pub async fn send_line(&mut self, line: &str) -> Result<(), NetworkError> {
        self.writer.send_line(line).await
    }

    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), NetworkError> {
        self.writer.send_json(value).await
    }

    pub async fn receive_frame(&mut self) -> Result<Frame, NetworkError> {
        self.reader.receive_frame().await
    }

    pub async fn next_line(&mut self) -> Result<Option<String>, NetworkError> {
        self.reader.next_line().await
    }

    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> Result<T, NetworkError> {
        self.reader.receive_json().await
    }

    pub async fn shutdown(&mut self) {
        self.writer.shutdown().await
    }

    /// Get peer address
    pub fn addr(&self) -> SocketAddr {
        self.info.addr
    }

    /// Split into independently owned halves
    pub fn into_split(self) -> (PeerInfo, FrameReader, FrameWriter) {
        (self.info, self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::AttendanceReply;
    use tokio::net::TcpListener;

    async fn pair() -> (Peer, Peer) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Peer::connect(addr, Duration::from_secs(5));
        let (client, accepted) = tokio::join!(client, listener.accept());
        let (stream, remote) = accepted.unwrap();
        (client.unwrap(), Peer::new(stream, remote))
    }

    #[test]
    fn test_peer_info() {
        let addr: SocketAddr = "127.0.0.1:8333".parse().unwrap();
        let info = PeerInfo::new(addr);
        assert_eq!(info.addr, addr);
    }

    #[tokio::test]
    async fn test_message_over_socket() {
        let (mut a, mut b) = pair().await;

        a.send_message(&Message::AttendanceRequest).await.unwrap();
        a.send_line("PING").await.unwrap();

        assert_eq!(b.receive_frame().await.unwrap(), Frame::Message(Message::AttendanceRequest));
        assert_eq!(b.receive_frame().await.unwrap(), Frame::Ping);
    }

    #[tokio::test]
    async fn test_decode_error_keeps_connection() {
        let (mut a, mut b) = pair().await;

        a.send_line("{not json").await.unwrap();
        a.send_json(&AttendanceReply { payload: vec![] }).await.unwrap();

        assert!(matches!(b.receive_frame().await, Err(NetworkError::Decode(_))));
        let reply: AttendanceReply = b.receive_json().await.unwrap();
        assert!(reply.payload.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_utf8_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (raw, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let mut raw = raw.unwrap();
        let (stream, remote) = accepted.unwrap();
        let mut peer = Peer::new(stream, remote);

        raw.write_all(b"\xff\xfe{\n").await.unwrap();
        raw.write_all(b"PING\n").await.unwrap();

        assert!(matches!(peer.receive_frame().await, Err(NetworkError::Decode(_))));
        assert_eq!(peer.receive_frame().await.unwrap(), Frame::Ping);
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (mut a, mut b) = pair().await;
        a.shutdown().await;
        assert_eq!(b.receive_frame().await, Err(NetworkError::Closed));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Peer::connect(addr, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(NetworkError::Connection(_))));
    }
}
