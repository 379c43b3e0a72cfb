//! A bare datagram peer speaking the wire format directly.
//!
//! Unlike the engine's reliable channel, `RawPeer` never retries, never
//! dedupes, and only acks when a test asks it to — which is exactly what
//! protocol-level tests need to exercise duplication, lost ACKs, and
//! malformed traffic.

use duel_protocol::codec::{FIELD_SEQUENCE_NUMBER, MAX_DATAGRAM, RawMessage};
use duel_protocol::message::Message;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{Duration, timeout};

pub struct RawPeer {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl RawPeer {
    /// Bind to an ephemeral localhost port.
    pub async fn bind_local() -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        let local_addr = socket.local_addr()?;
        Ok(RawPeer { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn send_bytes(&self, bytes: &[u8], to: SocketAddr) -> std::io::Result<()> {
        self.socket.send_to(bytes, to).await?;
        Ok(())
    }

    pub async fn send_raw(&self, raw: &RawMessage, to: SocketAddr) -> std::io::Result<()> {
        let bytes = raw
            .encode()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.send_bytes(&bytes, to).await
    }

    /// Send a typed message, stamping `sequence_number` when given.
    pub async fn send_message(
        &self,
        message: &Message,
        sequence: Option<u64>,
        to: SocketAddr,
    ) -> std::io::Result<()> {
        let mut raw = message.to_raw();
        if let Some(sequence) = sequence {
            raw.set(FIELD_SEQUENCE_NUMBER, sequence.to_string());
        }
        self.send_raw(&raw, to).await
    }

    /// Send a bare ACK for `ack_number`.
    pub async fn ack(&self, ack_number: u64, to: SocketAddr) -> std::io::Result<()> {
        self.send_raw(&Message::Ack { ack_number }.to_raw(), to).await
    }

    /// Receive one decoded datagram, or None on timeout.
    pub async fn recv_raw(&self, wait: Duration) -> Option<(RawMessage, SocketAddr)> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = timeout(wait, self.socket.recv_from(&mut buf))
                .await
                .ok()?
                .ok()?;
            match RawMessage::decode(&buf[..len]) {
                Ok(raw) => return Some((raw, from)),
                Err(_) => continue,
            }
        }
    }

    /// Receive until a message of `message_type` arrives, or None on
    /// timeout.  Skimmed messages (the target included) are acked when
    /// `auto_ack` is set and they carry a sequence number.
    pub async fn recv_type(
        &self,
        message_type: &str,
        wait: Duration,
        auto_ack: bool,
    ) -> Option<RawMessage> {
        loop {
            let (raw, from) = self.recv_raw(wait).await?;
            if auto_ack {
                if let Some(sequence) = raw.sequence_number() {
                    self.ack(sequence, from).await.ok()?;
                }
            }
            if raw.message_type() == Some(message_type) {
                return Some(raw);
            }
        }
    }
}
