//! Datagram socket abstraction.
//!
//! Send-to-address / receive-from-address over UDP; no stream semantics.
//! Two addressing modes: direct (explicit remote ip:port) and local
//! broadcast (bind 0.0.0.0, destination 255.255.255.255, which requires
//! the broadcast socket option).

use std::net::SocketAddr;
use tokio::net::UdpSocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Direct,
    Broadcast,
}

impl AddressingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AddressingMode::Direct => "direct",
            AddressingMode::Broadcast => "broadcast",
        }
    }
}

#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
    mode: AddressingMode,
}

impl DatagramSocket {
    pub async fn bind(bind_addr: SocketAddr, mode: AddressingMode) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        if mode == AddressingMode::Broadcast {
            socket.set_broadcast(true)?;
        }
        Ok(DatagramSocket { socket, mode })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    pub async fn send_to(&self, bytes: &[u8], to: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(bytes, to).await
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}
