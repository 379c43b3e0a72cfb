//! Reliable unicast sends over the datagram socket.
//!
//! # Contract
//! 1. Sends are serialized: one in-flight send per channel, guarded by the
//!    mutex that also owns the sequence counter.
//! 2. The outgoing message is stamped with the next sequence number and
//!    encoded once; every retry puts the identical datagram on the wire.
//! 3. Each attempt waits 500 ms for an ACK whose `ack_number` matches; up
//!    to 3 attempts total.
//! 4. The counter advances only on success, so a failed send leaves no
//!    sequence gap.
//!
//! While waiting, the channel borrows the arrival queue: non-matching
//! traffic is set aside and restored in order, so the dispatcher still
//! sees every real message exactly once.

use crate::queue::ArrivalQueue;
use crate::socket::DatagramSocket;
use duel_protocol::codec::{CodecError, FIELD_SEQUENCE_NUMBER};
use duel_protocol::message::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace, warn};

pub const ACK_TIMEOUT: Duration = Duration::from_millis(500);
pub const SEND_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("no ACK for sequence {sequence} after {attempts} attempts")]
    AckTimeout { sequence: u64, attempts: u32 },
    #[error("encode: {0}")]
    Encode(#[from] CodecError),
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ReliableChannel {
    socket: Arc<DatagramSocket>,
    queue: Arc<ArrivalQueue>,
    /// Highest sequence number successfully delivered; doubles as the
    /// in-flight-send lock.
    last_sent: Mutex<u64>,
}

impl ReliableChannel {
    pub fn new(socket: Arc<DatagramSocket>, queue: Arc<ArrivalQueue>) -> Self {
        ReliableChannel {
            socket,
            queue,
            last_sent: Mutex::new(0),
        }
    }

    /// Send `message` to `to` and wait for its ACK.  Returns the sequence
    /// number that was delivered.
    pub async fn send_with_ack(
        &self,
        message: &Message,
        to: SocketAddr,
    ) -> Result<u64, ChannelError> {
        let mut last_sent = self.last_sent.lock().await;
        let sequence = *last_sent + 1;
        let mut raw = message.to_raw();
        raw.set(FIELD_SEQUENCE_NUMBER, sequence.to_string());
        let bytes = raw.encode()?;

        let mut borrow = self.queue.borrow().await;
        for attempt in 1..=SEND_ATTEMPTS {
            self.socket.send_to(&bytes, to).await?;
            trace!(sequence, attempt, kind = message.kind(), %to, "datagram sent");
            let deadline = Instant::now() + ACK_TIMEOUT;
            while let Some(arrival) = borrow.pop_before(deadline).await {
                if arrival.msg.is_ack() && arrival.msg.ack_number() == Some(sequence) {
                    *last_sent = sequence;
                    debug!(sequence, attempt, kind = message.kind(), "delivered");
                    return Ok(sequence);
                }
                // not ours: give it back to the dispatcher afterwards
                borrow.set_aside(arrival);
            }
            debug!(sequence, attempt, kind = message.kind(), "ack timeout");
        }
        warn!(
            sequence,
            kind = message.kind(),
            %to,
            "send failed, retries exhausted"
        );
        Err(ChannelError::AckTimeout {
            sequence,
            attempts: SEND_ATTEMPTS,
        })
    }
}
