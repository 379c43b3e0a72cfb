//! The datagram receive loop.
//!
//! One long-running task: read, decode, ACK-reply, dedup, enqueue.  Every
//! datagram carrying a parseable `sequence_number` is acked — duplicates
//! included, so the peer's retries stop — but a duplicate
//! (`sequence <= last_accepted` for its sender) is dropped before it can
//! reach the dispatcher.  ACKs and sequence-less messages are enqueued
//! as-is; the dispatcher decides what is malformed.

use crate::queue::{Arrival, ArrivalQueue};
use crate::socket::DatagramSocket;
use duel_protocol::codec::{MAX_DATAGRAM, RawMessage};
use duel_protocol::message::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

pub async fn run_receive_loop(
    socket: Arc<DatagramSocket>,
    queue: Arc<ArrivalQueue>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    let mut last_accepted: HashMap<SocketAddr, u64> = HashMap::new();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "socket receive failed, stopping");
                        break;
                    }
                };
                let raw = match RawMessage::decode(&buf[..len]) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(%from, error = %e, "undecodable datagram dropped");
                        continue;
                    }
                };
                handle_datagram(&socket, &queue, &mut last_accepted, from, raw).await;
            }
        }
    }
    debug!("receive loop stopped");
}

async fn handle_datagram(
    socket: &DatagramSocket,
    queue: &ArrivalQueue,
    last_accepted: &mut HashMap<SocketAddr, u64>,
    from: SocketAddr,
    raw: RawMessage,
) {
    if raw.is_ack() {
        // ACKs are never themselves acknowledged; a waiting send consumes
        // its match and the dispatcher discards strays.
        queue.push(Arrival { from, msg: raw });
        return;
    }
    if let Some(sequence) = raw.sequence_number() {
        send_ack(socket, sequence, from).await;
        let last = last_accepted.get(&from).copied().unwrap_or(0);
        if sequence <= last {
            trace!(%from, sequence, "duplicate dropped after re-ack");
            return;
        }
        last_accepted.insert(from, sequence);
        queue.push(Arrival { from, msg: raw });
    } else {
        // non-ACK without a sequence number: surfaced to the dispatcher,
        // which logs it as malformed and drops it
        queue.push(Arrival { from, msg: raw });
    }
}

/// Bare ACK reply, sent inline on the receive path (ACKs need no
/// reliability of their own).
async fn send_ack(socket: &DatagramSocket, ack_number: u64, to: SocketAddr) {
    let raw = Message::Ack { ack_number }.to_raw();
    match raw.encode() {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, to).await {
                warn!(%to, ack_number, error = %e, "failed to send ACK");
            }
        }
        Err(e) => warn!(ack_number, error = %e, "failed to encode ACK"),
    }
}
