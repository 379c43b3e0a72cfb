//! The arrival queue shared by the dispatcher and the reliable channel.
//!
//! A bounded FIFO of decoded datagrams with two kinds of consumer:
//!
//! - the dispatcher, which drains it one message at a time, and
//! - an ACK-matching waiter, which *borrows* the whole queue for the
//!   duration of one reliable send.
//!
//! While borrowed, the waiter pops arrivals looking for its ACK and sets
//! everything else aside; the set-asides are restored to the FRONT of the
//! queue in original arrival order before the borrow ends, so the
//! dispatcher still sees every real message exactly once and in order.
//! The dispatcher never holds the consumer lock while idle, so a send can
//! always start borrowing immediately.

use duel_protocol::codec::RawMessage;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, Notify};
use tokio::time::{Instant, timeout_at};
use tracing::warn;

pub const QUEUE_CAPACITY: usize = 256;

/// One decoded datagram and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub from: SocketAddr,
    pub msg: RawMessage,
}

#[derive(Default)]
pub struct ArrivalQueue {
    inner: Mutex<VecDeque<Arrival>>,
    notify: Notify,
    consumer: AsyncMutex<()>,
}

impl ArrivalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer side (the receive loop).  Returns false when the queue is
    /// full and the arrival was dropped.
    pub fn push(&self, arrival: Arrival) -> bool {
        {
            let mut queue = self.inner.lock().unwrap();
            if queue.len() >= QUEUE_CAPACITY {
                warn!(
                    from = %arrival.from,
                    kind = arrival.msg.message_type().unwrap_or("?"),
                    "arrival queue full, dropping message"
                );
                return false;
            }
            queue.push_back(arrival);
        }
        self.notify.notify_waiters();
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_pop(&self) -> Option<Arrival> {
        self.inner.lock().unwrap().pop_front()
    }

    fn restore_front(&self, set_aside: &mut Vec<Arrival>) {
        if set_aside.is_empty() {
            return;
        }
        {
            let mut queue = self.inner.lock().unwrap();
            while let Some(arrival) = set_aside.pop() {
                queue.push_front(arrival);
            }
        }
        self.notify.notify_waiters();
    }

    /// Wait for the next arrival without the consumer lock; callers must
    /// already hold it (directly or through a [`QueueBorrow`]).
    async fn wait_pop(&self) -> Arrival {
        let mut notified = pin!(self.notify.notified());
        loop {
            notified.as_mut().enable();
            if let Some(arrival) = self.try_pop() {
                return arrival;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }

    /// Dispatcher-side pop: waits for the next arrival, yielding to any
    /// active borrower first.
    pub async fn pop(&self) -> Arrival {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            {
                let _consumer = self.consumer.lock().await;
                if let Some(arrival) = self.try_pop() {
                    return arrival;
                }
            }
            notified.as_mut().await;
        }
    }

    /// Take exclusive consumption for one reliable send.
    pub async fn borrow(&self) -> QueueBorrow<'_> {
        QueueBorrow {
            _consumer: self.consumer.lock().await,
            queue: self,
            set_aside: Vec::new(),
        }
    }
}

/// Exclusive consumption of the arrival queue while an ACK wait is in
/// flight.  Dropping the borrow restores every set-aside message.
pub struct QueueBorrow<'a> {
    queue: &'a ArrivalQueue,
    _consumer: MutexGuard<'a, ()>,
    set_aside: Vec<Arrival>,
}

impl QueueBorrow<'_> {
    /// Pop the next arrival before `deadline`, or None on timeout.
    pub async fn pop_before(&mut self, deadline: Instant) -> Option<Arrival> {
        timeout_at(deadline, self.queue.wait_pop()).await.ok()
    }

    /// Remember a message that was not the awaited ACK; it goes back to the
    /// queue front when the borrow ends.
    pub fn set_aside(&mut self, arrival: Arrival) {
        self.set_aside.push(arrival);
    }
}

impl Drop for QueueBorrow<'_> {
    fn drop(&mut self) {
        self.queue.restore_front(&mut self.set_aside);
    }
}
