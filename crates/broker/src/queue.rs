// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use porthos_common::Publishing;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Instant;
use tracing::debug;

/// A message sitting in a queue, along with the routing information it arrived with.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub(crate) exchange: String,
    pub(crate) routing_key: String,
    pub(crate) publishing: Publishing,
    pub(crate) deadline: Option<Instant>,
    pub(crate) redelivered: bool,
}

impl Envelope {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Snapshot of a queue's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    pub message_count: usize,
    pub consumer_count: usize,
}

/// A FIFO of envelopes. Consumers compete for messages: each envelope is handed to exactly one
/// of them.
pub(crate) struct Queue {
    name: String,
    exclusive_owner: Option<u64>,
    sender: flume::Sender<Envelope>,
    receiver: flume::Receiver<Envelope>,
    consumers: AtomicUsize,
}

impl Queue {
    pub(crate) fn new(name: String, exclusive_owner: Option<u64>) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            name,
            exclusive_owner,
            sender,
            receiver,
            consumers: AtomicUsize::new(0),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// The connection this queue is exclusive to, if any.
    pub(crate) fn exclusive_owner(&self) -> Option<u64> {
        self.exclusive_owner
    }

    pub(crate) fn push(&self, envelope: Envelope) {
        // We hold the receiving side ourselves, so this can't fail while the queue is alive.
        let _ = self.sender.send(envelope);
    }

    /// Wait for the next unexpired envelope. Expired ones are discarded on the way.
    pub(crate) async fn pop(&self) -> Option<Envelope> {
        loop {
            let envelope = self.receiver.recv_async().await.ok()?;
            if envelope.is_expired(Instant::now()) {
                debug!(
                    queue = %self.name,
                    correlation_id = ?envelope.publishing.properties.correlation_id,
                    "discarding expired message"
                );
                continue;
            }
            return Some(envelope);
        }
    }

    pub(crate) fn add_consumer(&self) {
        self.consumers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn remove_consumer(&self) {
        self.consumers.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn info(&self) -> QueueInfo {
        QueueInfo {
            name: self.name.clone(),
            message_count: self.receiver.len(),
            consumer_count: self.consumers.load(Ordering::SeqCst),
        }
    }
}
