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

use crate::connection::ConnectionInner;
use crate::errors::{AckError, ChannelError, PublishError};
use crate::lock;
use crate::queue::{Envelope, Queue, QueueInfo};
use bytes::Bytes;
use porthos_common::{DEFAULT_EXCHANGE, Properties, Publishing};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Exclusive queues may only be used by the declaring connection, and are deleted when it
    /// closes.
    pub exclusive: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConsumeOptions {
    /// Settle deliveries on receipt instead of waiting for `Delivery::ack`.
    pub auto_ack: bool,
    /// Consumer tag; generated when not supplied.
    pub consumer_tag: Option<String>,
}

struct Unacked {
    queue: Arc<Queue>,
    envelope: Envelope,
}

pub(crate) struct ChannelInner {
    id: u64,
    connection: Arc<ConnectionInner>,
    closed: CancellationToken,
    unacked: Mutex<HashMap<u64, Unacked>>,
    next_delivery_tag: AtomicU64,
}

impl ChannelInner {
    /// Close the channel and put everything it still owed an acknowledgement for back on its
    /// queue.
    pub(crate) fn close(&self) {
        self.closed.cancel();
        let unacked: Vec<Unacked> = lock(&self.unacked).drain().map(|(_, u)| u).collect();
        if !unacked.is_empty() {
            debug!(
                channel = self.id,
                count = unacked.len(),
                "requeueing unacknowledged deliveries"
            );
        }
        for Unacked {
            queue,
            mut envelope,
        } in unacked
        {
            envelope.redelivered = true;
            queue.push(envelope);
        }
    }

    fn deliver(
        self: &Arc<Self>,
        queue: &Arc<Queue>,
        envelope: Envelope,
        auto_ack: bool,
    ) -> Option<Delivery> {
        let delivery_tag = self.next_delivery_tag.fetch_add(1, Ordering::SeqCst) + 1;
        let acker = if auto_ack {
            None
        } else {
            let mut unacked = lock(&self.unacked);
            if self.closed.is_cancelled() {
                drop(unacked);
                queue.push(envelope);
                return None;
            }
            unacked.insert(
                delivery_tag,
                Unacked {
                    queue: queue.clone(),
                    envelope: envelope.clone(),
                },
            );
            Some(Acker {
                channel: Arc::downgrade(self),
                delivery_tag,
            })
        };

        Some(Delivery {
            delivery_tag,
            redelivered: envelope.redelivered,
            exchange: envelope.exchange,
            routing_key: envelope.routing_key,
            properties: envelope.publishing.properties,
            body: envelope.publishing.body,
            acker,
        })
    }

    fn take_unacked(&self, delivery_tag: u64) -> Result<Unacked, AckError> {
        if self.closed.is_cancelled() {
            return Err(AckError::ChannelClosed);
        }
        lock(&self.unacked)
            .remove(&delivery_tag)
            .ok_or(AckError::UnknownDeliveryTag(delivery_tag))
    }
}

/// A virtual connection multiplexed over a broker session. Publishing, queue declaration and
/// consumption all happen on a channel.
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn open(connection: Arc<ConnectionInner>, id: u64) -> Self {
        let closed = connection.closed.child_token();
        Self {
            inner: Arc::new(ChannelInner {
                id,
                connection,
                closed,
                unacked: Mutex::new(HashMap::new()),
                next_delivery_tag: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ChannelInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.inner.connection.closed.is_cancelled() {
            return Err(ChannelError::ConnectionClosed);
        }
        if self.inner.closed.is_cancelled() {
            return Err(ChannelError::ChannelClosed);
        }
        Ok(())
    }

    /// Declare a queue, creating it if needed. An empty name asks the broker to generate one.
    pub async fn queue_declare(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueInfo, ChannelError> {
        self.ensure_open()?;
        let name = if name.is_empty() {
            format!("amq.gen-{}", Uuid::new_v4().simple())
        } else {
            name.to_string()
        };
        let connection = &self.inner.connection;
        let queue = connection
            .vhost
            .declare_queue(&name, options.exclusive, connection.id)?;
        debug!(queue = %name, exclusive = options.exclusive, "queue declared");
        Ok(queue.info())
    }

    /// Start consuming from `queue`.
    pub async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> Result<Consumer, ChannelError> {
        self.ensure_open()?;
        let connection = &self.inner.connection;
        let source = connection
            .vhost
            .queue(queue)
            .ok_or_else(|| ChannelError::QueueNotFound(queue.to_string()))?;
        if let Some(owner) = source.exclusive_owner()
            && owner != connection.id
        {
            return Err(ChannelError::ResourceLocked(queue.to_string()));
        }

        let tag = options
            .consumer_tag
            .unwrap_or_else(|| format!("ctag-{}", Uuid::new_v4().simple()));
        source.add_consumer();
        debug!(queue, consumer = %tag, auto_ack = options.auto_ack, "consumer started");
        Ok(Consumer {
            tag,
            queue: source,
            channel: self.inner.clone(),
            auto_ack: options.auto_ack,
            cancel: self.inner.closed.child_token(),
        })
    }

    /// Publish a message. On the default exchange the routing key names the destination queue;
    /// a message routed to a queue that doesn't exist is dropped.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        publishing: Publishing,
    ) -> Result<(), PublishError> {
        if self.inner.closed.is_cancelled() {
            return Err(PublishError::ChannelClosed);
        }
        if exchange != DEFAULT_EXCHANGE {
            return Err(PublishError::ExchangeNotFound(exchange.to_string()));
        }
        let deadline = publishing
            .properties
            .ttl()?
            .map(|ttl| Instant::now() + ttl);

        let Some(queue) = self.inner.connection.vhost.queue(routing_key) else {
            debug!(routing_key, "no queue for routing key, message dropped");
            return Ok(());
        };
        queue.push(Envelope {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            publishing,
            deadline,
            redelivered: false,
        });
        Ok(())
    }

    /// Close the channel. Its consumers stop, and unacknowledged deliveries are requeued.
    /// Closing an already closed channel does nothing.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// The receiving end of a `consume` call.
pub struct Consumer {
    tag: String,
    queue: Arc<Queue>,
    channel: Arc<ChannelInner>,
    auto_ack: bool,
    cancel: CancellationToken,
}

impl Consumer {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn queue(&self) -> &str {
        self.queue.name()
    }

    /// Wait for the next delivery. Returns `None` once the consumer has been cancelled or its
    /// channel (or connection) closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        let envelope = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            envelope = self.queue.pop() => envelope?,
        };
        self.channel.deliver(&self.queue, envelope, self.auto_ack)
    }

    /// Stop consuming. Pending and future `recv` calls return `None`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.queue.remove_consumer();
    }
}

#[derive(Debug)]
struct Acker {
    channel: Weak<ChannelInner>,
    delivery_tag: u64,
}

/// One message handed to a consumer.
#[derive(Debug)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub properties: Properties,
    pub body: Bytes,
    acker: Option<Acker>,
}

impl Delivery {
    /// Whether the broker is waiting for this delivery to be acknowledged.
    pub fn requires_ack(&self) -> bool {
        self.acker.is_some()
    }

    /// Acknowledge the delivery. A no-op for auto-acknowledged deliveries.
    pub fn ack(&self) -> Result<(), AckError> {
        let Some(acker) = &self.acker else {
            return Ok(());
        };
        let channel = acker.channel.upgrade().ok_or(AckError::ChannelClosed)?;
        channel.take_unacked(acker.delivery_tag).map(|_| ())
    }

    /// Reject the delivery, putting it back on its queue if `requeue` is set.
    pub fn nack(&self, requeue: bool) -> Result<(), AckError> {
        let Some(acker) = &self.acker else {
            return Ok(());
        };
        let channel = acker.channel.upgrade().ok_or(AckError::ChannelClosed)?;
        let Unacked {
            queue,
            mut envelope,
        } = channel.take_unacked(acker.delivery_tag)?;
        if requeue {
            envelope.redelivered = true;
            queue.push(envelope);
        }
        Ok(())
    }
}
