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

use crate::{ClientError, Reply};
use porthos_broker::{Broker, Channel, ConsumeOptions, Consumer, Delivery, QueueOptions};
use porthos_common::{
    DEFAULT_EXCHANGE, JSON_CONTENT_TYPE, METHOD_HEADER, Properties, Publishing, STATUS_HEADER,
    StatusCode,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

type PendingMap = HashMap<String, oneshot::Sender<Result<Reply, ClientError>>>;
type Pending = Mutex<PendingMap>;

fn lock(pending: &Pending) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long a call waits for its reply. Also sent as the request's expiration, so a request
    /// nobody picks up in time is discarded by the broker.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Calls the methods of one service.
///
/// Replies come back on an exclusive, broker-named queue, and are matched to their calls by
/// correlation id, so any number of calls can be outstanding at once.
pub struct Client {
    service: String,
    options: ClientOptions,
    channel: Channel,
    reply_queue: String,
    pending: Arc<Pending>,
    closed: CancellationToken,
}

impl Client {
    pub async fn new(
        broker: &Broker,
        service: &str,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let channel = broker.new_channel()?;
        let reply_queue = channel
            .queue_declare("", QueueOptions { exclusive: true })
            .await?
            .name;
        let consumer = channel
            .consume(
                &reply_queue,
                ConsumeOptions {
                    auto_ack: true,
                    consumer_tag: None,
                },
            )
            .await?;

        let pending = Arc::new(Pending::default());
        let closed = CancellationToken::new();
        tokio::spawn(route_replies(consumer, pending.clone(), closed.clone()));
        info!(service, %reply_queue, "RPC client ready");

        Ok(Self {
            service: service.to_string(),
            options,
            channel,
            reply_queue,
            pending,
            closed,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Invoke `method` with `args`, which are sent as the JSON body and should serialize to an
    /// array, e.g. a tuple or slice.
    pub async fn call<A: Serialize + ?Sized>(
        &self,
        method: &str,
        args: &A,
    ) -> Result<Reply, ClientError> {
        let body = serde_json::to_vec(args).map_err(|e| ClientError::Encode(e.to_string()))?;
        self.call_raw(method, body).await
    }

    /// Invoke `method` with an already-encoded body.
    pub async fn call_raw(&self, method: &str, body: Vec<u8>) -> Result<Reply, ClientError> {
        if self.closed.is_cancelled() {
            return Err(ClientError::Closed);
        }

        let correlation_id = Uuid::new_v4().to_string();
        let (sender, receiver) = oneshot::channel();
        lock(&self.pending).insert(correlation_id.clone(), sender);
        let _pending = PendingCall {
            pending: &self.pending,
            correlation_id: &correlation_id,
        };

        let properties = Properties::default()
            .with_content_type(JSON_CONTENT_TYPE)
            .with_correlation_id(correlation_id.as_str())
            .with_reply_to(self.reply_queue.as_str())
            .with_expiration(self.options.timeout)
            .with_header(METHOD_HEADER, method);
        self.channel
            .publish(
                DEFAULT_EXCHANGE,
                &self.service,
                Publishing::new(properties, body),
            )
            .await?;
        debug!(service = %self.service, method, %correlation_id, "request sent");

        match tokio::time::timeout(self.options.timeout, receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout {
                method: method.to_string(),
                timeout: self.options.timeout,
            }),
        }
    }

    /// Stop routing replies. Outstanding and later calls fail with `ClientError::Closed`.
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        self.channel.close();
        lock(&self.pending).clear();
        info!(service = %self.service, "RPC client closed");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forgets a call's pending entry however the call ends.
struct PendingCall<'a> {
    pending: &'a Pending,
    correlation_id: &'a str,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(self.correlation_id);
    }
}

async fn route_replies(mut consumer: Consumer, pending: Arc<Pending>, closed: CancellationToken) {
    loop {
        let delivery = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            delivery = consumer.recv() => delivery,
        };
        let Some(delivery) = delivery else {
            break;
        };
        route(&pending, delivery);
    }
    // Dropping the senders wakes every waiting call with `Closed`.
    lock(&pending).clear();
    debug!(queue = consumer.queue(), "reply router stopped");
}

fn route(pending: &Pending, delivery: Delivery) {
    let Some(correlation_id) = delivery.properties.correlation_id.as_deref() else {
        warn!("reply without correlation id, dropping");
        return;
    };
    let Some(sender) = lock(pending).remove(correlation_id) else {
        warn!(correlation_id, "reply matches no pending call, dropping");
        return;
    };
    let reply = match delivery
        .properties
        .header(STATUS_HEADER)
        .and_then(StatusCode::from_header)
    {
        Some(status) => Ok(Reply {
            status,
            body: delivery.body,
        }),
        None => Err(ClientError::MissingStatus),
    };
    if sender.send(reply).is_err() {
        debug!(correlation_id, "caller went away before its reply arrived");
    }
}
