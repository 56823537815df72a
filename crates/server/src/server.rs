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

use crate::registry::{HandlerResult, MethodRegistry, RegistryError};
use crate::request::Request;
use crate::response::Response;
use bytes::Bytes;
use futures_util::FutureExt;
use porthos_broker::{Broker, Channel, ChannelError, ConsumeOptions, Delivery, QueueOptions};
use porthos_common::{
    DEFAULT_EXCHANGE, Fault, JSON_CONTENT_TYPE, METHOD_HEADER, Properties, Publishing,
    STATUS_HEADER, ServerOptions, ShutdownPolicy, StatusCode,
};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    Closed,
}

impl Display for ServerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::Created => write!(f, "created"),
            ServerState::Listening => write!(f, "listening"),
            ServerState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("cannot {operation} while the server is {state}")]
    InvalidState {
        operation: &'static str,
        state: ServerState,
    },
    #[error("deliveries from queue {0:?} ended before the server was closed")]
    DeliveriesEnded(String),
}

/// What each handler task needs, shared between all of them.
struct Dispatcher {
    service: String,
    registry: Arc<MethodRegistry>,
    publisher: Arc<Mutex<Channel>>,
}

impl Dispatcher {
    async fn dispatch(self: Arc<Self>, delivery: Delivery, _permit: Option<OwnedSemaphorePermit>) {
        let correlation_id = delivery.properties.correlation_id.clone();
        let method = match delivery.properties.header(METHOD_HEADER) {
            None => Err(Fault::MissingMethod),
            Some(value) => value
                .as_str()
                .map(str::to_string)
                .ok_or(Fault::InvalidMethod),
        };
        debug!(
            service = %self.service,
            method = ?method.as_ref().ok(),
            correlation_id = ?correlation_id,
            redelivered = delivery.redelivered,
            "dispatching request"
        );

        let (status, body) = match method.as_deref() {
            Err(fault) => self.fault(fault.clone()),
            Ok(name) => match self.registry.lookup(name) {
                None => self.fault(Fault::MethodNotFound(name.to_string())),
                Some(handler) => {
                    let request = Request::from_delivery(name.to_string(), &delivery);
                    let invocation = async move { handler.call(request, Response::new()).await };
                    self.settle(name, AssertUnwindSafe(invocation).catch_unwind().await)
                }
            },
        };

        let Some(reply_to) = delivery.properties.reply_to.as_deref() else {
            warn!(
                service = %self.service,
                method = ?method.as_ref().ok(),
                correlation_id = ?correlation_id,
                "request has no reply-to, dropping its response"
            );
            acknowledge(&delivery);
            return;
        };

        let mut properties = Properties::default()
            .with_content_type(JSON_CONTENT_TYPE)
            .with_header(STATUS_HEADER, status);
        properties.correlation_id = correlation_id.clone();

        let published = {
            let publisher = self.publisher.lock().await;
            publisher
                .publish(
                    DEFAULT_EXCHANGE,
                    reply_to,
                    Publishing::new(properties, body),
                )
                .await
        };
        match published {
            Ok(()) => acknowledge(&delivery),
            Err(e) => {
                error!(
                    error = ?e,
                    service = %self.service,
                    method = ?method.as_ref().ok(),
                    correlation_id = ?correlation_id,
                    reply_to,
                    "unable to publish response"
                );
            }
        }
    }

    fn fault(&self, fault: Fault) -> (StatusCode, Bytes) {
        debug!(service = %self.service, %fault, "answering with fault");
        (fault.status(), fault.body())
    }

    /// Turn whatever the handler task produced into the reply to send.
    fn settle(
        &self,
        method: &str,
        outcome: Result<HandlerResult, Box<dyn std::any::Any + Send>>,
    ) -> (StatusCode, Bytes) {
        match outcome {
            Ok(Ok(response)) => match response.into_parts() {
                Some(reply) => reply,
                None => {
                    warn!(service = %self.service, method, "handler did not write a response");
                    self.fault(Fault::NoResponse)
                }
            },
            Ok(Err(e)) => {
                error!(error = %e, service = %self.service, method, "handler failed");
                self.fault(Fault::HandlerFailed(e.to_string()))
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(service = %self.service, method, panic = %message, "handler panicked");
                self.fault(Fault::HandlerPanicked)
            }
        }
    }
}

fn acknowledge(delivery: &Delivery) {
    if !delivery.requires_ack() {
        return;
    }
    if let Err(e) = delivery.ack() {
        warn!(error = ?e, delivery_tag = delivery.delivery_tag, "unable to acknowledge request");
    }
}

/// An RPC service. Requests arrive on the queue named after the service; each is routed by its
/// `X-Method` header to a registered handler, run on its own task, and answered on the
/// request's reply-to queue.
pub struct Server {
    name: String,
    options: ServerOptions,
    registry: Arc<MethodRegistry>,
    consume_channel: Channel,
    publisher: Arc<Mutex<Channel>>,
    state: std::sync::Mutex<ServerState>,
    shutdown: CancellationToken,
    stopped: CancellationToken,
}

impl Server {
    /// Declare the service queue `name` on `broker` and prepare to serve it.
    pub async fn new(
        broker: &Broker,
        name: &str,
        options: ServerOptions,
    ) -> Result<Self, ServerError> {
        let consume_channel = broker.new_channel()?;
        consume_channel
            .queue_declare(name, QueueOptions::default())
            .await?;
        let publisher = broker.new_channel()?;
        info!(service = name, ?options, "RPC server created");
        Ok(Self {
            name: name.to_string(),
            options,
            registry: Arc::new(MethodRegistry::new()),
            consume_channel,
            publisher: Arc::new(Mutex::new(publisher)),
            state: std::sync::Mutex::new(ServerState::Created),
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn state(&self) -> ServerState {
        *self.lock_state()
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Register `handler` as the implementation of `method`.
    pub fn register<F, Fut>(&self, method: &str, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(method, handler)?;
        debug!(service = %self.name, method, "method registered");
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume the service queue and dispatch requests until `close` is called.
    ///
    /// Returns `Ok(())` once the server has been closed and its in-flight handlers dealt with.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        {
            let mut state = self.lock_state();
            if *state != ServerState::Created {
                return Err(ServerError::InvalidState {
                    operation: "listen",
                    state: *state,
                });
            }
            *state = ServerState::Listening;
        }
        let _finished = ListenGuard { server: self };

        let mut consumer = self
            .consume_channel
            .consume(
                &self.name,
                ConsumeOptions {
                    auto_ack: self.options.auto_ack,
                    consumer_tag: None,
                },
            )
            .await?;
        let dispatcher = Arc::new(Dispatcher {
            service: self.name.clone(),
            registry: self.registry.clone(),
            publisher: self.publisher.clone(),
        });
        let semaphore = self
            .options
            .max_in_flight
            .map(|permits| Arc::new(Semaphore::new(permits.max(1))));
        let mut tasks = JoinSet::new();
        info!(service = %self.name, consumer = consumer.tag(), "RPC server listening");

        let mut ended = false;
        'intake: loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break 'intake,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = ?e, service = %self.name, "handler task failed");
                    }
                }
                delivery = consumer.recv() => {
                    let Some(delivery) = delivery else {
                        ended = true;
                        break 'intake;
                    };
                    let permit = match &semaphore {
                        None => None,
                        Some(semaphore) => tokio::select! {
                            biased;
                            _ = self.shutdown.cancelled() => {
                                self.return_unstarted(delivery).await;
                                break 'intake;
                            }
                            permit = semaphore.clone().acquire_owned() => permit.ok(),
                        },
                    };
                    tasks.spawn(dispatcher.clone().dispatch(delivery, permit));
                }
            }
        }
        consumer.cancel();
        drop(consumer);

        let in_flight = tasks.len();
        match self.options.shutdown {
            ShutdownPolicy::Drain { timeout_ms } if in_flight > 0 => {
                info!(service = %self.name, in_flight, timeout_ms, "draining in-flight requests");
                let drained = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
                    while tasks.join_next().await.is_some() {}
                })
                .await;
                if drained.is_err() {
                    warn!(
                        service = %self.name,
                        remaining = tasks.len(),
                        "drain timed out, aborting remaining handlers"
                    );
                    tasks.shutdown().await;
                }
            }
            ShutdownPolicy::Abandon if in_flight > 0 => {
                info!(service = %self.name, in_flight, "abandoning in-flight requests");
                tasks.shutdown().await;
            }
            _ => {}
        }

        if ended && !self.shutdown.is_cancelled() {
            error!(service = %self.name, "delivery stream ended, broker connection lost?");
            return Err(ServerError::DeliveriesEnded(self.name.clone()));
        }
        Ok(())
    }

    /// Put back a request that was taken off the queue but never handed to a handler.
    /// Manually acknowledged deliveries are rejected back onto the queue; auto-acknowledged
    /// ones are already settled, so they are published to the queue again.
    async fn return_unstarted(&self, delivery: Delivery) {
        let correlation_id = delivery.properties.correlation_id.clone();
        let returned = if delivery.requires_ack() {
            delivery.nack(true).map_err(|e| e.to_string())
        } else {
            let publisher = self.publisher.lock().await;
            publisher
                .publish(
                    DEFAULT_EXCHANGE,
                    &self.name,
                    Publishing::new(delivery.properties, delivery.body),
                )
                .await
                .map_err(|e| e.to_string())
        };
        match returned {
            Ok(()) => debug!(
                service = %self.name,
                correlation_id = ?correlation_id,
                "closed while waiting for a handler slot, request returned to the queue"
            ),
            Err(e) => warn!(
                service = %self.name,
                correlation_id = ?correlation_id,
                error = %e,
                "closed while waiting for a handler slot, request lost without reply"
            ),
        }
    }

    /// Stop serving. Intake stops at once; in-flight handlers are then drained or abandoned
    /// according to the shutdown policy. Closing more than once is harmless.
    pub async fn close(&self) {
        let closed_before_listening = {
            let mut state = self.lock_state();
            if *state == ServerState::Created {
                *state = ServerState::Closed;
                true
            } else {
                false
            }
        };
        self.shutdown.cancel();
        if closed_before_listening {
            self.release();
        }
        self.stopped.cancelled().await;
        self.publisher.lock().await.close();
    }

    /// Tear down the consuming side. Unacknowledged deliveries go back on the queue.
    fn release(&self) {
        *self.lock_state() = ServerState::Closed;
        self.consume_channel.close();
        if !self.stopped.is_cancelled() {
            self.stopped.cancel();
            info!(service = %self.name, "RPC server closed");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Marks the server closed however `listen_and_serve` finishes, including being dropped.
struct ListenGuard<'a> {
    server: &'a Server,
}

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        self.server.release();
    }
}
