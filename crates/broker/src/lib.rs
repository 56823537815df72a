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

//! An in-process message broker with the shape of an AMQP 0-9-1 broker: connections open
//! channels, channels declare queues, publish to the default exchange, and consume with or
//! without manual acknowledgement. Per-message expiration is honoured, exclusive queues are
//! tied to their connection, and unacknowledged deliveries are requeued when their channel
//! goes away.
//!
//! A broker is made reachable with `VirtualHost::bind("name")`, then connected to with
//! `Broker::connect("memory://name")`.

pub use channel::{Channel, ConsumeOptions, Consumer, Delivery, QueueOptions};
pub use connection::Broker;
pub use errors::{AckError, ChannelError, ConnectionError, PublishError};
pub use queue::QueueInfo;
pub use vhost::{MEMORY_SCHEME, VirtualHost};

mod channel;
mod connection;
mod errors;
mod queue;
mod vhost;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Broker state stays consistent across a panicking holder, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
